//! SQL migration definitions for the drivedb database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: catalog, vehicle_configs, users, guides, versions",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Vehicle catalog
CREATE TABLE IF NOT EXISTS vehicle_makes (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS vehicle_models (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    make_id INTEGER NOT NULL REFERENCES vehicle_makes(id) ON DELETE CASCADE,
    name    TEXT NOT NULL,
    UNIQUE(make_id, name)
);

CREATE TABLE IF NOT EXISTS vehicle_trims (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL REFERENCES vehicle_models(id) ON DELETE CASCADE,
    name     TEXT NOT NULL,
    year     INTEGER NOT NULL,
    UNIQUE(model_id, name, year)
);

CREATE TABLE IF NOT EXISTS trim_styles (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    trim_id  INTEGER NOT NULL REFERENCES vehicle_trims(id) ON DELETE CASCADE,
    model_id INTEGER NOT NULL,
    year     INTEGER NOT NULL,
    name     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trim_styles_model ON trim_styles(model_id, year);

CREATE TABLE IF NOT EXISTS capabilities (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS repositories (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL UNIQUE,
    url       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    number   INTEGER NOT NULL UNIQUE,
    state    TEXT NOT NULL,
    html_url TEXT NOT NULL
);

-- Configuration tree. The full node (capabilities, links, trims) is kept in
-- data_json; the columns below exist for lookups and constraints.
CREATE TABLE IF NOT EXISTS vehicle_configs (
    id          TEXT PRIMARY KEY,
    parent_id   TEXT REFERENCES vehicle_configs(id) ON DELETE CASCADE,
    make_id     INTEGER NOT NULL,
    model_id    INTEGER NOT NULL,
    year        INTEGER NOT NULL,
    year_end    INTEGER NOT NULL,
    config_type TEXT,
    status      TEXT,
    title       TEXT NOT NULL,
    slug        TEXT,
    data_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vehicle_configs_parent ON vehicle_configs(parent_id);
CREATE INDEX IF NOT EXISTS idx_vehicle_configs_ymm ON vehicle_configs(make_id, model_id, year, year_end);
CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicle_configs_root_key
    ON vehicle_configs(make_id, model_id, year, year_end) WHERE parent_id IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicle_configs_slug
    ON vehicle_configs(slug) WHERE slug IS NOT NULL;

-- Users and guides
CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY,
    github_username  TEXT,
    slack_username   TEXT,
    discord_username TEXT,
    avatar_url       TEXT
);

CREATE INDEX IF NOT EXISTS idx_users_github ON users(github_username);
CREATE INDEX IF NOT EXISTS idx_users_slack ON users(slack_username);

CREATE TABLE IF NOT EXISTS guides (
    id                 TEXT PRIMARY KEY,
    title              TEXT,
    markdown           TEXT,
    markup             TEXT,
    article_source_url TEXT,
    source_image_url   TEXT,
    author_name        TEXT,
    excerpt            TEXT,
    reference_domain   TEXT,
    published_at       TEXT,
    user_id            TEXT REFERENCES users(id) ON DELETE SET NULL,
    slug               TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_guides_source_url
    ON guides(article_source_url) WHERE article_source_url IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_guides_slug
    ON guides(slug) WHERE slug IS NOT NULL;

CREATE TABLE IF NOT EXISTS guide_images (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    guide_id   TEXT NOT NULL REFERENCES guides(id) ON DELETE CASCADE,
    url        TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_guide_images_guide ON guide_images(guide_id);

-- Audit trail and background work
CREATE TABLE IF NOT EXISTS versions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id    TEXT NOT NULL,
    item_type  TEXT NOT NULL,
    event      TEXT NOT NULL,
    whodunnit  TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_item ON versions(item_type, item_id);

CREATE TABLE IF NOT EXISTS image_jobs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id   TEXT NOT NULL,
    record_type TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
