//! libSQL storage layer (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the vehicle catalog,
//! the configuration tree, users, guides, the versions audit trail and the
//! image-download job queue.
//!
//! **Uniqueness rules:**
//! - Root configurations are checked for overlapping year ranges inside a
//!   `BEGIN IMMEDIATE` transaction, backed by a partial unique index on the
//!   exact root key, so two writers can never both insert an overlapping root.
//! - Guide source URLs are unique through a partial unique index.

mod migrations;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use drivedb_shared::{
    Capability, ConfigId, DriveDbError, Guide, GuideId, ImageJob, PullRequest, PullRequestState,
    Repository, Result, TrimStyle, User, UserId, VehicleConfig, VehicleMake, VehicleModel,
    VehicleTrim, Version,
};
use libsql::{Connection, Database, TransactionBehavior, params};
use tracing::{debug, info};

/// `item_type` recorded for configuration versions.
pub const CONFIG_ITEM_TYPE: &str = "VehicleConfig";

/// `item_type` recorded for guide versions.
pub const GUIDE_ITEM_TYPE: &str = "Guide";

const GUIDE_COLUMNS: &str = "id, title, markdown, markup, article_source_url, source_image_url,
    author_name, excerpt, reference_domain, published_at, user_id, slug, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

/// Column the versions list is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionSort {
    Item,
    ItemType,
    User,
    /// Newest first.
    #[default]
    CreatedAt,
}

impl VersionSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Item => "item_id ASC, id DESC",
            Self::ItemType => "item_type ASC, id DESC",
            Self::User => "whodunnit ASC, id DESC",
            Self::CreatedAt => "created_at DESC, id DESC",
        }
    }
}

/// Lifecycle event recorded in the versions table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionEvent {
    Create,
    Update,
    Destroy,
}

impl VersionEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for VersionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DriveDbError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DriveDbError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DriveDbError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    /// Look up a make by name, creating it when missing.
    pub async fn find_or_create_make(&self, name: &str) -> Result<VehicleMake> {
        let name = name.trim();
        if let Some(id) = self
            .query_id("SELECT id FROM vehicle_makes WHERE name = ?1", params![name])
            .await?
        {
            return Ok(VehicleMake {
                id,
                name: name.to_string(),
            });
        }

        self.check_writable()?;
        self.conn
            .execute("INSERT INTO vehicle_makes (name) VALUES (?1)", params![name])
            .await
            .map_err(storage_err)?;
        Ok(VehicleMake {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Look up a model of `make` by name, creating it when missing.
    pub async fn find_or_create_model(&self, make: &VehicleMake, name: &str) -> Result<VehicleModel> {
        let name = name.trim();
        if let Some(id) = self
            .query_id(
                "SELECT id FROM vehicle_models WHERE make_id = ?1 AND name = ?2",
                params![make.id, name],
            )
            .await?
        {
            return Ok(VehicleModel {
                id,
                make_id: make.id,
                name: name.to_string(),
            });
        }

        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO vehicle_models (make_id, name) VALUES (?1, ?2)",
                params![make.id, name],
            )
            .await
            .map_err(storage_err)?;
        Ok(VehicleModel {
            id: self.conn.last_insert_rowid(),
            make_id: make.id,
            name: name.to_string(),
        })
    }

    /// Look up a trim of `model` for `year`, creating it when missing.
    pub async fn find_or_create_trim(
        &self,
        model: &VehicleModel,
        name: &str,
        year: i32,
    ) -> Result<VehicleTrim> {
        let name = name.trim();
        if let Some(id) = self
            .query_id(
                "SELECT id FROM vehicle_trims WHERE model_id = ?1 AND name = ?2 AND year = ?3",
                params![model.id, name, i64::from(year)],
            )
            .await?
        {
            return Ok(VehicleTrim {
                id,
                model_id: model.id,
                name: name.to_string(),
                year,
            });
        }

        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO vehicle_trims (model_id, name, year) VALUES (?1, ?2, ?3)",
                params![model.id, name, i64::from(year)],
            )
            .await
            .map_err(storage_err)?;
        Ok(VehicleTrim {
            id: self.conn.last_insert_rowid(),
            model_id: model.id,
            name: name.to_string(),
            year,
        })
    }

    /// Add a style to a trim.
    pub async fn insert_trim_style(&self, trim: &VehicleTrim, name: &str) -> Result<TrimStyle> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO trim_styles (trim_id, model_id, year, name) VALUES (?1, ?2, ?3, ?4)",
                params![trim.id, trim.model_id, i64::from(trim.year), name],
            )
            .await
            .map_err(storage_err)?;
        Ok(TrimStyle {
            id: self.conn.last_insert_rowid(),
            trim_id: trim.id,
            model_id: trim.model_id,
            year: trim.year,
            name: name.to_string(),
        })
    }

    /// All trim styles of a model, any year.
    pub async fn list_trim_styles(&self, model_id: i64) -> Result<Vec<TrimStyle>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, trim_id, model_id, year, name FROM trim_styles
                 WHERE model_id = ?1 ORDER BY year, id",
                params![model_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(TrimStyle {
                id: row.get(0).map_err(storage_err)?,
                trim_id: row.get(1).map_err(storage_err)?,
                model_id: row.get(2).map_err(storage_err)?,
                year: i32::try_from(row.get::<i64>(3).map_err(storage_err)?).map_err(storage_err)?,
                name: row.get(4).map_err(storage_err)?,
            });
        }
        Ok(results)
    }

    /// Look up a capability by name, creating it when missing.
    pub async fn find_or_create_capability(&self, name: &str) -> Result<Capability> {
        let name = name.trim();
        if let Some(id) = self
            .query_id("SELECT id FROM capabilities WHERE name = ?1", params![name])
            .await?
        {
            return Ok(Capability {
                id,
                name: name.to_string(),
            });
        }

        self.check_writable()?;
        self.conn
            .execute("INSERT INTO capabilities (name) VALUES (?1)", params![name])
            .await
            .map_err(storage_err)?;
        Ok(Capability {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Insert or refresh a repository record keyed by `owner/name`.
    pub async fn upsert_repository(&self, full_name: &str, url: &str) -> Result<Repository> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO repositories (full_name, url) VALUES (?1, ?2)
                 ON CONFLICT(full_name) DO UPDATE SET url = excluded.url",
                params![full_name, url],
            )
            .await
            .map_err(storage_err)?;

        let id = self
            .query_id("SELECT id FROM repositories WHERE full_name = ?1", params![full_name])
            .await?
            .ok_or_else(|| DriveDbError::not_found("repository", full_name))?;
        Ok(Repository {
            id,
            full_name: full_name.to_string(),
            url: url.to_string(),
        })
    }

    /// Insert or refresh a pull-request record keyed by its number.
    pub async fn upsert_pull_request(
        &self,
        number: u32,
        state: PullRequestState,
        html_url: &str,
    ) -> Result<PullRequest> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO pull_requests (number, state, html_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(number) DO UPDATE SET state = excluded.state, html_url = excluded.html_url",
                params![i64::from(number), state.as_str(), html_url],
            )
            .await
            .map_err(storage_err)?;

        let id = self
            .query_id(
                "SELECT id FROM pull_requests WHERE number = ?1",
                params![i64::from(number)],
            )
            .await?
            .ok_or_else(|| DriveDbError::not_found("pull request", number))?;
        Ok(PullRequest {
            id,
            number,
            state,
            html_url: html_url.to_string(),
        })
    }

    pub async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut rows = self
            .conn
            .query("SELECT id, full_name, url FROM repositories ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Repository {
                id: row.get(0).map_err(storage_err)?,
                full_name: row.get(1).map_err(storage_err)?,
                url: row.get(2).map_err(storage_err)?,
            });
        }
        Ok(results)
    }

    pub async fn list_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, number, state, html_url FROM pull_requests ORDER BY id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let state: String = row.get(2).map_err(storage_err)?;
            results.push(PullRequest {
                id: row.get(0).map_err(storage_err)?,
                number: u32::try_from(row.get::<i64>(1).map_err(storage_err)?).map_err(storage_err)?,
                state: PullRequestState::from_str(&state)?,
                html_url: row.get(3).map_err(storage_err)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Vehicle configurations
    // -----------------------------------------------------------------------

    /// Persist a new configuration node.
    ///
    /// Root nodes are rejected with the duplicate-config validation error when
    /// their year range overlaps a root of the same make and model.
    pub async fn insert_config(&self, config: &VehicleConfig, whodunnit: Option<&str>) -> Result<()> {
        self.insert_configs(std::slice::from_ref(config), whodunnit).await
    }

    /// Persist several new nodes atomically, parents before children.
    pub async fn insert_configs(&self, configs: &[VehicleConfig], whodunnit: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        for config in configs {
            if config.is_root() {
                ensure_no_overlapping_root(&tx, config).await?;
            }
            write_config(&tx, config, true).await?;
            record_version_on(
                &tx,
                &config.id.to_string(),
                CONFIG_ITEM_TYPE,
                VersionEvent::Create,
                whodunnit,
            )
            .await?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(count = configs.len(), "configs inserted");
        Ok(())
    }

    /// Persist changes to existing nodes atomically.
    pub async fn update_configs(&self, configs: &[VehicleConfig], whodunnit: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        for config in configs {
            if config.is_root() {
                ensure_no_overlapping_root(&tx, config).await?;
            }
            write_config(&tx, config, false).await?;
            record_version_on(
                &tx,
                &config.id.to_string(),
                CONFIG_ITEM_TYPE,
                VersionEvent::Update,
                whodunnit,
            )
            .await?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Persist changes to one existing node.
    pub async fn update_config(&self, config: &VehicleConfig, whodunnit: Option<&str>) -> Result<()> {
        self.update_configs(std::slice::from_ref(config), whodunnit).await
    }

    /// Get a configuration by ID.
    pub async fn get_config(&self, id: ConfigId) -> Result<Option<VehicleConfig>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data_json FROM vehicle_configs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let mut configs = [row_to_config(&row)?];
        self.resolve_links(&mut configs).await?;
        let [config] = configs;
        Ok(Some(config))
    }

    /// All configurations, roots before forks, oldest first.
    pub async fn list_configs(&self) -> Result<Vec<VehicleConfig>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data_json FROM vehicle_configs
                 ORDER BY parent_id IS NOT NULL, created_at, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_config(&row)?);
        }
        self.resolve_links(&mut results).await?;
        Ok(results)
    }

    /// Fill in the repository and pull-request records behind each join
    /// record from their own tables, so every config sees the current state.
    async fn resolve_links(&self, configs: &mut [VehicleConfig]) -> Result<()> {
        if configs
            .iter()
            .all(|c| c.repositories.is_empty() && c.pull_requests.is_empty())
        {
            return Ok(());
        }

        let repositories: HashMap<i64, Repository> = self
            .list_repositories()
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let pull_requests: HashMap<i64, PullRequest> = self
            .list_pull_requests()
            .await?
            .into_iter()
            .map(|pr| (pr.id, pr))
            .collect();

        for config in configs {
            for link in &mut config.repositories {
                link.repository = repositories.get(&link.repository_id).cloned();
            }
            for link in &mut config.pull_requests {
                link.pull_request = pull_requests.get(&link.pull_request_id).cloned();
            }
        }
        Ok(())
    }

    /// Delete nodes in the given order (children first), recording a destroy
    /// version for each.
    pub async fn delete_configs(&self, ids: &[ConfigId], whodunnit: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        for id in ids {
            let id = id.to_string();
            tx.execute("DELETE FROM vehicle_configs WHERE id = ?1", params![id.as_str()])
                .await
                .map_err(storage_err)?;
            record_version_on(&tx, &id, CONFIG_ITEM_TYPE, VersionEvent::Destroy, whodunnit).await?;
        }

        tx.commit().await.map_err(storage_err)?;
        info!(count = ids.len(), "configs deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO users (id, github_username, slack_username, discord_username, avatar_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.to_string(),
                    user.github_username.as_deref(),
                    user.slack_username.as_deref(),
                    user.discord_username.as_deref(),
                    user.avatar_url.as_deref(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, github_username, slack_username, discord_username, avatar_url
                 FROM users WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// First user whose GitHub or Slack username equals `name`.
    pub async fn find_user_by_username(&self, name: &str) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, github_username, slack_username, discord_username, avatar_url
                 FROM users WHERE github_username = ?1 OR slack_username = ?1
                 ORDER BY id LIMIT 1",
                params![name],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Guides
    // -----------------------------------------------------------------------

    /// Insert a new guide. A source URL already used by another guide is a
    /// validation error on `article_source_url`.
    pub async fn insert_guide(&self, guide: &Guide, whodunnit: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        let result = tx
            .execute(
                &format!(
                    "INSERT INTO guides ({GUIDE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                guide_params(guide),
            )
            .await;

        if let Err(e) = result {
            tx.rollback().await.map_err(storage_err)?;
            return Err(if is_unique_violation(&e, "article_source_url") {
                DriveDbError::invalid("article_source_url", "has already been taken")
            } else {
                storage_err(e)
            });
        }

        record_version_on(
            &tx,
            &guide.id.to_string(),
            GUIDE_ITEM_TYPE,
            VersionEvent::Create,
            whodunnit,
        )
        .await?;
        tx.commit().await.map_err(storage_err)
    }

    /// Overwrite every column of an existing guide.
    pub async fn update_guide(&self, guide: &Guide, whodunnit: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        let changed = tx
            .execute(
                "UPDATE guides SET title = ?2, markdown = ?3, markup = ?4, article_source_url = ?5,
                   source_image_url = ?6, author_name = ?7, excerpt = ?8, reference_domain = ?9,
                   published_at = ?10, user_id = ?11, slug = ?12, created_at = ?13, updated_at = ?14
                 WHERE id = ?1",
                guide_params(guide),
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(DriveDbError::not_found("guide", guide.id));
        }

        record_version_on(
            &tx,
            &guide.id.to_string(),
            GUIDE_ITEM_TYPE,
            VersionEvent::Update,
            whodunnit,
        )
        .await?;
        tx.commit().await.map_err(storage_err)
    }

    pub async fn get_guide(&self, id: GuideId) -> Result<Option<Guide>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {GUIDE_COLUMNS} FROM guides WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_guide(&row)?)),
            None => Ok(None),
        }
    }

    /// Guides, newest first.
    pub async fn list_guides(&self) -> Result<Vec<Guide>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {GUIDE_COLUMNS} FROM guides ORDER BY created_at DESC, id DESC"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_guide(&row)?);
        }
        Ok(results)
    }

    /// Whether any guide was fetched from `url`.
    pub async fn guide_source_exists(&self, url: &str) -> Result<bool> {
        Ok(self
            .query_id(
                "SELECT 1 FROM guides WHERE article_source_url = ?1 LIMIT 1",
                params![url],
            )
            .await?
            .is_some())
    }

    /// Record a downloaded image for a guide. Returns the image row id.
    pub async fn attach_guide_image(&self, guide_id: GuideId, url: &str) -> Result<i64> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO guide_images (guide_id, url, created_at) VALUES (?1, ?2, ?3)",
                params![guide_id.to_string(), url, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// URL of the most recently attached image of a guide.
    pub async fn latest_guide_image(&self, guide_id: GuideId) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url FROM guide_images WHERE guide_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![guide_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    /// Append an audit row.
    pub async fn record_version(
        &self,
        item_id: &str,
        item_type: &str,
        event: VersionEvent,
        whodunnit: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        record_version_on(&self.conn, item_id, item_type, event, whodunnit).await
    }

    /// Audit rows ordered by `sort`, at most `limit`.
    pub async fn list_versions(&self, sort: VersionSort, limit: u32) -> Result<Vec<Version>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, item_id, item_type, event, whodunnit, created_at
                     FROM versions ORDER BY {} LIMIT ?1",
                    sort.order_by()
                ),
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Version {
                id: row.get(0).map_err(storage_err)?,
                item_id: row.get(1).map_err(storage_err)?,
                item_type: row.get(2).map_err(storage_err)?,
                event: row.get(3).map_err(storage_err)?,
                user: row.get::<String>(4).ok(),
                created_at: parse_timestamp(&row.get::<String>(5).map_err(storage_err)?)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Image jobs
    // -----------------------------------------------------------------------

    /// Queue an image download for the external worker. Returns the job id.
    pub async fn enqueue_image_job(&self, job: &ImageJob) -> Result<i64> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO image_jobs (record_id, record_type, enqueued_at) VALUES (?1, ?2, ?3)",
                params![
                    job.record_id.as_str(),
                    job.record_type.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Pending jobs in FIFO order.
    pub async fn list_image_jobs(&self) -> Result<Vec<ImageJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_id, record_type FROM image_jobs ORDER BY id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(ImageJob {
                record_id: row.get(0).map_err(storage_err)?,
                record_type: row.get(1).map_err(storage_err)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn query_id(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Option<i64>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<i64>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping and statement helpers
// ---------------------------------------------------------------------------

fn storage_err(e: impl fmt::Display) -> DriveDbError {
    DriveDbError::Storage(e.to_string())
}

fn is_unique_violation(e: &libsql::Error, column: &str) -> bool {
    let msg = e.to_string();
    msg.contains("UNIQUE constraint failed") && msg.contains(column)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DriveDbError::Storage(format!("invalid date '{s}': {e}")))
}

async fn ensure_no_overlapping_root(conn: &Connection, config: &VehicleConfig) -> Result<()> {
    let range = config.year_range();
    let mut rows = conn
        .query(
            "SELECT id FROM vehicle_configs
             WHERE parent_id IS NULL AND make_id = ?1 AND model_id = ?2
               AND year <= ?4 AND year_end >= ?3 AND id != ?5
             LIMIT 1",
            params![
                config.make.id,
                config.model.id,
                i64::from(*range.start()),
                i64::from(*range.end()),
                config.id.to_string()
            ],
        )
        .await
        .map_err(storage_err)?;

    if rows.next().await.map_err(storage_err)?.is_some() {
        return Err(DriveDbError::duplicate_config());
    }
    Ok(())
}

async fn write_config(conn: &Connection, config: &VehicleConfig, insert: bool) -> Result<()> {
    // Links are persisted as join records only.
    let mut stored = config.clone();
    for link in &mut stored.repositories {
        link.repository = None;
    }
    for link in &mut stored.pull_requests {
        link.pull_request = None;
    }
    let data = serde_json::to_string(&stored).map_err(storage_err)?;
    let sql = if insert {
        "INSERT INTO vehicle_configs (id, parent_id, make_id, model_id, year, year_end,
            config_type, status, title, slug, data_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    } else {
        "UPDATE vehicle_configs SET parent_id = ?2, make_id = ?3, model_id = ?4, year = ?5,
            year_end = ?6, config_type = ?7, status = ?8, title = ?9, slug = ?10,
            data_json = ?11, created_at = ?12, updated_at = ?13
         WHERE id = ?1"
    };

    let result = conn
        .execute(
            sql,
            params![
                config.id.to_string(),
                config.parent_id.map(|p| p.to_string()),
                config.make.id,
                config.model.id,
                i64::from(config.year),
                i64::from(config.year_end),
                config.config_type.map(|t| t.as_str()),
                config.status.map(|s| s.as_str()),
                config.title.as_str(),
                config.slug.as_deref(),
                data,
                config.created_at.to_rfc3339(),
                config.updated_at.to_rfc3339(),
            ],
        )
        .await;

    match result {
        Ok(0) if !insert => Err(DriveDbError::not_found("vehicle config", config.id)),
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e, "make_id") => Err(DriveDbError::duplicate_config()),
        Err(e) => Err(storage_err(e)),
    }
}

async fn record_version_on(
    conn: &Connection,
    item_id: &str,
    item_type: &str,
    event: VersionEvent,
    whodunnit: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO versions (item_id, item_type, event, whodunnit, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![item_id, item_type, event.as_str(), whodunnit, Utc::now().to_rfc3339()],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_config(row: &libsql::Row) -> Result<VehicleConfig> {
    let data: String = row.get(0).map_err(storage_err)?;
    serde_json::from_str(&data)
        .map_err(|e| DriveDbError::Storage(format!("corrupt vehicle config row: {e}")))
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    let id: String = row.get(0).map_err(storage_err)?;
    Ok(User {
        id: UserId::from_str(&id).map_err(storage_err)?,
        github_username: row.get::<String>(1).ok(),
        slack_username: row.get::<String>(2).ok(),
        discord_username: row.get::<String>(3).ok(),
        avatar_url: row.get::<String>(4).ok(),
    })
}

fn guide_params(guide: &Guide) -> Vec<libsql::Value> {
    fn text(v: Option<&str>) -> libsql::Value {
        v.map_or(libsql::Value::Null, |s| libsql::Value::Text(s.to_string()))
    }

    vec![
        libsql::Value::Text(guide.id.to_string()),
        text(guide.title.as_deref()),
        text(guide.markdown.as_deref()),
        text(guide.markup.as_deref()),
        text(guide.article_source_url.as_deref()),
        text(guide.source_image_url.as_deref()),
        text(guide.author_name.as_deref()),
        text(guide.excerpt.as_deref()),
        text(guide.reference_domain.as_deref()),
        text(guide.published_at.map(|d| d.to_rfc3339()).as_deref()),
        text(guide.user_id.map(|u| u.to_string()).as_deref()),
        text(guide.slug.as_deref()),
        libsql::Value::Text(guide.created_at.to_rfc3339()),
        libsql::Value::Text(guide.updated_at.to_rfc3339()),
    ]
}

fn row_to_guide(row: &libsql::Row) -> Result<Guide> {
    let id: String = row.get(0).map_err(storage_err)?;
    let published_at = match row.get::<String>(9).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };
    let user_id = match row.get::<String>(10).ok() {
        Some(s) => Some(UserId::from_str(&s).map_err(storage_err)?),
        None => None,
    };

    Ok(Guide {
        id: GuideId::from_str(&id).map_err(storage_err)?,
        title: row.get::<String>(1).ok(),
        markdown: row.get::<String>(2).ok(),
        markup: row.get::<String>(3).ok(),
        article_source_url: row.get::<String>(4).ok(),
        source_image_url: row.get::<String>(5).ok(),
        author_name: row.get::<String>(6).ok(),
        excerpt: row.get::<String>(7).ok(),
        reference_domain: row.get::<String>(8).ok(),
        published_at,
        user_id,
        slug: row.get::<String>(11).ok(),
        created_at: parse_timestamp(&row.get::<String>(12).map_err(storage_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(13).map_err(storage_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivedb_shared::{ConfigType, DUPLICATE_CONFIG_MESSAGE, PullRequestLink, RepositoryLink};
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("drivedb_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn root(storage: &Storage, make: &str, model: &str, year: i32, year_end: i32) -> VehicleConfig {
        let make = storage.find_or_create_make(make).await.unwrap();
        let model = storage.find_or_create_model(&make, model).await.unwrap();
        let now = Utc::now();
        VehicleConfig {
            id: ConfigId::new(),
            parent_id: None,
            title: format!("{year} {} {} Factory", make.name, model.name),
            slug: None,
            year,
            year_end,
            make,
            model,
            trims: vec![],
            make_package: None,
            config_type: Some(ConfigType::Factory),
            status: None,
            description: None,
            capabilities: vec![],
            modifications: vec![],
            repositories: vec![],
            pull_requests: vec![],
            trim_styles_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("drivedb_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn catalog_lookups_are_idempotent() {
        let storage = test_storage().await;
        let honda = storage.find_or_create_make("Honda").await.unwrap();
        assert_eq!(storage.find_or_create_make(" Honda ").await.unwrap(), honda);

        let civic = storage.find_or_create_model(&honda, "Civic").await.unwrap();
        assert_eq!(civic.make_id, honda.id);
        assert_eq!(storage.find_or_create_model(&honda, "Civic").await.unwrap().id, civic.id);

        let trim = storage.find_or_create_trim(&civic, "EX", 2017).await.unwrap();
        storage.insert_trim_style(&trim, "Sedan").await.unwrap();
        storage.insert_trim_style(&trim, "Hatchback").await.unwrap();
        let styles = storage.list_trim_styles(civic.id).await.unwrap();
        assert_eq!(styles.len(), 2);
        assert!(styles.iter().all(|s| s.year == 2017));

        let lkas = storage.find_or_create_capability("Lane Keeping").await.unwrap();
        assert_eq!(storage.find_or_create_capability("Lane Keeping").await.unwrap().id, lkas.id);
    }

    #[tokio::test]
    async fn config_roundtrip_and_listing() {
        let storage = test_storage().await;
        let mut config = root(&storage, "Honda", "Civic", 2016, 2018).await;
        storage.insert_config(&config, Some("admin")).await.unwrap();

        let loaded = storage.get_config(config.id).await.unwrap().unwrap();
        assert_eq!(loaded, config);

        config.description = Some("Bosch radar".into());
        storage.update_config(&config, None).await.unwrap();
        let loaded = storage.get_config(config.id).await.unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("Bosch radar"));
        assert_eq!(storage.list_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_trim_style_year_is_an_error() {
        let storage = test_storage().await;
        let honda = storage.find_or_create_make("Honda").await.unwrap();
        let civic = storage.find_or_create_model(&honda, "Civic").await.unwrap();
        let trim = storage.find_or_create_trim(&civic, "EX", 2017).await.unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO trim_styles (trim_id, model_id, year, name) VALUES (?1, ?2, ?3, ?4)",
                params![trim.id, civic.id, 1_i64 << 40, "Coupe"],
            )
            .await
            .unwrap();

        assert!(storage.list_trim_styles(civic.id).await.is_err());
    }

    #[tokio::test]
    async fn links_resolve_current_pull_request_state() {
        let storage = test_storage().await;
        let repo = storage
            .upsert_repository("user/openpilot", "https://github.com/user/openpilot")
            .await
            .unwrap();
        let pr = storage
            .upsert_pull_request(42, PullRequestState::Open, "https://github.com/commaai/openpilot/pull/42")
            .await
            .unwrap();

        let mut a = root(&storage, "Honda", "Civic", 2016, 2018).await;
        let mut b = root(&storage, "Honda", "Accord", 2016, 2018).await;
        for (config, join_id) in [(&mut a, 1), (&mut b, 2)] {
            config.repositories.push(RepositoryLink::new(join_id, repo.clone(), None));
            config.pull_requests.push(PullRequestLink {
                id: join_id,
                pull_request_id: pr.id,
                pull_request: Some(pr.clone()),
            });
        }
        storage.insert_configs(&[a.clone(), b.clone()], None).await.unwrap();

        let mut rows = storage
            .conn
            .query("SELECT data_json FROM vehicle_configs WHERE id = ?1", params![a.id.to_string()])
            .await
            .unwrap();
        let data: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert!(!data.contains("html_url"));

        storage
            .upsert_pull_request(42, PullRequestState::Merged, "https://github.com/commaai/openpilot/pull/42")
            .await
            .unwrap();

        let loaded = storage.get_config(a.id).await.unwrap().unwrap();
        let linked = loaded.pull_requests[0].pull_request.as_ref().unwrap();
        assert_eq!(linked.state, PullRequestState::Merged);
        assert_eq!(loaded.repositories[0].repository.as_ref(), Some(&repo));

        let all = storage.list_configs().await.unwrap();
        assert!(all.iter().all(|c| {
            c.pull_requests[0].pull_request.as_ref().map(|p| p.state) == Some(PullRequestState::Merged)
        }));
    }

    #[tokio::test]
    async fn overlapping_root_rejected() {
        let storage = test_storage().await;
        let first = root(&storage, "Honda", "Civic", 2016, 2018).await;
        storage.insert_config(&first, None).await.unwrap();

        let overlapping = root(&storage, "Honda", "Civic", 2018, 2020).await;
        let err = storage.insert_config(&overlapping, None).await.unwrap_err();
        let errors = err.validation_errors().expect("validation error");
        assert_eq!(errors.on("vehicle_model"), vec![DUPLICATE_CONFIG_MESSAGE]);

        let disjoint = root(&storage, "Honda", "Civic", 2019, 2021).await;
        storage.insert_config(&disjoint, None).await.unwrap();
        let other_model = root(&storage, "Honda", "Accord", 2016, 2018).await;
        storage.insert_config(&other_model, None).await.unwrap();

        assert_eq!(storage.list_configs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn forks_skip_root_check_and_delete_cascades() {
        let storage = test_storage().await;
        let parent = root(&storage, "Toyota", "Prius", 2016, 2020).await;
        let mut fork = parent.clone();
        fork.id = ConfigId::new();
        fork.parent_id = Some(parent.id);
        fork.config_type = Some(ConfigType::Basic);

        storage
            .insert_configs(&[parent.clone(), fork.clone()], None)
            .await
            .unwrap();
        assert_eq!(storage.list_configs().await.unwrap().len(), 2);

        storage.delete_configs(&[fork.id, parent.id], Some("admin")).await.unwrap();
        assert!(storage.list_configs().await.unwrap().is_empty());

        let versions = storage.list_versions(VersionSort::CreatedAt, 10).await.unwrap();
        assert_eq!(versions.iter().filter(|v| v.event == "destroy").count(), 2);
    }

    #[tokio::test]
    async fn user_lookup_by_either_username() {
        let storage = test_storage().await;
        let user = User {
            id: UserId::new(),
            github_username: Some("octo".into()),
            slack_username: Some("octo_slack".into()),
            discord_username: Some("octo#1234".into()),
            avatar_url: None,
        };
        storage.insert_user(&user).await.unwrap();

        assert_eq!(storage.find_user_by_username("octo").await.unwrap(), Some(user.clone()));
        assert_eq!(storage.find_user_by_username("octo_slack").await.unwrap(), Some(user.clone()));
        assert!(storage.find_user_by_username("nobody").await.unwrap().is_none());
        assert_eq!(storage.get_user(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn guide_crud_and_source_uniqueness() {
        let storage = test_storage().await;
        let mut guide = Guide::from_source("https://blog.example.com/civic");
        guide.title = Some("Civic harness".into());
        guide.published_at = Some(Utc::now());
        storage.insert_guide(&guide, None).await.unwrap();
        assert!(storage.guide_source_exists("https://blog.example.com/civic").await.unwrap());

        let loaded = storage.get_guide(guide.id).await.unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("Civic harness"));
        assert_eq!(loaded.article_source_url, guide.article_source_url);

        let dup = Guide::from_source("https://blog.example.com/civic");
        let err = storage.insert_guide(&dup, None).await.unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().on("article_source_url"),
            vec!["has already been taken"]
        );

        guide.slug = Some("civic-harness-abc".into());
        storage.update_guide(&guide, None).await.unwrap();
        let loaded = storage.get_guide(guide.id).await.unwrap().unwrap();
        assert_eq!(loaded.slug.as_deref(), Some("civic-harness-abc"));
        assert_eq!(storage.list_guides().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_guide_insert_records_no_version() {
        let storage = test_storage().await;
        let guide = Guide::from_source("https://blog.example.com/prius");
        storage.insert_guide(&guide, Some("amy")).await.unwrap();
        let dup = Guide::from_source("https://blog.example.com/prius");
        assert!(storage.insert_guide(&dup, Some("amy")).await.is_err());

        let missing = Guide::new();
        assert!(storage.update_guide(&missing, None).await.is_err());

        let versions = storage.list_versions(VersionSort::CreatedAt, 10).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].item_id, guide.id.to_string());

        // The handle stays usable after the rolled-back writes.
        let other = Guide::from_source("https://blog.example.com/rav4");
        storage.insert_guide(&other, None).await.unwrap();
        assert_eq!(storage.list_versions(VersionSort::CreatedAt, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn debug_output_shows_mode_only() {
        let storage = test_storage().await;
        assert_eq!(format!("{storage:?}"), "Storage { readonly: false, .. }");
    }

    #[tokio::test]
    async fn latest_guide_image_wins() {
        let storage = test_storage().await;
        let guide = Guide {
            title: Some("Mounting".into()),
            markdown: Some("body".into()),
            ..Guide::new()
        };
        storage.insert_guide(&guide, None).await.unwrap();
        assert!(storage.latest_guide_image(guide.id).await.unwrap().is_none());

        storage.attach_guide_image(guide.id, "https://cdn.test/a.jpg").await.unwrap();
        storage.attach_guide_image(guide.id, "https://cdn.test/b.jpg").await.unwrap();
        assert_eq!(
            storage.latest_guide_image(guide.id).await.unwrap().as_deref(),
            Some("https://cdn.test/b.jpg")
        );
    }

    #[tokio::test]
    async fn versions_sorted_and_limited() {
        let storage = test_storage().await;
        storage.record_version("b", "Guide", VersionEvent::Create, Some("zoe")).await.unwrap();
        storage.record_version("a", "VehicleConfig", VersionEvent::Update, Some("amy")).await.unwrap();
        storage.record_version("c", "Guide", VersionEvent::Destroy, None).await.unwrap();

        let by_item = storage.list_versions(VersionSort::Item, 10).await.unwrap();
        let items: Vec<&str> = by_item.iter().map(|v| v.item_id.as_str()).collect();
        assert_eq!(items, vec!["a", "b", "c"]);

        let newest = storage.list_versions(VersionSort::CreatedAt, 1).await.unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].item_id, "c");
        assert!(newest[0].user.is_none());
    }

    #[tokio::test]
    async fn image_jobs_fifo() {
        let storage = test_storage().await;
        for id in ["g1", "g2"] {
            storage
                .enqueue_image_job(&ImageJob {
                    record_id: id.into(),
                    record_type: "Guide".into(),
                })
                .await
                .unwrap();
        }
        let jobs = storage.list_image_jobs().await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.record_id.as_str()).collect::<Vec<_>>(), vec!["g1", "g2"]);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("drivedb_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.find_or_create_make("Honda").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.find_or_create_make("Honda").await.is_ok());
        let result = ro.find_or_create_make("Subaru").await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
