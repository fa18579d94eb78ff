//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use drivedb_core::guide::{self, GuidePipeline};
use drivedb_core::vehicles::{AddVehicle, Vehicles};
use drivedb_core::MarkdownRenderer;
use drivedb_extract::Extractor;
use drivedb_shared::{
    AppConfig, ConfigId, ConfigStatus, ConfigType, DriveDbError, Guide, GuideId,
    PullRequestState, Speed, User, UserId, database_path, init_config, load_config,
};
use drivedb_storage::{Storage, VersionSort};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// drivedb: vehicle support database and community guides.
#[derive(Parser)]
#[command(
    name = "drivedb",
    version,
    about = "Manage vehicle support configurations and community guides.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides the config file).
    #[arg(long, env = "DRIVEDB_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Name recorded as the author of changes in the version history.
    #[arg(long = "as", env = "DRIVEDB_USER", global = true)]
    pub whodunnit: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Vehicle configurations.
    Vehicle {
        #[command(subcommand)]
        action: VehicleAction,
    },

    /// Community guides.
    Guide {
        #[command(subcommand)]
        action: GuideAction,
    },

    /// Registered users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Change history.
    Versions {
        #[command(subcommand)]
        action: VersionsAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum VehicleAction {
    /// Create a root configuration.
    Add {
        #[arg(long)]
        make: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        year_end: Option<i32>,
        /// factory, basic, standard or advanced (default: factory).
        #[arg(long = "type")]
        config_type: Option<ConfigType>,
        /// Trim name (repeatable).
        #[arg(long = "trim")]
        trims: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a dependent fork of a root configuration.
    Fork {
        id: ConfigId,
        #[arg(long = "type")]
        config_type: Option<ConfigType>,
    },
    /// Duplicate a configuration and its forks as a new root.
    Copy {
        id: ConfigId,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        year_end: Option<i32>,
    },
    /// Push a root's year range, make, model and trims to its forks.
    Propagate { id: ConfigId },
    /// Delete a configuration and all its forks.
    Remove { id: ConfigId },
    /// Show a configuration with status, difficulty and capability matrix.
    Show { id: ConfigId },
    /// List root configurations and their forks.
    List,
    /// Set the development status.
    Status { id: ConfigId, status: ConfigStatus },
    /// Attach a capability, optionally with a speed or timeout.
    Capability {
        id: ConfigId,
        name: String,
        #[arg(long, conflicts_with = "mph")]
        kph: Option<u32>,
        #[arg(long)]
        mph: Option<u32>,
        /// Timeout in seconds.
        #[arg(long)]
        timeout: Option<u32>,
    },
    /// Link a repository (`owner/name`).
    LinkRepo {
        id: ConfigId,
        full_name: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Link a pull request on the upstream repository.
    LinkPr {
        id: ConfigId,
        number: u32,
        #[arg(long, default_value = "open")]
        state: PullRequestState,
    },
}

#[derive(Subcommand)]
pub(crate) enum GuideAction {
    /// Create a guide from an article URL or from a local Markdown file.
    Add {
        #[arg(long, conflicts_with_all = ["title", "markdown_file"])]
        url: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        markdown_file: Option<PathBuf>,
    },
    /// Print a guide's JSON projection.
    Show { id: GuideId },
    /// List guides, newest first.
    List,
    /// Record a downloaded image for a guide.
    AttachImage { id: GuideId, url: String },
}

#[derive(Subcommand)]
pub(crate) enum UserAction {
    /// Register a user.
    Add {
        #[arg(long)]
        github: Option<String>,
        #[arg(long)]
        slack: Option<String>,
        #[arg(long)]
        discord: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum VersionsAction {
    /// Print the change history.
    List {
        #[arg(long, default_value = "created-at")]
        sort: SortColumn,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum SortColumn {
    Item,
    ItemType,
    User,
    CreatedAt,
}

impl From<SortColumn> for VersionSort {
    fn from(column: SortColumn) -> Self {
        match column {
            SortColumn::Item => Self::Item,
            SortColumn::ItemType => Self::ItemType,
            SortColumn::User => Self::User,
            SortColumn::CreatedAt => Self::CreatedAt,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "drivedb=info",
        1 => "drivedb=debug",
        _ => "drivedb=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let who = cli.whodunnit.as_deref();
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Vehicle { action } => {
            let ctx = Context::open(cli.db).await?;
            cmd_vehicle(&ctx, action, who).await
        }
        Command::Guide { action } => {
            let ctx = Context::open(cli.db).await?;
            cmd_guide(&ctx, action, who).await
        }
        Command::User { action } => {
            let ctx = Context::open(cli.db).await?;
            cmd_user(&ctx, action).await
        }
        Command::Versions {
            action: VersionsAction::List { sort, limit },
        } => {
            let ctx = Context::open(cli.db).await?;
            cmd_versions(&ctx, sort.into(), limit).await
        }
    }
}

/// Loaded config plus the opened database.
struct Context {
    config: AppConfig,
    storage: Storage,
}

impl Context {
    async fn open(db: Option<PathBuf>) -> Result<Self> {
        let config = load_config()?;
        let path = match db {
            Some(path) => path,
            None => database_path(&config)?,
        };
        info!(path = %path.display(), "opening database");
        let storage = Storage::open(&path).await?;
        Ok(Self { config, storage })
    }

    fn vehicles(&self) -> Vehicles<'_> {
        Vehicles {
            storage: &self.storage,
            upstream: &self.config.presentation.upstream_repository,
        }
    }
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

async fn cmd_vehicle(ctx: &Context, action: VehicleAction, who: Option<&str>) -> Result<()> {
    let vehicles = ctx.vehicles();
    match action {
        VehicleAction::Add {
            make,
            model,
            year,
            year_end,
            config_type,
            trims,
            description,
        } => {
            let request = AddVehicle {
                make,
                model,
                year,
                year_end,
                config_type,
                trims,
                description,
            };
            let config = vehicles.add(request, who).await.map_err(report)?;
            println!("  Created: {} ({})", config.title, config.id);
        }
        VehicleAction::Fork { id, config_type } => {
            let fork = vehicles.fork(id, config_type, who).await.map_err(report)?;
            println!("  Forked:  {} ({})", fork.title, fork.id);
        }
        VehicleAction::Copy { id, year, year_end } => {
            let copy = vehicles.copy(id, year, year_end, who).await.map_err(report)?;
            println!("  Copied:  {} ({})", copy.title, copy.id);
        }
        VehicleAction::Propagate { id } => {
            let forks = vehicles.propagate(id, who).await?;
            println!("  Updated {} fork(s)", forks.len());
        }
        VehicleAction::Remove { id } => {
            let removed = vehicles.remove(id, who).await?;
            println!("  Removed {} config(s)", removed.len());
        }
        VehicleAction::Show { id } => {
            let view = vehicles.view(id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        VehicleAction::List => {
            let tree = vehicles.load_tree().await?;
            if tree.is_empty() {
                println!("  No vehicle configs yet.");
            }
            for root in tree.roots() {
                println!("  {}  {}", root.id, root.title);
                for fork in tree.forks_of(root.id) {
                    println!("    └ {}  {}", fork.id, fork.title);
                }
            }
        }
        VehicleAction::Status { id, status } => {
            let config = vehicles
                .update(
                    id,
                    |c| {
                        c.status = Some(status);
                        Ok(())
                    },
                    who,
                )
                .await?;
            println!("  {}: {}", config.title, status);
        }
        VehicleAction::Capability {
            id,
            name,
            kph,
            mph,
            timeout,
        } => {
            let speed = kph.map(Speed::from_kph).or(mph.map(Speed::from_mph));
            let config = vehicles
                .add_capability(id, &name, speed, timeout, who)
                .await
                .map_err(report)?;
            println!("  {}: {} capabilities", config.title, config.capability_count());
        }
        VehicleAction::LinkRepo {
            id,
            full_name,
            branch,
        } => {
            let config = vehicles.link_repository(id, &full_name, branch, who).await?;
            println!("  {}: linked {full_name}", config.title);
        }
        VehicleAction::LinkPr { id, number, state } => {
            let config = vehicles.link_pull_request(id, number, state, who).await?;
            println!("  {}: linked pull request #{number}", config.title);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Guides
// ---------------------------------------------------------------------------

async fn cmd_guide(ctx: &Context, action: GuideAction, who: Option<&str>) -> Result<()> {
    match action {
        GuideAction::Add {
            url,
            title,
            markdown_file,
        } => {
            let mut guide = match url {
                Some(url) => Guide::from_source(url),
                None => {
                    let markdown = match &markdown_file {
                        Some(path) => Some(
                            std::fs::read_to_string(path)
                                .wrap_err_with(|| format!("failed to read {}", path.display()))?,
                        ),
                        None => None,
                    };
                    Guide {
                        title,
                        markdown,
                        ..Guide::new()
                    }
                }
            };

            let extractor = Extractor::new(&ctx.config.extraction)?;
            let renderer = MarkdownRenderer::from_config(&ctx.config.render)?;
            let pipeline = GuidePipeline {
                storage: &ctx.storage,
                extractor: &extractor,
                renderer: &renderer,
            };

            let spinner = spinner("Saving guide");
            let saved = pipeline.save(&mut guide, None, who).await;
            spinner.finish_and_clear();
            let outcome = saved.map_err(report)?;

            println!();
            println!("  Guide saved!");
            println!("  ID:      {}", guide.id);
            println!("  Title:   {}", guide.title.as_deref().unwrap_or_default());
            println!("  Slug:    {}", guide.slug.as_deref().unwrap_or_default());
            println!("  Fetched: {}", outcome.fetched);
            if let Some(job) = outcome.image_job {
                println!("  Image job: #{job}");
            }
            println!();
        }
        GuideAction::Show { id } => {
            let guide = find_guide(ctx, id).await?;
            let summary = guide::summary(&ctx.storage, &guide).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        GuideAction::List => {
            let guides = ctx.storage.list_guides().await?;
            if guides.is_empty() {
                println!("  No guides yet.");
            }
            for g in &guides {
                println!(
                    "  {}  {:<8} {} min  {}",
                    g.id,
                    guide::friendly_date(g, chrono::Utc::now()),
                    guide::reading_time(g),
                    g.title.as_deref().unwrap_or_default()
                );
            }
        }
        GuideAction::AttachImage { id, url } => {
            let guide = find_guide(ctx, id).await?;
            let image = guide::attach_image(&ctx.storage, &guide, &url).await.map_err(report)?;
            println!("  Attached image #{image} to {id}");
        }
    }
    Ok(())
}

async fn find_guide(ctx: &Context, id: GuideId) -> Result<Guide> {
    ctx.storage
        .get_guide(id)
        .await?
        .ok_or_else(|| DriveDbError::not_found("guide", id).into())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// Users, versions, config
// ---------------------------------------------------------------------------

async fn cmd_user(ctx: &Context, action: UserAction) -> Result<()> {
    let UserAction::Add {
        github,
        slack,
        discord,
        avatar,
    } = action;
    if github.is_none() && slack.is_none() && discord.is_none() {
        return Err(eyre!("at least one of --github, --slack or --discord is required"));
    }
    let user = User {
        id: UserId::new(),
        github_username: github,
        slack_username: slack,
        discord_username: discord,
        avatar_url: avatar,
    };
    ctx.storage.insert_user(&user).await?;
    println!("  Registered user {}", user.id);
    Ok(())
}

async fn cmd_versions(ctx: &Context, sort: VersionSort, limit: u32) -> Result<()> {
    let versions = ctx.storage.list_versions(sort, limit).await?;
    println!("  {:<38} {:<14} {:<8} {:<16} CREATED", "ITEM", "TYPE", "EVENT", "USER");
    for v in &versions {
        println!(
            "  {:<38} {:<14} {:<8} {:<16} {}",
            v.item_id,
            v.item_type,
            v.event,
            v.user.as_deref().unwrap_or("-"),
            v.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Render validation failures one field per line.
fn report(err: DriveDbError) -> color_eyre::Report {
    match err.validation_errors() {
        Some(errors) => {
            let lines = errors
                .iter()
                .map(|e| format!("  {}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("\n");
            eyre!("validation failed:\n{lines}")
        }
        None => err.into(),
    }
}
