//! Shared types, error model, and configuration for drivedb.
//!
//! This crate is the foundation depended on by all other drivedb crates.
//! It provides:
//! - [`DriveDbError`], the unified error type, with field-scoped [`ValidationErrors`]
//! - Domain types ([`VehicleConfig`], [`ConfigType`], [`Guide`], [`User`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, ExtractionConfig, PresentationConfig, RenderConfig, config_dir,
    config_file_path, database_path, init_config, load_config, load_config_from, secret_from_env,
};
pub use error::{DUPLICATE_CONFIG_MESSAGE, DriveDbError, FieldError, Result, ValidationErrors};
pub use types::{
    Author, Capability, ConfigCapability, ConfigId, ConfigStatus, ConfigType,
    DRIVER_MONITOR_ADVANCED, Guide, GuideId, GuideSummary, ImageJob, MakePackage, Modification,
    NEW_GUIDE_TITLE, PullRequest, PullRequestLink, PullRequestState, Repository, RepositoryLink,
    Speed, TrimStyle, User, UserId, VehicleConfig, VehicleMake, VehicleModel, VehicleTrim,
    Version, normalize_year_end, parameterize,
};
