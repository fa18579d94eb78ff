//! Core domain types for drivedb: vehicle configurations, capabilities,
//! linked repositories/pull requests, guides, users and version records.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DriveDbError, Result};

/// Capability whose timeout only applies once vision monitoring is disabled.
pub const DRIVER_MONITOR_ADVANCED: &str = "Driver Monitor (advanced, vision)";

/// Placeholder title given to guides created without one.
pub const NEW_GUIDE_TITLE: &str = "New Untitled Guide";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a vehicle configuration node.
    ConfigId
);
uuid_id!(
    /// Identifier of a guide.
    GuideId
);
uuid_id!(
    /// Identifier of a registered platform user.
    UserId
);

// ---------------------------------------------------------------------------
// ConfigType
// ---------------------------------------------------------------------------

/// Support level of a configuration, ordered by ascending difficulty.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Factory,
    Basic,
    Standard,
    Advanced,
}

impl ConfigType {
    /// Every type, easiest first.
    pub const ALL: [ConfigType; 4] = [
        ConfigType::Factory,
        ConfigType::Basic,
        ConfigType::Standard,
        ConfigType::Advanced,
    ];

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Factory => "Factory",
            Self::Basic => "Basic",
            Self::Standard => "Standard",
            Self::Advanced => "Advanced",
        }
    }

    /// Storage key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Factory => "factory",
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }

    /// Difficulty rank; lower is easier.
    pub const fn difficulty_level(self) -> u8 {
        match self {
            Self::Factory => 0,
            Self::Basic => 1,
            Self::Standard => 2,
            Self::Advanced => 3,
        }
    }

    /// Short explanation shown next to matrix cells.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Factory => "Driving assistance shipped by the manufacturer.",
            Self::Basic => "Plug-and-play install with an off-the-shelf harness.",
            Self::Standard => "Requires a vehicle-specific harness or minor modification.",
            Self::Advanced => "Requires custom hardware, firmware or wiring work.",
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigType {
    type Err = DriveDbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DriveDbError::invalid("vehicle_config_type", format!("unknown type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ConfigStatus
// ---------------------------------------------------------------------------

/// Community-development state of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    Researching,
    InDevelopment,
    PullRequest,
    Community,
    Upstreamed,
    Archived,
}

impl ConfigStatus {
    pub const ALL: [ConfigStatus; 6] = [
        ConfigStatus::Researching,
        ConfigStatus::InDevelopment,
        ConfigStatus::PullRequest,
        ConfigStatus::Community,
        ConfigStatus::Upstreamed,
        ConfigStatus::Archived,
    ];

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Researching => "Researching",
            Self::InDevelopment => "In Development",
            Self::PullRequest => "Pull Request",
            Self::Community => "Community",
            Self::Upstreamed => "Upstreamed",
            Self::Archived => "Archived",
        }
    }

    /// Storage key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Researching => "researching",
            Self::InDevelopment => "in_development",
            Self::PullRequest => "pull_request",
            Self::Community => "community",
            Self::Upstreamed => "upstreamed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigStatus {
    type Err = DriveDbError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s) || st.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DriveDbError::invalid("vehicle_config_status", format!("unknown status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Vehicle catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleMake {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleModel {
    pub id: i64,
    pub make_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleTrim {
    pub id: i64,
    pub model_id: i64,
    pub name: String,
    pub year: i32,
}

/// A concrete body/engine style of a trim, used for the cached trim-style count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimStyle {
    pub id: i64,
    pub trim_id: i64,
    pub model_id: i64,
    pub year: i32,
    pub name: String,
}

/// Optional factory package (e.g. "Honda Sensing").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakePackage {
    pub id: i64,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A named driving-assistance feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub id: i64,
    pub name: String,
}

impl Capability {
    /// Parameterized key used in the capability matrix.
    pub fn key(&self) -> String {
        parameterize(&self.name)
    }
}

/// Speed threshold, stored in both units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    pub mph: u32,
    pub kph: u32,
}

impl Speed {
    pub fn from_kph(kph: u32) -> Self {
        Self {
            mph: (f64::from(kph) * 0.621_371).round() as u32,
            kph,
        }
    }

    pub fn from_mph(mph: u32) -> Self {
        Self {
            mph,
            kph: (f64::from(mph) * 1.609_344).round() as u32,
        }
    }
}

/// A capability attached to a configuration, optionally qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCapability {
    /// Join-record identifier.
    pub id: i64,
    pub capability: Capability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl ConfigCapability {
    pub fn plain(id: i64, capability: Capability) -> Self {
        Self {
            id,
            capability,
            speed: None,
            timeout_secs: None,
        }
    }

    /// Timeout as human-friendly text, e.g. `"1 minute 30 seconds"`.
    pub fn timeout_friendly(&self) -> Option<String> {
        self.timeout_secs.map(friendly_duration)
    }
}

fn friendly_duration(secs: u32) -> String {
    fn unit(n: u32, singular: &str) -> String {
        if n == 1 {
            format!("1 {singular}")
        } else {
            format!("{n} {singular}s")
        }
    }

    let (minutes, seconds) = (secs / 60, secs % 60);
    match (minutes, seconds) {
        (0, s) => unit(s, "second"),
        (m, 0) => unit(m, "minute"),
        (m, s) => format!("{} {}", unit(m, "minute"), unit(s, "second")),
    }
}

/// A physical or software modification required by a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Repositories and pull requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    /// `owner/name`.
    pub full_name: String,
    pub url: String,
}

/// Link from a configuration to a repository (and optionally a branch).
///
/// Only the join record is persisted with the configuration; `repository` is
/// resolved from the repositories table on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryLink {
    pub id: i64,
    pub repository_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl RepositoryLink {
    pub fn new(id: i64, repository: Repository, branch: Option<String>) -> Self {
        Self {
            id,
            repository_id: repository.id,
            repository: Some(repository),
            branch,
        }
    }

    /// `owner/name#branch`, or just `owner/name` without a branch.
    pub fn label(&self) -> Option<String> {
        let repo = self.repository.as_ref()?;
        Some(match self.branch.as_deref().filter(|b| !b.is_empty()) {
            Some(branch) => format!("{}#{branch}", repo.full_name),
            None => repo.full_name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }
}

impl FromStr for PullRequestState {
    type Err = DriveDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "merged" => Ok(Self::Merged),
            other => Err(DriveDbError::parse(format!("unknown pull request state '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: u32,
    pub state: PullRequestState,
    pub html_url: String,
}

/// Link from a configuration to a pull request. Like [`RepositoryLink`], the
/// pull request itself (and so its state) is resolved on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLink {
    pub id: i64,
    pub pull_request_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
}

// ---------------------------------------------------------------------------
// VehicleConfig
// ---------------------------------------------------------------------------

/// A node in the configuration tree: a root "Factory" config or one of its forks.
///
/// `parent_id` is a lookup-only back-reference; forks are owned by the tree's
/// parent index, never embedded in the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub id: ConfigId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ConfigId>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub year: i32,
    pub year_end: i32,
    pub make: VehicleMake,
    pub model: VehicleModel,
    #[serde(default)]
    pub trims: Vec<VehicleTrim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make_package: Option<MakePackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_type: Option<ConfigType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConfigStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<ConfigCapability>,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    #[serde(default)]
    pub repositories: Vec<RepositoryLink>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestLink>,
    #[serde(default)]
    pub trim_styles_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleConfig {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Inclusive year range, tolerant of an inverted end.
    pub fn year_range(&self) -> RangeInclusive<i32> {
        self.year..=self.year_end.max(self.year)
    }

    /// `"2016-2018"` for spans, `"2017"` for a single year.
    pub fn year_range_str(&self) -> String {
        if self.year_end != self.year {
            format!("{}-{}", self.year, self.year_end)
        } else {
            self.year.to_string()
        }
    }

    /// Replace the year range, following the single-sided defaults.
    pub fn set_year_range(&mut self, start: Option<i32>, end: Option<i32>) -> Result<()> {
        let (year, year_end) = match (start, end) {
            (Some(s), Some(e)) => (s, e),
            (None, Some(e)) => (e, e),
            (Some(s), None) => (s, s),
            (None, None) => return Err(DriveDbError::invalid("year", "can't be blank")),
        };
        self.year = year;
        self.year_end = normalize_year_end(year, Some(year_end));
        Ok(())
    }

    /// `"{years} {make} {model}"`.
    pub fn name(&self) -> String {
        format!(
            "{} {} {}",
            self.year_range_str(),
            self.make.name,
            self.model.name
        )
    }

    /// Title including the support level, recomputed on every normalize.
    pub fn compute_title(&self) -> String {
        match self.config_type {
            Some(t) => format!("{} {}", self.name(), t.name()),
            None => self.name(),
        }
    }

    pub fn has_capability(&self, capability_id: i64) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.capability.id == capability_id)
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_type(&self, config_type: ConfigType) -> bool {
        self.config_type == Some(config_type)
    }

    pub fn is_upstreamed(&self) -> bool {
        self.status == Some(ConfigStatus::Upstreamed)
    }

    pub fn is_community_supported(&self) -> bool {
        self.status == Some(ConfigStatus::Community)
    }

    pub fn is_pull_request(&self) -> bool {
        self.status == Some(ConfigStatus::PullRequest)
    }

    pub fn is_in_development(&self) -> bool {
        self.status == Some(ConfigStatus::InDevelopment)
    }

    /// Comma-joined trim names.
    pub fn trim_names(&self) -> String {
        self.trims
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `year_end` defaults to `year` when unset or earlier than `year`.
pub fn normalize_year_end(year: i32, year_end: Option<i32>) -> i32 {
    year_end.map_or(year, |end| end.max(year))
}

// ---------------------------------------------------------------------------
// Users and guides
// ---------------------------------------------------------------------------

/// A registered platform user that guide authors are matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A community article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub id: GuideId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Markdown body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    /// Rendered HTML cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Guide {
    /// A blank, unsaved guide.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: GuideId::new(),
            title: None,
            markdown: None,
            markup: None,
            article_source_url: None,
            source_image_url: None,
            author_name: None,
            excerpt: None,
            reference_domain: None,
            published_at: None,
            user_id: None,
            slug: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A guide to be fetched from `url`.
    pub fn from_source(url: impl Into<String>) -> Self {
        Self {
            article_source_url: Some(url.into()),
            ..Self::new()
        }
    }

    /// Whether the article has a real title.
    pub fn is_published(&self) -> bool {
        self.title.as_deref() != Some(NEW_GUIDE_TITLE)
    }
}

impl Default for Guide {
    fn default() -> Self {
        Self::new()
    }
}

/// Author identity shown with a guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub image: Option<String>,
}

/// Public JSON projection of a guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideSummary {
    pub id: GuideId,
    pub image: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub slug: Option<String>,
    pub author: Author,
}

// ---------------------------------------------------------------------------
// Versions and jobs
// ---------------------------------------------------------------------------

/// Audit row recorded for every persisted change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: i64,
    pub item_id: String,
    pub item_type: String,
    /// `create`, `update` or `destroy`.
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request for the external worker to download a record's source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageJob {
    pub record_id: String,
    pub record_type: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase, ASCII-alphanumeric words joined with `-`.
pub fn parameterize(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(year: i32, year_end: i32) -> VehicleConfig {
        let now = Utc::now();
        VehicleConfig {
            id: ConfigId::new(),
            parent_id: None,
            title: String::new(),
            slug: None,
            year,
            year_end,
            make: VehicleMake {
                id: 1,
                name: "Honda".into(),
            },
            model: VehicleModel {
                id: 10,
                make_id: 1,
                name: "Civic".into(),
            },
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

    #[test]
    fn config_id_roundtrip() {
        let id = ConfigId::new();
        let parsed: ConfigId = id.to_string().parse().expect("parse ConfigId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn config_type_orders_by_difficulty() {
        let mut types = vec![
            ConfigType::Advanced,
            ConfigType::Factory,
            ConfigType::Standard,
            ConfigType::Basic,
        ];
        types.sort();
        assert_eq!(types, ConfigType::ALL.to_vec());
        assert!(ConfigType::Basic.difficulty_level() < ConfigType::Advanced.difficulty_level());
        assert_eq!("Standard".parse::<ConfigType>().unwrap(), ConfigType::Standard);
        assert!("expert".parse::<ConfigType>().is_err());
    }

    #[test]
    fn status_parses_display_and_storage_names() {
        assert_eq!(
            "In Development".parse::<ConfigStatus>().unwrap(),
            ConfigStatus::InDevelopment
        );
        assert_eq!(
            "pull_request".parse::<ConfigStatus>().unwrap(),
            ConfigStatus::PullRequest
        );
    }

    #[test]
    fn year_end_normalization() {
        for (year, end) in [(2017, None), (2017, Some(2015)), (2017, Some(2019)), (2017, Some(2017))] {
            let normalized = normalize_year_end(year, end);
            assert_eq!(normalized, year.max(end.unwrap_or(year)));
        }
    }

    #[test]
    fn year_range_strings() {
        assert_eq!(config(2016, 2018).year_range_str(), "2016-2018");
        assert_eq!(config(2017, 2017).year_range_str(), "2017");
        assert_eq!(config(2016, 2018).name(), "2016-2018 Honda Civic");
        assert_eq!(config(2017, 2017).compute_title(), "2017 Honda Civic Factory");
    }

    #[test]
    fn set_year_range_single_sided() {
        let mut c = config(2017, 2017);
        c.set_year_range(None, Some(2019)).unwrap();
        assert_eq!((c.year, c.year_end), (2019, 2019));
        c.set_year_range(Some(2015), None).unwrap();
        assert_eq!((c.year, c.year_end), (2015, 2015));
        c.set_year_range(Some(2018), Some(2016)).unwrap();
        assert_eq!((c.year, c.year_end), (2018, 2018));
        assert!(c.set_year_range(None, None).is_err());
    }

    #[test]
    fn speed_conversions() {
        assert_eq!(Speed::from_kph(40), Speed { mph: 25, kph: 40 });
        assert_eq!(Speed::from_mph(25), Speed { mph: 25, kph: 40 });
    }

    #[test]
    fn timeout_friendly_text() {
        let cap = |secs| ConfigCapability {
            timeout_secs: Some(secs),
            ..ConfigCapability::plain(1, Capability { id: 1, name: "Steering".into() })
        };
        assert_eq!(cap(1).timeout_friendly().unwrap(), "1 second");
        assert_eq!(cap(45).timeout_friendly().unwrap(), "45 seconds");
        assert_eq!(cap(120).timeout_friendly().unwrap(), "2 minutes");
        assert_eq!(cap(90).timeout_friendly().unwrap(), "1 minute 30 seconds");
    }

    #[test]
    fn repository_link_label() {
        let link = RepositoryLink::new(
            1,
            Repository {
                id: 7,
                full_name: "user/openpilot".into(),
                url: "https://github.com/user/openpilot".into(),
            },
            Some("civic-2017".into()),
        );
        assert_eq!(link.repository_id, 7);
        assert_eq!(link.label().unwrap(), "user/openpilot#civic-2017");

        let bare = RepositoryLink { branch: None, ..link };
        assert_eq!(bare.label().unwrap(), "user/openpilot");
    }

    #[test]
    fn parameterize_words() {
        assert_eq!(parameterize("Driver Monitor (advanced, vision)"), "driver-monitor-advanced-vision");
        assert_eq!(parameterize("  2017 Honda Civic  "), "2017-honda-civic");
    }

    #[test]
    fn guide_published_flag() {
        let mut guide = Guide::new();
        guide.title = Some(NEW_GUIDE_TITLE.into());
        assert!(!guide.is_published());
        guide.title = Some("Installing a harness".into());
        assert!(guide.is_published());
    }
}
