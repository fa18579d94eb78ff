//! Capability matrix and difficulty ranking.
//!
//! The matrix answers "which capability does each support level offer, and
//! how well" for a configuration and its forks. It is sparse: a
//! (type, capability) pair with no record is simply absent.

use std::collections::BTreeMap;

use serde::Serialize;

use drivedb_shared::{ConfigCapability, ConfigType, DRIVER_MONITOR_ADVANCED, Speed, VehicleConfig};

use crate::tree::ConfigTree;

/// How a capability is offered at one support level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellValue {
    /// Offered, with no qualifier.
    Supported,
    /// Offered above a speed threshold.
    Speed { mph: u32, kph: u32 },
    /// Offered for a limited time. `unlimited` marks the driver-monitor case,
    /// where the timeout only applies once monitoring is disabled.
    Timeout { friendly: String, unlimited: bool },
}

impl CellValue {
    fn from_record(record: &ConfigCapability) -> Self {
        if let Some(friendly) = record.timeout_friendly() {
            return Self::Timeout {
                friendly,
                unlimited: record.capability.name == DRIVER_MONITOR_ADVANCED,
            };
        }
        match record.speed {
            Some(Speed { mph, kph }) => Self::Speed { mph, kph },
            None => Self::Supported,
        }
    }

    /// Display lines, in order.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Supported => vec!["Supported".into()],
            Self::Speed { mph, kph } => vec![format!("{mph} mph"), format!("{kph} kph")],
            Self::Timeout {
                friendly,
                unlimited: true,
            } => vec!["Unlimited".into(), format!("{friendly} if disabled")],
            Self::Timeout { friendly, .. } => vec![friendly.clone()],
        }
    }

    /// HTML fragment for table cells.
    pub fn to_html(&self) -> String {
        match self {
            Self::Supported => r#"<span class="fa fa-check"></span>"#.into(),
            _ => self
                .lines()
                .iter()
                .map(|line| format!(r#"<span class="line">{line}</span>"#))
                .collect(),
        }
    }
}

/// One populated matrix cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub value: CellValue,
    /// Support level name.
    pub label: String,
    /// Support level description.
    pub details: String,
    /// The capability record the cell was derived from.
    pub capability: ConfigCapability,
}

/// Support level → capability key → cell, levels easiest first.
pub type CapabilityMatrix = BTreeMap<ConfigType, BTreeMap<String, MatrixCell>>;

/// Build the matrix for `config` and its direct `forks`.
///
/// Levels are those assigned to the config or any fork. Rows are the config's
/// own capabilities; a capability only a fork lists gets no row. For each cell
/// the config's own record wins, then the forks' in order.
pub fn capability_matrix(config: &VehicleConfig, forks: &[&VehicleConfig]) -> CapabilityMatrix {
    let members: Vec<&VehicleConfig> = std::iter::once(config).chain(forks.iter().copied()).collect();

    let mut rows: Vec<&ConfigCapability> = Vec::new();
    for record in &config.capabilities {
        if !rows.iter().any(|r| r.capability.id == record.capability.id) {
            rows.push(record);
        }
    }

    let mut matrix = CapabilityMatrix::new();
    for level in ConfigType::ALL {
        let at_level: Vec<&VehicleConfig> = members.iter().copied().filter(|m| m.is_type(level)).collect();
        if at_level.is_empty() {
            continue;
        }

        let cells = matrix.entry(level).or_default();
        for row in &rows {
            let found = at_level.iter().find_map(|m| {
                m.capabilities
                    .iter()
                    .find(|c| c.capability.id == row.capability.id)
            });
            if let Some(record) = found {
                cells.insert(
                    row.capability.key(),
                    MatrixCell {
                        value: CellValue::from_record(record),
                        label: level.name().to_string(),
                        details: level.description().to_string(),
                        capability: record.clone(),
                    },
                );
            }
        }
    }
    matrix
}

/// Easiest support level among the direct forks.
///
/// A config with no typed forks claims only [`ConfigType::Advanced`].
pub fn minimum_difficulty(forks: &[&VehicleConfig]) -> ConfigType {
    forks
        .iter()
        .filter_map(|f| f.config_type)
        .min_by_key(|t| t.difficulty_level())
        .unwrap_or(ConfigType::Advanced)
}

/// Severity class used when coloring a difficulty badge.
pub fn difficulty_class(difficulty: ConfigType) -> &'static str {
    match difficulty {
        ConfigType::Advanced => "danger",
        ConfigType::Standard => "info",
        ConfigType::Basic => "warning",
        ConfigType::Factory => "danger",
    }
}

impl ConfigTree {
    /// [`capability_matrix`] for a node of this tree; empty for unknown ids.
    pub fn capability_matrix(&self, id: drivedb_shared::ConfigId) -> CapabilityMatrix {
        match self.get(id) {
            Some(config) => capability_matrix(config, &self.forks_of(id)),
            None => CapabilityMatrix::new(),
        }
    }

    /// [`minimum_difficulty`] for a node of this tree.
    pub fn minimum_difficulty(&self, id: drivedb_shared::ConfigId) -> ConfigType {
        minimum_difficulty(&self.forks_of(id))
    }
}
