//! Storage-backed vehicle configuration operations.
//!
//! Each operation loads the tree, applies the in-memory change through
//! [`ConfigTree`], and writes the touched nodes back in one transaction.
//! Root uniqueness is checked by both layers; the storage check is the one
//! that holds under concurrent writers.

use serde::Serialize;
use tracing::{info, instrument};

use drivedb_shared::{
    ConfigId, ConfigType, DriveDbError, PullRequestState, Result, Speed, VehicleConfig,
};
use drivedb_storage::Storage;

use crate::matrix::{CapabilityMatrix, difficulty_class};
use crate::status::{StatusPresentation, status_presentation};
use crate::tree::{ConfigTree, NewConfig};

/// Everything shown for one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub config: VehicleConfig,
    pub status: StatusPresentation,
    pub minimum_difficulty: ConfigType,
    pub difficulty_class: &'static str,
    pub capability_matrix: CapabilityMatrix,
    pub forks: Vec<ForkSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForkSummary {
    pub id: ConfigId,
    pub title: String,
    pub config_type: Option<ConfigType>,
}

/// Request for a new root configuration, by catalog names.
#[derive(Debug, Clone)]
pub struct AddVehicle {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub year_end: Option<i32>,
    pub config_type: Option<ConfigType>,
    pub trims: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Vehicles<'a> {
    pub storage: &'a Storage,
    /// Repository that "Upstreamed" refers to.
    pub upstream: &'a str,
}

impl Vehicles<'_> {
    pub async fn load_tree(&self) -> Result<ConfigTree> {
        Ok(ConfigTree::from_configs(self.storage.list_configs().await?))
    }

    #[instrument(skip_all, fields(make = %request.make, model = %request.model, year = request.year))]
    pub async fn add(&self, request: AddVehicle, whodunnit: Option<&str>) -> Result<VehicleConfig> {
        let make = self.storage.find_or_create_make(&request.make).await?;
        let model = self.storage.find_or_create_model(&make, &request.model).await?;
        let mut trims = Vec::with_capacity(request.trims.len());
        for name in &request.trims {
            trims.push(self.storage.find_or_create_trim(&model, name, request.year).await?);
        }

        let mut tree = self.load_tree().await?;
        let id = tree.create_root(NewConfig {
            year_end: request.year_end,
            config_type: request.config_type,
            trims,
            description: request.description,
            ..NewConfig::new(make, model, request.year)
        })?;
        self.refresh_trim_styles(&mut tree, id).await?;

        let config = node(&tree, id)?.clone();
        self.storage.insert_config(&config, whodunnit).await?;
        Ok(config)
    }

    #[instrument(skip(self, whodunnit))]
    pub async fn fork(
        &self,
        parent: ConfigId,
        config_type: Option<ConfigType>,
        whodunnit: Option<&str>,
    ) -> Result<VehicleConfig> {
        let mut tree = self.load_tree().await?;
        let id = tree.fork(parent, config_type)?;
        let child = node(&tree, id)?.clone();
        self.storage.insert_config(&child, whodunnit).await?;
        Ok(child)
    }

    /// Duplicate a configuration and all its forks as a new root, optionally
    /// moved to another year range.
    #[instrument(skip(self, whodunnit))]
    pub async fn copy(
        &self,
        id: ConfigId,
        year: Option<i32>,
        year_end: Option<i32>,
        whodunnit: Option<&str>,
    ) -> Result<VehicleConfig> {
        let mut tree = self.load_tree().await?;
        let mut subtree = tree.copy(id)?;
        if year.is_some() || year_end.is_some() {
            subtree.set_year_range(year, year_end)?;
        }
        let ids: Vec<ConfigId> = subtree.nodes().iter().map(|n| n.id).collect();
        let root_id = tree.insert_subtree(subtree)?;
        self.refresh_trim_styles(&mut tree, root_id).await?;

        let nodes = ids
            .iter()
            .map(|id| node(&tree, *id).cloned())
            .collect::<Result<Vec<_>>>()?;
        self.storage.insert_configs(&nodes, whodunnit).await?;
        info!(source = %id, copy = %root_id, nodes = nodes.len(), "config copied");
        Ok(node(&tree, root_id)?.clone())
    }

    /// Push the parent's identity fields onto its forks. Returns the forks.
    #[instrument(skip(self, whodunnit))]
    pub async fn propagate(&self, parent: ConfigId, whodunnit: Option<&str>) -> Result<Vec<VehicleConfig>> {
        let mut tree = self.load_tree().await?;
        let ids = tree.propagate(parent)?;
        let forks = ids
            .iter()
            .map(|id| node(&tree, *id).cloned())
            .collect::<Result<Vec<_>>>()?;
        self.storage.update_configs(&forks, whodunnit).await?;
        Ok(forks)
    }

    /// Delete a configuration and every descendant. Returns the deleted ids.
    #[instrument(skip(self, whodunnit))]
    pub async fn remove(&self, id: ConfigId, whodunnit: Option<&str>) -> Result<Vec<ConfigId>> {
        let mut tree = self.load_tree().await?;
        let removed = tree.destroy(id)?;
        self.storage.delete_configs(&removed, whodunnit).await?;
        Ok(removed)
    }

    /// Edit a node's own fields. Roots get their trim-style count refreshed.
    pub async fn update<F>(&self, id: ConfigId, edit: F, whodunnit: Option<&str>) -> Result<VehicleConfig>
    where
        F: FnOnce(&mut VehicleConfig) -> Result<()>,
    {
        let mut tree = self.load_tree().await?;
        tree.update(id, edit)?;
        self.refresh_trim_styles(&mut tree, id).await?;
        let config = node(&tree, id)?.clone();
        self.storage.update_config(&config, whodunnit).await?;
        Ok(config)
    }

    pub async fn add_capability(
        &self,
        id: ConfigId,
        name: &str,
        speed: Option<Speed>,
        timeout_secs: Option<u32>,
        whodunnit: Option<&str>,
    ) -> Result<VehicleConfig> {
        if name.trim().is_empty() {
            return Err(DriveDbError::invalid("capability", "can't be blank"));
        }
        let capability = self.storage.find_or_create_capability(name).await?;
        let mut tree = self.load_tree().await?;
        tree.add_capability(id, capability, speed, timeout_secs)?;
        let config = node(&tree, id)?.clone();
        self.storage.update_config(&config, whodunnit).await?;
        Ok(config)
    }

    pub async fn link_repository(
        &self,
        id: ConfigId,
        full_name: &str,
        branch: Option<String>,
        whodunnit: Option<&str>,
    ) -> Result<VehicleConfig> {
        let url = format!("https://github.com/{full_name}");
        let repository = self.storage.upsert_repository(full_name, &url).await?;
        let mut tree = self.load_tree().await?;
        tree.link_repository(id, repository, branch)?;
        let config = node(&tree, id)?.clone();
        self.storage.update_config(&config, whodunnit).await?;
        Ok(config)
    }

    pub async fn link_pull_request(
        &self,
        id: ConfigId,
        number: u32,
        state: PullRequestState,
        whodunnit: Option<&str>,
    ) -> Result<VehicleConfig> {
        let html_url = format!("https://github.com/{}/pull/{number}", self.upstream);
        let pull_request = self.storage.upsert_pull_request(number, state, &html_url).await?;
        let mut tree = self.load_tree().await?;
        tree.link_pull_request(id, pull_request)?;
        let config = node(&tree, id)?.clone();
        self.storage.update_config(&config, whodunnit).await?;
        Ok(config)
    }

    /// Derived presentation of one configuration.
    pub async fn view(&self, id: ConfigId) -> Result<ConfigView> {
        let tree = self.load_tree().await?;
        let config = node(&tree, id)?;
        let difficulty = tree.minimum_difficulty(id);
        Ok(ConfigView {
            status: status_presentation(config, self.upstream),
            minimum_difficulty: difficulty,
            difficulty_class: difficulty_class(difficulty),
            capability_matrix: tree.capability_matrix(id),
            forks: tree
                .forks_of(id)
                .into_iter()
                .map(|f| ForkSummary {
                    id: f.id,
                    title: f.title.clone(),
                    config_type: f.config_type,
                })
                .collect(),
            config: config.clone(),
        })
    }

    async fn refresh_trim_styles(&self, tree: &mut ConfigTree, id: ConfigId) -> Result<()> {
        let model_id = node(tree, id)?.model.id;
        let styles = self.storage.list_trim_styles(model_id).await?;
        tree.refresh_trim_styles_count(id, &styles)?;
        Ok(())
    }
}

fn node(tree: &ConfigTree, id: ConfigId) -> Result<&VehicleConfig> {
    tree.get(id)
        .ok_or_else(|| DriveDbError::not_found("vehicle config", id))
}
