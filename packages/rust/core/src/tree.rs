//! The vehicle configuration tree.
//!
//! Roots are base "Factory" configurations for a year range of a make and
//! model; forks are community variants one level below a root. Nodes live in
//! a flat map keyed by [`ConfigId`]; the parent → forks relation is a separate
//! index, and a node's `parent_id` is only a lookup back-reference.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};

use drivedb_shared::{
    Capability, ConfigCapability, ConfigId, ConfigStatus, ConfigType, DriveDbError, MakePackage,
    Modification, PullRequest, PullRequestLink, Repository, RepositoryLink, Result, Speed,
    TrimStyle, VehicleConfig, VehicleMake, VehicleModel, VehicleTrim, normalize_year_end,
};

use crate::slug::config_slug;

// ---------------------------------------------------------------------------
// Inputs and detached copies
// ---------------------------------------------------------------------------

/// Attributes of a new root configuration.
#[derive(Debug, Clone)]
pub struct NewConfig {
    pub make: VehicleMake,
    pub model: VehicleModel,
    pub year: i32,
    pub year_end: Option<i32>,
    /// Defaults to [`ConfigType::Factory`].
    pub config_type: Option<ConfigType>,
    pub status: Option<ConfigStatus>,
    pub trims: Vec<VehicleTrim>,
    pub make_package: Option<MakePackage>,
    pub description: Option<String>,
}

impl NewConfig {
    pub fn new(make: VehicleMake, model: VehicleModel, year: i32) -> Self {
        Self {
            make,
            model,
            year,
            year_end: None,
            config_type: None,
            status: None,
            trims: Vec::new(),
            make_package: None,
            description: None,
        }
    }
}

/// A detached deep copy of a configuration and its forks, parents first.
///
/// Produced by [`ConfigTree::copy`]; nothing in it shares identity with the
/// source tree until it is inserted with [`ConfigTree::insert_subtree`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSubtree {
    nodes: Vec<VehicleConfig>,
}

impl ConfigSubtree {
    pub fn root(&self) -> &VehicleConfig {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[VehicleConfig] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [VehicleConfig] {
        &mut self.nodes
    }

    /// Move the whole copy to another year range; forks follow the root.
    pub fn set_year_range(&mut self, start: Option<i32>, end: Option<i32>) -> Result<()> {
        for node in &mut self.nodes {
            node.set_year_range(start, end)?;
            node.title = node.compute_title();
            node.slug = None;
            node.slug = config_slug(node);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    nodes: HashMap<ConfigId, VehicleConfig>,
    forks: HashMap<ConfigId, Vec<ConfigId>>,
    next_join_id: i64,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self {
            next_join_id: 1,
            ..Self::default()
        }
    }

    /// Rebuild a tree from persisted nodes. Parents should precede their forks
    /// to keep fork order stable; orphans are indexed under their missing parent.
    pub fn from_configs(configs: impl IntoIterator<Item = VehicleConfig>) -> Self {
        let mut tree = Self::new();
        for config in configs {
            tree.index(config);
        }
        debug!(nodes = tree.nodes.len(), "config tree loaded");
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ConfigId) -> Option<&VehicleConfig> {
        self.nodes.get(&id)
    }

    fn node(&self, id: ConfigId) -> Result<&VehicleConfig> {
        self.nodes
            .get(&id)
            .ok_or_else(|| DriveDbError::not_found("vehicle config", id))
    }

    fn node_mut(&mut self, id: ConfigId) -> Result<&mut VehicleConfig> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| DriveDbError::not_found("vehicle config", id))
    }

    /// Root configurations ordered by make, model, then year.
    pub fn roots(&self) -> Vec<&VehicleConfig> {
        let mut roots: Vec<&VehicleConfig> = self.nodes.values().filter(|c| c.is_root()).collect();
        roots.sort_by(|a, b| {
            (&a.make.name, &a.model.name, a.year, a.created_at)
                .cmp(&(&b.make.name, &b.model.name, b.year, b.created_at))
        });
        roots
    }

    /// Direct forks of `id`, in creation order.
    pub fn forks_of(&self, id: ConfigId) -> Vec<&VehicleConfig> {
        self.forks
            .get(&id)
            .map(|ids| ids.iter().filter_map(|f| self.nodes.get(f)).collect())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: ConfigId) -> Option<&VehicleConfig> {
        self.nodes.get(&id)?.parent_id.and_then(|p| self.nodes.get(&p))
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a root configuration, rejecting overlap with an existing root of
    /// the same make and model.
    pub fn create_root(&mut self, new: NewConfig) -> Result<ConfigId> {
        let now = Utc::now();
        let mut config = VehicleConfig {
            id: ConfigId::new(),
            parent_id: None,
            title: String::new(),
            slug: None,
            year: new.year,
            year_end: normalize_year_end(new.year, new.year_end),
            make: new.make,
            model: new.model,
            trims: new.trims,
            make_package: new.make_package,
            config_type: Some(new.config_type.unwrap_or(ConfigType::Factory)),
            status: new.status,
            description: new.description,
            capabilities: Vec::new(),
            modifications: Vec::new(),
            repositories: Vec::new(),
            pull_requests: Vec::new(),
            trim_styles_count: 0,
            created_at: now,
            updated_at: now,
        };
        normalize(&mut config);
        self.ensure_unique_root(&config)?;

        let id = config.id;
        info!(%id, title = %config.title, "root config created");
        self.index(config);
        Ok(id)
    }

    /// Create a dependent fork of `parent_id`.
    ///
    /// Capabilities and modifications are deep-copied with fresh join ids;
    /// vehicle identity, type, status and description are inherited. Trims and
    /// repository/pull-request links are not. Forking a fork is unsupported.
    pub fn fork(&mut self, parent_id: ConfigId, config_type: Option<ConfigType>) -> Result<ConfigId> {
        let parent = self.node(parent_id)?;
        if !parent.is_root() {
            return Err(DriveDbError::Unsupported(format!(
                "config {parent_id} is itself a fork; forks cannot be forked"
            )));
        }

        let now = Utc::now();
        let mut child = VehicleConfig {
            id: ConfigId::new(),
            parent_id: Some(parent_id),
            slug: None,
            trims: Vec::new(),
            repositories: Vec::new(),
            pull_requests: Vec::new(),
            trim_styles_count: 0,
            created_at: now,
            updated_at: now,
            ..parent.clone()
        };
        if config_type.is_some() {
            child.config_type = config_type;
        }
        self.renumber_joins(&mut child);
        normalize(&mut child);

        let id = child.id;
        info!(%id, parent = %parent_id, title = %child.title, "config forked");
        self.index(child);
        Ok(id)
    }

    /// Push the parent's year range, make, model, trims and package onto every
    /// existing fork. Capabilities are never propagated. Returns the forks touched.
    pub fn propagate(&mut self, parent_id: ConfigId) -> Result<Vec<ConfigId>> {
        let parent = self.node(parent_id)?.clone();
        let fork_ids = self.forks.get(&parent_id).cloned().unwrap_or_default();

        for fork_id in &fork_ids {
            let fork = self.node_mut(*fork_id)?;
            fork.year = parent.year;
            fork.year_end = parent.year_end;
            fork.make = parent.make.clone();
            fork.model = parent.model.clone();
            fork.trims = parent.trims.clone();
            fork.make_package = parent.make_package.clone();
            fork.updated_at = Utc::now();
            normalize(fork);
        }

        info!(parent = %parent_id, forks = fork_ids.len(), "fields propagated to forks");
        Ok(fork_ids)
    }

    /// Deep-copy a configuration and its whole fork subtree, detached from
    /// this tree. The copy's top node becomes a root.
    pub fn copy(&mut self, id: ConfigId) -> Result<ConfigSubtree> {
        let mut order = Vec::new();
        self.collect_preorder(id, &mut order);
        if order.is_empty() {
            return Err(DriveDbError::not_found("vehicle config", id));
        }

        let now = Utc::now();
        let mut remap: HashMap<ConfigId, ConfigId> = HashMap::new();
        let mut nodes = Vec::with_capacity(order.len());

        for (depth_first_index, old_id) in order.into_iter().enumerate() {
            let mut node = self.node(old_id)?.clone();
            let new_id = ConfigId::new();
            remap.insert(old_id, new_id);

            node.id = new_id;
            node.parent_id = if depth_first_index == 0 {
                None
            } else {
                node.parent_id.and_then(|p| remap.get(&p).copied())
            };
            node.slug = None;
            node.repositories = Vec::new();
            node.pull_requests = Vec::new();
            node.created_at = now;
            node.updated_at = now;
            self.renumber_joins(&mut node);
            normalize(&mut node);
            nodes.push(node);
        }

        debug!(source = %id, nodes = nodes.len(), "subtree copied");
        Ok(ConfigSubtree { nodes })
    }

    /// Insert a detached copy, validating its root like any new root.
    pub fn insert_subtree(&mut self, subtree: ConfigSubtree) -> Result<ConfigId> {
        let root = subtree.root();
        if self.nodes.contains_key(&root.id) {
            return Err(DriveDbError::Unsupported(format!(
                "subtree {} is already part of the tree",
                root.id
            )));
        }
        self.ensure_unique_root(root)?;

        let root_id = root.id;
        for mut node in subtree.nodes {
            normalize(&mut node);
            self.index(node);
        }
        info!(id = %root_id, "subtree inserted");
        Ok(root_id)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Apply `edit` to a node, then re-normalize and re-validate it.
    ///
    /// On validation failure the node is left unchanged.
    pub fn update<F>(&mut self, id: ConfigId, edit: F) -> Result<()>
    where
        F: FnOnce(&mut VehicleConfig) -> Result<()>,
    {
        let mut candidate = self.node(id)?.clone();
        edit(&mut candidate)?;
        candidate.id = id;
        candidate.updated_at = Utc::now();
        normalize(&mut candidate);
        if candidate.is_root() {
            self.ensure_unique_root(&candidate)?;
        }
        *self.node_mut(id)? = candidate;
        Ok(())
    }

    /// Attach a capability, optionally qualified by a speed or timeout.
    /// Returns the new join-record id.
    pub fn add_capability(
        &mut self,
        id: ConfigId,
        capability: Capability,
        speed: Option<Speed>,
        timeout_secs: Option<u32>,
    ) -> Result<i64> {
        self.node(id)?;
        let join_id = self.alloc_join_id();
        let node = self.node_mut(id)?;
        node.capabilities.retain(|c| c.capability.id != capability.id);
        node.capabilities.push(ConfigCapability {
            id: join_id,
            capability,
            speed,
            timeout_secs,
        });
        node.updated_at = Utc::now();
        Ok(join_id)
    }

    pub fn remove_capability(&mut self, id: ConfigId, capability_id: i64) -> Result<bool> {
        let node = self.node_mut(id)?;
        let before = node.capabilities.len();
        node.capabilities.retain(|c| c.capability.id != capability_id);
        Ok(node.capabilities.len() != before)
    }

    pub fn add_modification(
        &mut self,
        id: ConfigId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<i64> {
        self.node(id)?;
        let join_id = self.alloc_join_id();
        let node = self.node_mut(id)?;
        node.modifications.push(Modification {
            id: join_id,
            name: name.into(),
            description,
        });
        node.updated_at = Utc::now();
        Ok(join_id)
    }

    pub fn link_repository(
        &mut self,
        id: ConfigId,
        repository: Repository,
        branch: Option<String>,
    ) -> Result<i64> {
        self.node(id)?;
        let join_id = self.alloc_join_id();
        let node = self.node_mut(id)?;
        node.repositories.push(RepositoryLink::new(join_id, repository, branch));
        node.updated_at = Utc::now();
        Ok(join_id)
    }

    pub fn link_pull_request(&mut self, id: ConfigId, pull_request: PullRequest) -> Result<i64> {
        self.node(id)?;
        let join_id = self.alloc_join_id();
        let node = self.node_mut(id)?;
        node.pull_requests
            .retain(|l| l.pull_request_id != pull_request.id);
        node.pull_requests.push(PullRequestLink {
            id: join_id,
            pull_request_id: pull_request.id,
            pull_request: Some(pull_request),
        });
        node.updated_at = Utc::now();
        Ok(join_id)
    }

    /// Recount catalog trim styles of a root's model within its year range.
    /// Forks keep their count untouched.
    pub fn refresh_trim_styles_count(&mut self, id: ConfigId, styles: &[TrimStyle]) -> Result<u32> {
        let node = self.node_mut(id)?;
        if !node.is_root() {
            return Ok(node.trim_styles_count);
        }
        let range = node.year_range();
        let count = styles
            .iter()
            .filter(|s| s.model_id == node.model.id && range.contains(&s.year))
            .count();
        node.trim_styles_count = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(node.trim_styles_count)
    }

    /// Remove a node and all of its descendants. Returns the removed ids,
    /// descendants before ancestors.
    pub fn destroy(&mut self, id: ConfigId) -> Result<Vec<ConfigId>> {
        let parent_id = self.node(id)?.parent_id;

        let mut order = Vec::new();
        self.collect_preorder(id, &mut order);
        order.reverse();

        for removed in &order {
            self.nodes.remove(removed);
            self.forks.remove(removed);
        }
        if let Some(parent_id) = parent_id {
            if let Some(siblings) = self.forks.get_mut(&parent_id) {
                siblings.retain(|f| *f != id);
            }
        }

        info!(%id, removed = order.len(), "config destroyed");
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every configuration of a make and model whose year range covers `year`.
    pub fn find_by_ymm(&self, year: i32, make_id: i64, model_id: i64) -> Vec<&VehicleConfig> {
        let mut found: Vec<&VehicleConfig> = self
            .nodes
            .values()
            .filter(|c| c.make.id == make_id && c.model.id == model_id && c.year_range().contains(&year))
            .collect();
        found.sort_by_key(|c| (c.parent_id.is_some(), c.config_type, c.created_at));
        found
    }

    /// Distinct capabilities of a node and its forks, ordered by name.
    pub fn combined_capabilities(&self, id: ConfigId) -> Vec<Capability> {
        let Some(config) = self.nodes.get(&id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut caps: Vec<Capability> = std::iter::once(config)
            .chain(self.forks_of(id))
            .flat_map(|c| c.capabilities.iter())
            .filter(|cc| seen.insert(cc.capability.id))
            .map(|cc| cc.capability.clone())
            .collect();
        caps.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        caps
    }

    pub fn has_fork_of_type(&self, id: ConfigId, config_type: ConfigType) -> bool {
        self.forks_of(id).iter().any(|f| f.is_type(config_type))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn index(&mut self, config: VehicleConfig) {
        let max_join = config
            .capabilities
            .iter()
            .map(|c| c.id)
            .chain(config.modifications.iter().map(|m| m.id))
            .chain(config.repositories.iter().map(|r| r.id))
            .chain(config.pull_requests.iter().map(|p| p.id))
            .max()
            .unwrap_or(0);
        self.next_join_id = self.next_join_id.max(max_join + 1);

        if let Some(parent_id) = config.parent_id {
            let siblings = self.forks.entry(parent_id).or_default();
            if !siblings.contains(&config.id) {
                siblings.push(config.id);
            }
        }
        self.nodes.insert(config.id, config);
    }

    fn alloc_join_id(&mut self) -> i64 {
        let id = self.next_join_id.max(1);
        self.next_join_id = id + 1;
        id
    }

    /// Give every join record of `node` a fresh id.
    fn renumber_joins(&mut self, node: &mut VehicleConfig) {
        for cap in &mut node.capabilities {
            cap.id = self.alloc_join_id();
        }
        for modification in &mut node.modifications {
            modification.id = self.alloc_join_id();
        }
        for link in &mut node.repositories {
            link.id = self.alloc_join_id();
        }
        for link in &mut node.pull_requests {
            link.id = self.alloc_join_id();
        }
    }

    fn collect_preorder(&self, id: ConfigId, out: &mut Vec<ConfigId>) {
        if !self.nodes.contains_key(&id) || out.contains(&id) {
            return;
        }
        out.push(id);
        if let Some(children) = self.forks.get(&id) {
            for child in children {
                self.collect_preorder(*child, out);
            }
        }
    }

    fn ensure_unique_root(&self, candidate: &VehicleConfig) -> Result<()> {
        let range = candidate.year_range();
        let clash = self.nodes.values().any(|other| {
            other.is_root()
                && other.id != candidate.id
                && other.make.id == candidate.make.id
                && other.model.id == candidate.model.id
                && other.year_range().start() <= range.end()
                && range.start() <= other.year_range().end()
        });
        if clash {
            return Err(DriveDbError::duplicate_config());
        }
        Ok(())
    }
}

/// Derived fields recomputed before every save.
fn normalize(config: &mut VehicleConfig) {
    config.year_end = normalize_year_end(config.year, Some(config.year_end));
    if config.is_root() && config.config_type.is_none() {
        config.config_type = Some(ConfigType::Factory);
    }
    config.title = config.compute_title();
    if config.slug.as_deref().is_none_or(str::is_empty) {
        config.slug = config_slug(config);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use drivedb_shared::{DUPLICATE_CONFIG_MESSAGE, PullRequestState};

    pub(crate) fn honda() -> VehicleMake {
        VehicleMake {
            id: 1,
            name: "Honda".into(),
        }
    }

    pub(crate) fn civic() -> VehicleModel {
        VehicleModel {
            id: 10,
            make_id: 1,
            name: "Civic".into(),
        }
    }

    pub(crate) fn accord() -> VehicleModel {
        VehicleModel {
            id: 11,
            make_id: 1,
            name: "Accord".into(),
        }
    }

    pub(crate) fn cap(id: i64, name: &str) -> Capability {
        Capability {
            id,
            name: name.into(),
        }
    }

    fn civic_root(tree: &mut ConfigTree, year: i32, year_end: Option<i32>) -> Result<ConfigId> {
        tree.create_root(NewConfig {
            year_end,
            ..NewConfig::new(honda(), civic(), year)
        })
    }

    #[test]
    fn root_defaults_to_factory_with_title_and_slug() {
        let mut tree = ConfigTree::new();
        let id = civic_root(&mut tree, 2016, Some(2018)).unwrap();
        let config = tree.get(id).unwrap();

        assert_eq!(config.config_type, Some(ConfigType::Factory));
        assert_eq!(config.title, "2016-2018 Honda Civic Factory");
        let slug = config.slug.as_deref().unwrap();
        assert!(slug.ends_with("-2016-2018-honda-civic-factory"));
    }

    #[test]
    fn inverted_year_end_normalized() {
        let mut tree = ConfigTree::new();
        let id = civic_root(&mut tree, 2018, Some(2015)).unwrap();
        let config = tree.get(id).unwrap();
        assert_eq!((config.year, config.year_end), (2018, 2018));
        assert_eq!(config.title, "2018 Honda Civic Factory");
    }

    #[test]
    fn overlapping_roots_rejected() {
        let mut tree = ConfigTree::new();
        civic_root(&mut tree, 2016, Some(2018)).unwrap();

        for (year, end) in [(2016, Some(2018)), (2017, None), (2014, Some(2016)), (2018, Some(2021)), (2010, Some(2025))] {
            let err = civic_root(&mut tree, year, end).unwrap_err();
            let errors = err.validation_errors().expect("validation error");
            assert_eq!(errors.on("vehicle_model"), vec![DUPLICATE_CONFIG_MESSAGE]);
        }

        civic_root(&mut tree, 2019, Some(2020)).unwrap();
        civic_root(&mut tree, 2012, Some(2015)).unwrap();
        tree.create_root(NewConfig::new(honda(), accord(), 2017)).unwrap();
        assert_eq!(tree.roots().len(), 4);
    }

    #[test]
    fn fork_copies_capabilities_independently() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2016, Some(2018)).unwrap();
        tree.add_capability(parent, cap(1, "Adaptive Cruise"), Some(Speed::from_mph(25)), None)
            .unwrap();
        tree.add_modification(parent, "Giraffe", None).unwrap();
        tree.link_repository(
            parent,
            Repository {
                id: 3,
                full_name: "user/openpilot".into(),
                url: "https://github.com/user/openpilot".into(),
            },
            None,
        )
        .unwrap();

        let child = tree.fork(parent, Some(ConfigType::Basic)).unwrap();
        let (p, c) = (tree.get(parent).unwrap(), tree.get(child).unwrap());

        assert_eq!(c.parent_id, Some(parent));
        assert_eq!(c.config_type, Some(ConfigType::Basic));
        assert_eq!(c.title, "2016-2018 Honda Civic Basic");
        assert_ne!(c.slug, p.slug);
        assert_eq!(c.capabilities.len(), 1);
        assert_ne!(c.capabilities[0].id, p.capabilities[0].id);
        assert_eq!(c.modifications.len(), 1);
        assert!(c.repositories.is_empty());
        assert!(c.trims.is_empty());

        tree.remove_capability(child, 1).unwrap();
        tree.add_capability(child, cap(2, "Lane Keeping"), None, None).unwrap();
        let p = tree.get(parent).unwrap();
        assert_eq!(p.capabilities.len(), 1);
        assert_eq!(p.capabilities[0].capability.name, "Adaptive Cruise");
        assert_eq!(tree.forks_of(parent).len(), 1);
    }

    #[test]
    fn fork_of_fork_unsupported() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2017, None).unwrap();
        let child = tree.fork(parent, None).unwrap();
        assert!(matches!(tree.fork(child, None), Err(DriveDbError::Unsupported(_))));
    }

    #[test]
    fn propagate_pushes_identity_not_capabilities() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2016, Some(2018)).unwrap();
        let child = tree.fork(parent, Some(ConfigType::Standard)).unwrap();
        tree.add_capability(parent, cap(1, "Lane Keeping"), None, None).unwrap();

        tree.update(parent, |c| {
            c.set_year_range(Some(2016), Some(2019))?;
            c.trims = vec![VehicleTrim {
                id: 5,
                model_id: 10,
                name: "EX".into(),
                year: 2019,
            }];
            Ok(())
        })
        .unwrap();
        let touched = tree.propagate(parent).unwrap();

        assert_eq!(touched, vec![child]);
        let c = tree.get(child).unwrap();
        assert_eq!(c.year_end, 2019);
        assert_eq!(c.trim_names(), "EX");
        assert_eq!(c.title, "2016-2019 Honda Civic Standard");
        assert!(c.capabilities.is_empty());
    }

    #[test]
    fn copy_is_fully_independent() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2016, Some(2018)).unwrap();
        tree.add_capability(parent, cap(1, "Lane Keeping"), None, Some(30)).unwrap();
        tree.update(parent, |c| {
            c.trims = vec![VehicleTrim {
                id: 5,
                model_id: 10,
                name: "Touring".into(),
                year: 2016,
            }];
            Ok(())
        })
        .unwrap();
        let fork = tree.fork(parent, Some(ConfigType::Advanced)).unwrap();

        let mut copy = tree.copy(parent).unwrap();
        assert_eq!(copy.nodes().len(), 2);
        assert!(copy.root().is_root());
        assert_eq!(copy.nodes()[1].parent_id, Some(copy.root().id));
        assert_ne!(copy.root().id, parent);
        assert_ne!(copy.nodes()[1].id, fork);
        assert_eq!(copy.root().trims.len(), 1);

        // Same years as the source root: rejected until moved.
        let err = tree.insert_subtree(copy.clone()).unwrap_err();
        assert!(err.validation_errors().is_some());

        copy.set_year_range(Some(2019), Some(2021)).unwrap();
        copy.nodes_mut()[0].capabilities[0].timeout_secs = Some(99);
        let new_root = tree.insert_subtree(copy).unwrap();

        assert_eq!(tree.get(parent).unwrap().capabilities[0].timeout_secs, Some(30));
        assert_eq!(tree.get(new_root).unwrap().title, "2019-2021 Honda Civic Factory");
        assert_eq!(tree.forks_of(new_root).len(), 1);
        assert_eq!(tree.forks_of(parent).len(), 1);
    }

    #[test]
    fn destroy_removes_descendants() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2017, None).unwrap();
        let a = tree.fork(parent, Some(ConfigType::Basic)).unwrap();
        let b = tree.fork(parent, Some(ConfigType::Advanced)).unwrap();

        let removed = tree.destroy(a).unwrap();
        assert_eq!(removed, vec![a]);
        assert_eq!(tree.forks_of(parent).len(), 1);

        let removed = tree.destroy(parent).unwrap();
        assert_eq!(removed, vec![b, parent]);
        assert!(tree.is_empty());
    }

    #[test]
    fn ymm_lookup_and_combined_capabilities() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2016, Some(2018)).unwrap();
        let fork = tree.fork(parent, Some(ConfigType::Basic)).unwrap();
        tree.add_capability(parent, cap(2, "Lane Keeping"), None, None).unwrap();
        tree.add_capability(fork, cap(1, "Adaptive Cruise"), None, None).unwrap();
        tree.add_capability(fork, cap(2, "Lane Keeping"), None, None).unwrap();

        assert_eq!(tree.find_by_ymm(2017, 1, 10).len(), 2);
        assert!(tree.find_by_ymm(2019, 1, 10).is_empty());

        let names: Vec<String> = tree.combined_capabilities(parent).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Adaptive Cruise", "Lane Keeping"]);
        assert!(tree.has_fork_of_type(parent, ConfigType::Basic));
        assert!(!tree.has_fork_of_type(parent, ConfigType::Standard));
    }

    #[test]
    fn trim_styles_counted_for_roots_only() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2016, Some(2017)).unwrap();
        let fork = tree.fork(parent, None).unwrap();
        let style = |id, model_id, year| TrimStyle {
            id,
            trim_id: 1,
            model_id,
            year,
            name: "Sedan".into(),
        };
        let styles = [style(1, 10, 2016), style(2, 10, 2017), style(3, 10, 2019), style(4, 11, 2016)];

        assert_eq!(tree.refresh_trim_styles_count(parent, &styles).unwrap(), 2);
        assert_eq!(tree.refresh_trim_styles_count(fork, &styles).unwrap(), 0);
    }

    #[test]
    fn join_ids_continue_after_reload() {
        let mut tree = ConfigTree::new();
        let parent = civic_root(&mut tree, 2017, None).unwrap();
        let first = tree.add_capability(parent, cap(1, "Lane Keeping"), None, None).unwrap();
        let pr = tree
            .link_pull_request(
                parent,
                PullRequest {
                    id: 9,
                    number: 42,
                    state: PullRequestState::Open,
                    html_url: "https://github.com/commaai/openpilot/pull/42".into(),
                },
            )
            .unwrap();
        assert!(pr > first);

        let configs: Vec<VehicleConfig> = tree.nodes.values().cloned().collect();
        let mut reloaded = ConfigTree::from_configs(configs);
        let next = reloaded
            .add_capability(parent, cap(2, "Adaptive Cruise"), None, None)
            .unwrap();
        assert!(next > pr);
    }

    #[test]
    fn failed_update_leaves_node_unchanged() {
        let mut tree = ConfigTree::new();
        civic_root(&mut tree, 2016, Some(2017)).unwrap();
        let other = civic_root(&mut tree, 2019, None).unwrap();

        let err = tree
            .update(other, |c| c.set_year_range(Some(2017), Some(2019)))
            .unwrap_err();
        assert!(err.validation_errors().is_some());
        assert_eq!(tree.get(other).unwrap().year, 2019);
    }
}
