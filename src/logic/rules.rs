use itertools::Itertools;
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::IdentityConfig;
use crate::error::PublishError;
use crate::logic::identity::IdentityStore;
use crate::logic::required::RequiredNodeSelector;
use crate::model::{asset_id_of, AssetIndex, ContextData, Instance, NodeRef, PublishedIds, Scene};
use crate::store::traits::AssetStore;

/// Context key under which the project's asset index is memoized.
pub const ASSET_INDEX_CACHE_KEY: &str = "__cache_project_asset_ids_str";

/// All asset ids of the current project. Queried once per publish run and
/// memoized in the context data.
pub async fn project_asset_index<S: AssetStore + ?Sized>(
    data: &mut ContextData,
    store: &S,
) -> Result<AssetIndex, PublishError> {
    if let Some(index) = data.cached::<AssetIndex>(ASSET_INDEX_CACHE_KEY) {
        return Ok(index);
    }

    let project_name = data.require_str("projectName")?.to_string();
    let index: AssetIndex = store.get_assets(&project_name).await?.into_iter().collect();
    debug!("Cached {} asset ids for project '{}'", index.len(), project_name);

    data.store(ASSET_INDEX_CACHE_KEY, &index)?;
    Ok(index)
}

/// Outcome of the relatedness check.
#[derive(Debug, Clone, Default)]
pub struct RelatedCheck {
    pub invalid: Vec<NodeRef>,
    /// Names of existing assets the invalid nodes point at, sorted.
    pub foreign_assets: Vec<String>,
    /// Referenced nodes carrying another asset's id. Warn only.
    pub referenced_foreign: Vec<NodeRef>,
}

/// A node whose id differs from the one recorded in the last publish.
#[derive(Debug, Clone)]
pub struct IdMismatch {
    pub node: NodeRef,
    pub previous_id: String,
    pub current_id: String,
}

/// The identity rules. Each check returns the offending nodes only; nodes
/// without an id are left to [`IdentityRules::missing_ids`].
#[derive(Debug, Clone, Default)]
pub struct IdentityRules {
    pub ids: IdentityStore,
    pub selector: RequiredNodeSelector,
}

impl IdentityRules {
    pub fn new(ids: IdentityStore, selector: RequiredNodeSelector) -> Self {
        Self { ids, selector }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            IdentityStore::new(&config.attribute),
            RequiredNodeSelector::from_config(config),
        )
    }

    /// Required nodes without an identity.
    pub fn missing_ids(&self, instance: &Instance, include_referenced: bool) -> Vec<NodeRef> {
        self.selector
            .get_id_required_nodes(instance, include_referenced)
            .into_iter()
            .filter(|node| self.ids.get_id(&**node).is_none())
            .collect()
    }

    /// Required nodes sharing their identity with another node.
    pub fn duplicate_ids(&self, instance: &Instance) -> Vec<NodeRef> {
        let by_id = self
            .selector
            .get_id_required_nodes(instance, false)
            .into_iter()
            .filter_map(|node| self.ids.get_id(&*node).map(|id| (id, node)))
            .into_group_map();

        let mut invalid = Vec::new();
        for (cb_id, members) in by_id.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
            if members.len() > 1 {
                error!(
                    "ID '{}' found on multiple nodes: {}",
                    cb_id,
                    members.iter().map(|n| n.name()).sorted().join(", ")
                );
                invalid.extend(members);
            }
        }
        invalid
    }

    /// Required nodes whose asset id is unknown to the project.
    pub fn ids_not_in_database(&self, instance: &Instance, index: &AssetIndex) -> Vec<NodeRef> {
        let mut invalid = Vec::new();
        for node in self.selector.get_id_required_nodes(instance, false) {
            let Some(cb_id) = self.ids.get_id(&*node) else {
                debug!("Skipping '{}' without id", node.name());
                continue;
            };
            if !index.contains(asset_id_of(&cb_id)) {
                error!("'{}' has unassociated asset ID", node.name());
                invalid.push(node);
            }
        }
        invalid
    }

    /// Required nodes whose asset id is not the instance's asset.
    ///
    /// Foreign asset names are only resolved for ids present in `index`;
    /// ids of deleted assets are reported by the database check instead.
    pub fn unrelated_ids(
        &self,
        instance: &Instance,
        asset_id: &str,
        index: &AssetIndex,
    ) -> RelatedCheck {
        let mut check = RelatedCheck::default();
        let mut other_asset_ids = BTreeSet::new();

        for node in self.selector.get_id_required_nodes(instance, true) {
            let Some(cb_id) = self.ids.get_id(&*node) else {
                continue;
            };
            let node_asset_id = asset_id_of(&cb_id);
            if node_asset_id == asset_id {
                continue;
            }
            if node.is_externally_referenced() {
                warn!(
                    "Referenced node '{}' belongs to asset id '{}'",
                    node.name(),
                    node_asset_id
                );
                check.referenced_foreign.push(node);
                continue;
            }
            other_asset_ids.insert(node_asset_id.to_string());
            check.invalid.push(node);
        }

        check.foreign_assets = other_asset_ids
            .iter()
            .filter_map(|id| index.name_of(id))
            .map(str::to_string)
            .sorted()
            .dedup()
            .collect();

        if !check.foreign_assets.is_empty() {
            error!(
                "Found nodes related to other assets: {}",
                check.foreign_assets.join(", ")
            );
        }

        check
    }

    /// Local nodes whose id differs from the id on their history source.
    /// Checks the instance's `out_hierarchy` when collected, its members
    /// otherwise.
    pub fn out_of_sync_with_history(
        &self,
        instance: &Instance,
        scene: &dyn Scene,
    ) -> Vec<(NodeRef, String)> {
        let out_hierarchy = instance.get("out_hierarchy").and_then(Value::as_array);
        let candidates: Vec<NodeRef> = match out_hierarchy {
            Some(names) => names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|name| scene.get_node(name))
                .collect(),
            None => instance.members.clone(),
        };

        let mut invalid = Vec::new();
        for node in self.selector.required_among(&candidates, false) {
            let Some(source) = scene.history_sibling(&node) else {
                continue;
            };
            let Some(history_id) = self.ids.get_id(&*source) else {
                debug!("No id in history of '{}'", node.name());
                continue;
            };
            if self.ids.get_id(&*node).as_deref() != Some(history_id.as_str()) {
                invalid.push((node, history_id));
            }
        }
        invalid
    }

    /// Members whose id changed since the given published version, matched
    /// by node path.
    pub fn changed_since_version(
        &self,
        instance: &Instance,
        published: &PublishedIds,
        log_changed_hierarchies: bool,
    ) -> Vec<IdMismatch> {
        let current: BTreeMap<&str, (NodeRef, String)> = instance
            .iter()
            .filter_map(|node| {
                self.ids
                    .get_id(&**node)
                    .map(|id| (node.name(), (node.clone(), id)))
            })
            .collect();

        if log_changed_hierarchies {
            for path in published.ids_by_path.keys() {
                if !current.contains_key(path.as_str()) {
                    warn!("Detected removed path: {}", path);
                }
            }
            for path in current.keys() {
                if !published.ids_by_path.contains_key(*path) {
                    warn!("Detected new path: {}", path);
                }
            }
        }

        current
            .into_iter()
            .filter_map(|(path, (node, current_id))| {
                let previous_id = published.ids_by_path.get(path)?;
                (previous_id != &current_id).then(|| {
                    error!(
                        "Id changed for: {}\n\t{} (old)\n\t{} (new)",
                        path, previous_id, current_id
                    );
                    IdMismatch {
                        node,
                        previous_id: previous_id.clone(),
                        current_id,
                    }
                })
            })
            .collect()
    }

    /// `{node path -> id}` for every member carrying an id.
    pub fn ids_by_path(&self, instance: &Instance) -> BTreeMap<String, String> {
        instance
            .iter()
            .filter_map(|node| {
                self.ids
                    .get_id(&**node)
                    .map(|id| (node.name().to_string(), id))
            })
            .collect()
    }
}
