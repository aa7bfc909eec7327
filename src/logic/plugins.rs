//! Built-in collectors, identity validators and the node id integrator.

use log::{debug, info};
use serde_json::json;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::PublishError;
use crate::logic::plugin::{
    order, ActionKind, ContextPlugin, InstancePlugin, Plugin, PluginInfo, PublishEnv,
};
use crate::logic::repair;
use crate::logic::rules::project_asset_index;
use crate::model::{
    bullet_list, sorted_names, Context, ContextData, Instance, PublishedIds, Representation,
    ValidationOutcome,
};

/// Marker value identifying instance sets in a scene.
pub const INSTANCE_MARKER: &str = "pyblish.avalon.instance";

/// Name suffix of the set holding an animation instance's output nodes.
pub const OUT_SET_SUFFIX: &str = "out_SET";

/// Every built-in plugin, configured from the application settings.
pub fn default_plugins(config: &AppConfig) -> Vec<Plugin> {
    let enabled = config.identity.enabled;
    let validators = &config.validators;
    vec![
        Plugin::context(CollectInstances::new()),
        Plugin::context(CollectAssetEntity::new()),
        Plugin::instance(
            ValidateNodeIds::new(validators.has_id_include_referenced).enabled(enabled),
        ),
        Plugin::instance(ValidateNodeIdsUnique::new(validators.unique_optional).enabled(enabled)),
        Plugin::instance(ValidateNodeIdsInDatabase::new().enabled(enabled)),
        Plugin::instance(ValidateNodeIdsRelated::new(validators.related_optional).enabled(enabled)),
        Plugin::instance(ValidateOutRelatedNodeIds::new().enabled(enabled)),
        Plugin::instance(
            ValidateModelIdsToExistingVersion::new(validators.log_changed_hierarchies)
                .enabled(enabled),
        ),
        Plugin::instance(ExtractNodeIds::new().enabled(enabled)),
        Plugin::instance(IntegrateNodeIds::new().enabled(enabled)),
    ]
}

/// Turn a list of invalid names into a failed outcome, or pass when empty.
fn outcome(
    invalid: Vec<String>,
    message: impl FnOnce(&[String]) -> String,
    title: &str,
    hint: &str,
) -> ValidationOutcome {
    if invalid.is_empty() {
        return ValidationOutcome::pass();
    }
    let message = message(&invalid);
    let mut details = format!("## {}\n\n{}", title, bullet_list(&invalid));
    if !hint.is_empty() {
        details.push_str("\n\n");
        details.push_str(hint);
    }
    ValidationOutcome::fail(message, invalid, details)
}

/// Scans the scene for instance markers and resolves their members.
pub struct CollectInstances {
    info: PluginInfo,
}

impl CollectInstances {
    pub fn new() -> Self {
        Self {
            info: PluginInfo::new("Collect Instances", order::COLLECTOR),
        }
    }
}

impl Default for CollectInstances {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContextPlugin for CollectInstances {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
    ) -> Result<(), PublishError> {
        context.data.insert("host", env.host.as_str());
        if let Some(current_file) = env.scene.current_file() {
            context.data.insert("currentFile", current_file);
        }

        for marker in env.scene.nodes() {
            if marker.get_attribute("id").as_deref() != Some(INSTANCE_MARKER) {
                continue;
            }

            let subset = marker
                .get_attribute("subset")
                .unwrap_or_else(|| marker.name().to_string());
            let mut instance = Instance::new(&subset)
                .with_data("subset", subset.as_str())
                .with_data("active", marker.get_attribute("active").as_deref() != Some("false"))
                .with_data("setMembers", marker.name());
            for key in ["family", "asset"] {
                if let Some(value) = marker.get_attribute(key) {
                    instance.insert(key, value);
                }
            }
            if let Some(families) = marker.get_attribute("families") {
                let extra: Vec<&str> = families
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .collect();
                instance.insert("families", json!(extra));
            }

            instance.members = env.scene.members(&marker);
            // Animation instances publish what their out set holds.
            if let Some(out_set) = instance.iter().find(|n| n.name().ends_with(OUT_SET_SUFFIX)) {
                let out_hierarchy: Vec<String> = env
                    .scene
                    .members(out_set)
                    .iter()
                    .map(|n| n.name().to_string())
                    .collect();
                instance.insert("out_hierarchy", json!(out_hierarchy));
            }
            debug!(
                "Collected instance '{}' with {} members",
                instance.name,
                instance.len()
            );
            context.add_instance(instance);
        }

        info!("Collected {} instances", context.len());
        Ok(())
    }
}

/// Resolves each instance's `asset` name to its database document.
pub struct CollectAssetEntity {
    info: PluginInfo,
}

impl CollectAssetEntity {
    pub fn new() -> Self {
        Self {
            info: PluginInfo::new("Collect Asset Entity", order::COLLECTOR + 0.01),
        }
    }
}

impl Default for CollectAssetEntity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContextPlugin for CollectAssetEntity {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
    ) -> Result<(), PublishError> {
        let project_name = context.project_name()?.to_string();
        for instance in context.instances.iter_mut() {
            if instance.get("assetEntity").is_some() {
                continue;
            }
            let asset_name = instance.require_str("asset")?.to_string();
            let asset = env
                .store
                .get_asset_by_name(&project_name, &asset_name)
                .await?
                .ok_or_else(|| {
                    PublishError::Fatal(format!(
                        "Asset '{}' of instance '{}' not found in project '{}'",
                        asset_name, instance.name, project_name
                    ))
                })?;
            instance.insert("assetEntity", json!({"_id": asset.id, "name": asset.name}));
        }
        Ok(())
    }
}

/// Every required node carries an identity.
pub struct ValidateNodeIds {
    info: PluginInfo,
    include_referenced: bool,
}

impl ValidateNodeIds {
    pub const LABEL: &'static str = "Instance Nodes Have ID";

    pub fn new(include_referenced: bool) -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_PIPELINE)
                .families(&[
                    "model",
                    "look",
                    "rig",
                    "pointcache",
                    "animation",
                    "yetiRig",
                    "assembly",
                ])
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
            include_referenced,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateNodeIds {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        _data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let invalid = sorted_names(&env.rules.missing_ids(instance, self.include_referenced));
        Ok(outcome(
            invalid,
            |names| format!("Nodes found without IDs: {}", names.join(", ")),
            "Nodes found without IDs",
            "IDs are generated on non-referenced nodes when the scene is saved, \
             or use the repair action.",
        ))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        _data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        let asset_id = instance.asset_entity_id()?;
        repair::generate_missing_ids(&env.rules, instance, &asset_id)
    }
}

/// No two required nodes of an instance share an identity.
pub struct ValidateNodeIdsUnique {
    info: PluginInfo,
}

impl ValidateNodeIdsUnique {
    pub const LABEL: &'static str = "Non Duplicate Instance Members (ID)";

    pub fn new(optional: bool) -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_PIPELINE)
                .families(&["model", "look", "yetiRig", "rig"])
                .optional(optional)
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateNodeIdsUnique {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        _data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let invalid = sorted_names(&env.rules.duplicate_ids(instance));
        Ok(outcome(
            invalid,
            |names| format!("Nodes found with non-unique asset IDs: {}", names.join(", ")),
            "Non-unique asset ids on nodes",
            "",
        ))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        _data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        let asset_id = instance.asset_entity_id()?;
        repair::regenerate_duplicate_ids(&env.rules, instance, &asset_id)
    }
}

/// Every identity points at an asset of the current project.
pub struct ValidateNodeIdsInDatabase {
    info: PluginInfo,
}

impl ValidateNodeIdsInDatabase {
    pub const LABEL: &'static str = "Node Ids in Database";

    pub fn new() -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_PIPELINE)
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

impl Default for ValidateNodeIdsInDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateNodeIdsInDatabase {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        if env.rules.selector.get_id_required_nodes(instance, false).is_empty() {
            return Ok(ValidationOutcome::pass());
        }
        let index = project_asset_index(data, env.store).await?;
        let invalid = sorted_names(&env.rules.ids_not_in_database(instance, &index));
        let instance_name = instance.name.clone();
        Ok(outcome(
            invalid,
            |_| {
                format!(
                    "Found asset IDs which are not related to current project in instance: `{}`",
                    instance_name
                )
            },
            "Asset IDs not found in project",
            "If an asset is reused from a different project, republish it in this project.",
        ))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        let asset_id = instance.asset_entity_id()?;
        let index = project_asset_index(data, env.store).await?;
        let invalid = env.rules.ids_not_in_database(instance, &index);
        repair::reassign_ids(&env.rules, &invalid, &asset_id)
    }
}

/// Every identity belongs to the asset the instance publishes against.
pub struct ValidateNodeIdsRelated {
    info: PluginInfo,
}

impl ValidateNodeIdsRelated {
    pub const LABEL: &'static str = "Node Ids Related (ID)";

    pub fn new(optional: bool) -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_PIPELINE)
                .families(&["model", "look", "rig"])
                .optional(optional)
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateNodeIdsRelated {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let asset_id = instance.asset_entity_id()?;
        let index = project_asset_index(data, env.store).await?;
        let check = env.rules.unrelated_ids(instance, &asset_id, &index);

        let warnings = sorted_names(&check.referenced_foreign)
            .into_iter()
            .map(|name| format!("Referenced node '{}' belongs to another asset", name))
            .collect();

        let invalid = sorted_names(&check.invalid);
        if invalid.is_empty() {
            return Ok(ValidationOutcome::pass().with_warnings(warnings));
        }

        let asset_name = instance.asset().unwrap_or(asset_id.as_str()).to_string();
        let mut details = format!(
            "## Found nodes related to other assets\n\n{}",
            bullet_list(&invalid)
        );
        if !check.foreign_assets.is_empty() {
            details.push_str(&format!(
                "\n\nRelated assets: {}",
                check.foreign_assets.join(", ")
            ));
        }
        Ok(ValidationOutcome::fail(
            format!("Node IDs found that are not related to asset: {}", asset_name),
            invalid,
            details,
        )
        .with_warnings(warnings))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        let asset_id = instance.asset_entity_id()?;
        let index = project_asset_index(data, env.store).await?;
        let check = env.rules.unrelated_ids(instance, &asset_id, &index);
        repair::reassign_ids(&env.rules, &check.invalid, &asset_id)
    }
}

/// Deformed shapes keep the identity of the shape they were derived from.
pub struct ValidateOutRelatedNodeIds {
    info: PluginInfo,
}

impl ValidateOutRelatedNodeIds {
    pub const LABEL: &'static str = "Animation Out Set Related Node Ids";

    pub fn new() -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_CONTENTS)
                .families(&["animation", "pointcache", "proxyAbc"])
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

impl Default for ValidateOutRelatedNodeIds {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateOutRelatedNodeIds {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        _data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let nodes: Vec<_> = env
            .rules
            .out_of_sync_with_history(instance, env.scene)
            .into_iter()
            .map(|(node, _)| node)
            .collect();
        Ok(outcome(
            sorted_names(&nodes),
            |names| {
                format!(
                    "Nodes have different IDs than their input history: {}",
                    names.join(", ")
                )
            },
            "Nodes have different IDs than their input history",
            "",
        ))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        _data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        repair::copy_history_ids(&env.rules, instance, env.scene)
    }
}

/// Node ids did not change since the latest published version.
pub struct ValidateModelIdsToExistingVersion {
    info: PluginInfo,
    log_changed_hierarchies: bool,
}

impl ValidateModelIdsToExistingVersion {
    pub const LABEL: &'static str = "Model ids match latest version";

    pub fn new(log_changed_hierarchies: bool) -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::VALIDATE_CONTENTS)
                .families(&["model"])
                .optional(true)
                .actions(&[ActionKind::SelectInvalid, ActionKind::Repair]),
            log_changed_hierarchies,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }

    async fn latest(
        env: &PublishEnv<'_>,
        instance: &Instance,
        data: &ContextData,
    ) -> Result<Option<PublishedIds>, PublishError> {
        let project_name = data.require_str("projectName")?;
        let asset_id = instance.asset_entity_id()?;
        let subset = instance.require_str("subset")?;
        let published = env
            .store
            .latest_published_ids(project_name, &asset_id, subset)
            .await?;
        if published.is_none() {
            debug!("Subset does not exist yet: {}", subset);
        }
        Ok(published)
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ValidateModelIdsToExistingVersion {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let Some(published) = Self::latest(env, instance, data).await? else {
            return Ok(ValidationOutcome::pass());
        };
        info!(
            "Validating using '{}' version v{:03}",
            published.subset, published.version
        );
        let mismatches = env
            .rules
            .changed_since_version(instance, &published, self.log_changed_hierarchies);
        let nodes: Vec<_> = mismatches.into_iter().map(|m| m.node).collect();
        Ok(outcome(
            sorted_names(&nodes),
            |names| format!("Detected changed ids on {} nodes", names.len()),
            "Ids changed since the latest published version",
            "Use the repair action to restore the published ids.",
        ))
    }

    async fn repair(
        &self,
        env: &PublishEnv<'_>,
        instance: &Instance,
        data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        match Self::latest(env, instance, data).await? {
            Some(published) => repair::restore_published_ids(&env.rules, instance, &published),
            None => Ok(Vec::new()),
        }
    }
}

/// Writes the node id map of an instance to its staging directory as the
/// `ids` representation.
pub struct ExtractNodeIds {
    info: PluginInfo,
}

impl ExtractNodeIds {
    pub const LABEL: &'static str = "Extract Node Ids";

    pub fn new() -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::EXTRACTOR),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }

    /// `stagingDir` from the instance, or a fresh temporary directory.
    fn staging_dir(instance: &Instance, data: &ContextData, subset: &str) -> PathBuf {
        match instance.get_str("stagingDir") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir()
                .join("cbid-publish")
                .join(data.get_str("projectName").unwrap_or("default"))
                .join(format!("{}-{}", subset, uuid::Uuid::new_v4())),
        }
    }
}

impl Default for ExtractNodeIds {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InstancePlugin for ExtractNodeIds {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let subset = instance.require_str("subset")?.to_string();
        let staging_dir = Self::staging_dir(instance, data, &subset);
        let file_name = format!("{}.json", subset);

        let ids = serde_json::to_vec_pretty(&env.rules.ids_by_path(instance))
            .map_err(|e| PublishError::Fatal(format!("Failed to encode node ids: {}", e)))?;
        tokio::fs::create_dir_all(&staging_dir).await.map_err(|e| {
            PublishError::Fatal(format!("Failed to create '{}': {}", staging_dir.display(), e))
        })?;
        let path = staging_dir.join(&file_name);
        tokio::fs::write(&path, ids)
            .await
            .map_err(|e| {
                PublishError::Fatal(format!("Failed to write '{}': {}", path.display(), e))
            })?;

        debug!("Extracted node ids to {}", path.display());
        instance.insert("stagingDir", staging_dir.display().to_string());
        instance.add_representation(
            Representation::new("ids", "json", staging_dir).with_file(&file_name),
        );
        Ok(ValidationOutcome::pass())
    }
}

/// Records the published node ids as a new version of the subset.
pub struct IntegrateNodeIds {
    info: PluginInfo,
}

impl IntegrateNodeIds {
    pub const LABEL: &'static str = "Integrate Node Ids";

    pub fn new() -> Self {
        Self {
            info: PluginInfo::new(Self::LABEL, order::INTEGRATOR),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.info.enabled = enabled;
        self
    }
}

impl Default for IntegrateNodeIds {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InstancePlugin for IntegrateNodeIds {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError> {
        let project_name = data.require_str("projectName")?.to_string();
        let asset_id = instance.asset_entity_id()?;
        let subset = instance.require_str("subset")?.to_string();
        for representation in &instance.representations {
            if let Some(missing) = representation.paths().into_iter().find(|p| !p.exists()) {
                return Err(PublishError::Fatal(format!(
                    "Representation '{}' of '{}' is missing {}",
                    representation.name,
                    instance.name,
                    missing.display()
                )));
            }
        }
        let representations = instance
            .representations
            .iter()
            .map(|r| r.name.clone())
            .collect();

        let record = env
            .store
            .record_published_ids(
                &project_name,
                &asset_id,
                &subset,
                env.rules.ids_by_path(instance),
                representations,
            )
            .await?;
        info!(
            "Integrated {} node ids for '{}' v{:03}",
            record.ids_by_path.len(),
            subset,
            record.version
        );
        instance.insert("version", record.version);
        Ok(ValidationOutcome::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::rules::IdentityRules;
    use crate::model::{AssetDoc, Scene};
    use crate::store::{MemoryScene, MemoryStore, NodeSnapshot, PublishedIdStore, SceneSnapshot};

    fn scene() -> MemoryScene {
        MemoryScene::from_snapshot(SceneSnapshot {
            current_file: Some("/work/model_v002.ma".to_string()),
            nodes: vec![
                NodeSnapshot::new("lookMain", "objectSet")
                    .attr("id", "pyblish.avalon.instance")
                    .attr("family", "look")
                    .attr("families", "review, model")
                    .attr("asset", "shotA")
                    .members(&["|geo|bodyShape"]),
                NodeSnapshot::new("layoutMain", "objectSet")
                    .attr("id", "pyblish.avalon.instance")
                    .attr("family", "layout")
                    .attr("asset", "shotA")
                    .attr("active", "false"),
                NodeSnapshot::new("notAnInstance", "objectSet").attr("id", "something.else"),
                NodeSnapshot::new("|geo|bodyShape", "mesh").attr("cbId", "id_shotA:1"),
            ],
        })
    }

    #[tokio::test]
    async fn test_collect_instances_reads_markers() {
        let scene = scene();
        let store = MemoryStore::new();
        let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
        let mut context = Context::new("demo");

        CollectInstances::new().process(&env, &mut context).await.unwrap();

        assert_eq!(context.len(), 2);
        let look = context.instance("lookMain").unwrap();
        assert_eq!(look.families(), vec!["look", "review", "model"]);
        assert_eq!(look.subset(), Some("lookMain"));
        assert_eq!(look.len(), 1);
        assert!(!context.instance("layoutMain").unwrap().is_active());
        assert_eq!(context.data.get_str("currentFile"), Some("/work/model_v002.ma"));
    }

    #[tokio::test]
    async fn test_collect_asset_entity() {
        let scene = scene();
        let store = MemoryStore::with_assets("demo", vec![AssetDoc::new("id_shotA", "shotA")]);
        let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
        let mut context = Context::new("demo");
        context.add_instance(Instance::new("modelMain").with_data("asset", "shotA"));

        CollectAssetEntity::new().process(&env, &mut context).await.unwrap();
        assert_eq!(
            context.instance("modelMain").unwrap().asset_entity_id().unwrap(),
            "id_shotA"
        );

        context.add_instance(Instance::new("rigMain").with_data("asset", "shotZ"));
        let err = CollectAssetEntity::new().process(&env, &mut context).await.unwrap_err();
        assert!(matches!(err, PublishError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_related_warns_for_referenced_nodes() {
        let scene = MemoryScene::from_snapshot(SceneSnapshot {
            current_file: None,
            nodes: vec![
                NodeSnapshot::new("|geo|bodyShape", "mesh").attr("cbId", "id_shotA:1"),
                NodeSnapshot::new("|ref:geo|swordShape", "mesh")
                    .attr("cbId", "id_shotB:2")
                    .referenced(),
            ],
        });
        let store = MemoryStore::with_assets(
            "demo",
            vec![AssetDoc::new("id_shotA", "shotA"), AssetDoc::new("id_shotB", "shotB")],
        );
        let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
        let mut context = Context::new("demo");
        let mut instance = Instance::new("rigMain")
            .with_data("family", "rig")
            .with_data("assetEntity", json!({"_id": "id_shotA", "name": "shotA"}))
            .with_members(scene.nodes());

        let outcome = ValidateNodeIdsRelated::new(true)
            .process(&env, &mut instance, &mut context.data)
            .await
            .unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("|ref:geo|swordShape"));
    }

    fn staged_instance(scene: &MemoryScene, staging_dir: &std::path::Path) -> Instance {
        Instance::new("modelMain")
            .with_data("subset", "modelMain")
            .with_data("assetEntity", json!({"_id": "id_shotA", "name": "shotA"}))
            .with_data("stagingDir", staging_dir.display().to_string())
            .with_members(scene.nodes())
    }

    #[tokio::test]
    async fn test_extracted_ids_are_integrated_as_representation() {
        let scene = scene();
        let store = MemoryStore::new();
        let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
        let mut context = Context::new("demo");
        let staging_dir =
            std::env::temp_dir().join(format!("cbid-extract-{}", uuid::Uuid::new_v4()));
        let mut instance = staged_instance(&scene, &staging_dir);

        ExtractNodeIds::new()
            .process(&env, &mut instance, &mut context.data)
            .await
            .unwrap();
        assert_eq!(instance.representations.len(), 1);
        let written = std::fs::read_to_string(staging_dir.join("modelMain.json")).unwrap();
        let ids: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(ids, json!({"|geo|bodyShape": "id_shotA:1"}));

        IntegrateNodeIds::new()
            .process(&env, &mut instance, &mut context.data)
            .await
            .unwrap();
        let published = store
            .latest_published_ids("demo", "id_shotA", "modelMain")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.representations, vec!["ids"]);
        assert_eq!(instance.get("version"), Some(&json!(1)));

        std::fs::remove_dir_all(&staging_dir).unwrap();
    }

    #[tokio::test]
    async fn test_integrate_rejects_missing_representation_files() {
        let scene = scene();
        let store = MemoryStore::new();
        let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
        let mut context = Context::new("demo");
        let staging_dir =
            std::env::temp_dir().join(format!("cbid-missing-{}", uuid::Uuid::new_v4()));
        let mut instance = staged_instance(&scene, &staging_dir);
        instance.add_representation(
            Representation::new("ids", "json", staging_dir.clone()).with_file("modelMain.json"),
        );

        let err = IntegrateNodeIds::new()
            .process(&env, &mut instance, &mut context.data)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("modelMain.json"));
        assert!(store
            .latest_published_ids("demo", "id_shotA", "modelMain")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_default_plugins_follow_config() {
        let mut config = AppConfig::default();
        config.validators.unique_optional = true;
        let plugins = default_plugins(&config);
        let unique = plugins
            .iter()
            .find(|p| p.info().label == ValidateNodeIdsUnique::LABEL)
            .unwrap();
        assert!(unique.info().optional);
        assert!(plugins.iter().all(|p| p.info().enabled));

        config.identity.enabled = false;
        let plugins = default_plugins(&config);
        let enabled: Vec<&str> = plugins
            .iter()
            .filter(|p| p.info().enabled)
            .map(|p| p.info().label.as_str())
            .collect();
        assert_eq!(enabled, vec!["Collect Instances", "Collect Asset Entity"]);
    }
}
