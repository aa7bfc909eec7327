use log::{info, warn};
use std::collections::BTreeMap;

use crate::error::PublishError;
use crate::logic::rules::IdentityRules;
use crate::model::{generate_id, sorted_names, Instance, NodeRef, PublishedIds, Scene};

/// Give every required node without an identity a fresh one for `asset_id`.
/// Referenced nodes are never written. Returns the names of written nodes;
/// a second run finds nothing to do.
pub fn generate_missing_ids(
    rules: &IdentityRules,
    instance: &Instance,
    asset_id: &str,
) -> Result<Vec<String>, PublishError> {
    let mut written = Vec::new();
    for node in rules.missing_ids(instance, false) {
        let new_id = generate_id(asset_id);
        if rules.ids.set_id(&*node, &new_id, false)? {
            info!("Generated id {} on '{}'", new_id, node.name());
            written.push(node.name().to_string());
        }
    }

    let skipped = rules.missing_ids(instance, true);
    if !skipped.is_empty() {
        warn!(
            "Referenced nodes without ids must be fixed in their source file: {}",
            sorted_names(&skipped).join(", ")
        );
    }

    written.sort();
    Ok(written)
}

/// Give all but the first node (by name) of each duplicate group a fresh
/// identity, so one node keeps the identity already published.
pub fn regenerate_duplicate_ids(
    rules: &IdentityRules,
    instance: &Instance,
    asset_id: &str,
) -> Result<Vec<String>, PublishError> {
    let duplicates = rules.duplicate_ids(instance);
    let mut groups: BTreeMap<String, Vec<NodeRef>> = BTreeMap::new();
    for node in duplicates {
        if let Some(cb_id) = rules.ids.get_id(&*node) {
            groups.entry(cb_id).or_default().push(node);
        }
    }

    let mut written = Vec::new();
    for (_, mut members) in groups {
        members.sort_by(|a, b| a.name().cmp(b.name()));
        for node in members.into_iter().skip(1) {
            let new_id = generate_id(asset_id);
            rules.ids.set_id(&*node, &new_id, true)?;
            info!("Regenerated id {} on '{}'", new_id, node.name());
            written.push(node.name().to_string());
        }
    }
    written.sort();
    Ok(written)
}

/// Re-stamp local nodes with a fresh identity of `asset_id`, replacing
/// whatever they carried. Referenced nodes are left alone.
pub fn reassign_ids(
    rules: &IdentityRules,
    nodes: &[NodeRef],
    asset_id: &str,
) -> Result<Vec<String>, PublishError> {
    let mut written = Vec::new();
    for node in nodes {
        if node.is_externally_referenced() {
            warn!("Not touching referenced node '{}'", node.name());
            continue;
        }
        let new_id = generate_id(asset_id);
        rules.ids.set_id(&**node, &new_id, true)?;
        info!("Reassigned id {} on '{}'", new_id, node.name());
        written.push(node.name().to_string());
    }
    written.sort();
    Ok(written)
}

/// Select the given nodes for inspection. No-op in headless scenes.
pub fn select_invalid(scene: &dyn Scene, invalid: &[String]) {
    if invalid.is_empty() {
        return;
    }
    info!("Selecting {} invalid nodes", invalid.len());
    scene.select(invalid);
}

/// Copy each out-of-sync node's id from its history source.
pub fn copy_history_ids(
    rules: &IdentityRules,
    instance: &Instance,
    scene: &dyn Scene,
) -> Result<Vec<String>, PublishError> {
    let mut written = Vec::new();
    for (node, history_id) in rules.out_of_sync_with_history(instance, scene) {
        rules.ids.set_id(&*node, &history_id, true)?;
        written.push(node.name().to_string());
    }
    written.sort();
    Ok(written)
}

/// Put back the ids recorded in the last published version.
pub fn restore_published_ids(
    rules: &IdentityRules,
    instance: &Instance,
    published: &PublishedIds,
) -> Result<Vec<String>, PublishError> {
    let mut written = Vec::new();
    for mismatch in rules.changed_since_version(instance, published, false) {
        info!(
            "Updating id for {}: {}",
            mismatch.node.name(),
            mismatch.previous_id
        );
        rules.ids.set_id(&*mismatch.node, &mismatch.previous_id, true)?;
        written.push(mismatch.node.name().to_string());
    }
    written.sort();
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::asset_id_of;
    use crate::store::{MemoryScene, NodeSnapshot, SceneSnapshot};

    fn build(nodes: Vec<NodeSnapshot>) -> (MemoryScene, Instance) {
        let scene = MemoryScene::from_snapshot(SceneSnapshot {
            current_file: None,
            nodes,
        });
        let instance = Instance::new("modelMain").with_members(scene.nodes());
        (scene, instance)
    }

    #[test]
    fn test_generate_missing_ids_is_idempotent() {
        let (scene, instance) = build(vec![
            NodeSnapshot::new("A", "mesh"),
            NodeSnapshot::new("B", "mesh"),
            NodeSnapshot::new("C", "mesh").attr("cbId", "id_shotA:keep"),
            NodeSnapshot::new("|grp", "transform"),
        ]);
        let rules = IdentityRules::default();

        let written = generate_missing_ids(&rules, &instance, "id_shotA").unwrap();
        assert_eq!(written, vec!["A", "B"]);
        assert!(rules.missing_ids(&instance, false).is_empty());
        assert_eq!(scene.writes().len(), 2);
        for write in scene.writes() {
            assert_eq!(asset_id_of(&write.value), "id_shotA");
        }

        let written = generate_missing_ids(&rules, &instance, "id_shotA").unwrap();
        assert!(written.is_empty());
        assert_eq!(scene.writes().len(), 2);
    }

    #[test]
    fn test_generate_skips_referenced_nodes() {
        let (scene, instance) = build(vec![NodeSnapshot::new("ref:A", "mesh").referenced()]);
        let rules = IdentityRules::default();
        let written = generate_missing_ids(&rules, &instance, "id_shotA").unwrap();
        assert!(written.is_empty());
        assert!(scene.writes().is_empty());
    }

    #[test]
    fn test_regenerate_duplicates_keeps_first() {
        let (_scene, instance) = build(vec![
            NodeSnapshot::new("A", "mesh").attr("cbId", "id_shotA:1"),
            NodeSnapshot::new("B", "mesh").attr("cbId", "id_shotA:1"),
            NodeSnapshot::new("C", "mesh").attr("cbId", "id_shotA:1"),
            NodeSnapshot::new("D", "mesh").attr("cbId", "id_shotA:2"),
        ]);
        let rules = IdentityRules::default();
        let written = regenerate_duplicate_ids(&rules, &instance, "id_shotA").unwrap();
        assert_eq!(written, vec!["B", "C"]);
        assert!(rules.duplicate_ids(&instance).is_empty());

        let a = instance.iter().find(|n| n.name() == "A").unwrap();
        assert_eq!(rules.ids.get_id(&**a).as_deref(), Some("id_shotA:1"));
    }

    #[test]
    fn test_reassign_ids_skips_referenced() {
        let (scene, instance) = build(vec![
            NodeSnapshot::new("A", "mesh").attr("cbId", "id_shotB:1"),
            NodeSnapshot::new("ref:B", "mesh").attr("cbId", "id_shotB:2").referenced(),
        ]);
        let rules = IdentityRules::default();
        let written = reassign_ids(&rules, &instance.members, "id_shotA").unwrap();
        assert_eq!(written, vec!["A"]);
        assert_eq!(scene.writes().len(), 1);
        assert_eq!(asset_id_of(&scene.writes()[0].value), "id_shotA");
    }

    #[test]
    fn test_select_invalid_records_selection() {
        let (scene, _instance) = build(vec![NodeSnapshot::new("A", "mesh")]);
        select_invalid(&scene, &["A".to_string()]);
        assert_eq!(scene.selection(), vec!["A"]);
    }

    #[test]
    fn test_copy_history_ids_overwrites() {
        let (scene, instance) = build(vec![
            NodeSnapshot::new("bodyShape", "mesh").attr("cbId", "id_shotA:1"),
            NodeSnapshot::new("bodyShapeDeformed", "mesh").attr("cbId", "id_shotA:9").history("bodyShape"),
        ]);
        let rules = IdentityRules::default();
        let written = copy_history_ids(&rules, &instance, &scene).unwrap();
        assert_eq!(written, vec!["bodyShapeDeformed"]);
        assert!(rules.out_of_sync_with_history(&instance, &scene).is_empty());
    }

    #[test]
    fn test_restore_published_ids() {
        let (_scene, instance) = build(vec![NodeSnapshot::new("|geo|bodyShape", "mesh").attr("cbId", "id_shotA:new")]);
        let mut ids_by_path = BTreeMap::new();
        ids_by_path.insert("|geo|bodyShape".to_string(), "id_shotA:old".to_string());
        let published = PublishedIds {
            asset_id: "id_shotA".to_string(),
            subset: "modelMain".to_string(),
            version: 1,
            ids_by_path,
            representations: vec![],
        };
        let rules = IdentityRules::default();
        let written = restore_published_ids(&rules, &instance, &published).unwrap();
        assert_eq!(written, vec!["|geo|bodyShape"]);
        assert!(rules.changed_since_version(&instance, &published, false).is_empty());
    }
}
