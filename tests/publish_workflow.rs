use cbid_publish::config::AppConfig;
use cbid_publish::logic::{IdentityRules, PublishEnv, PublishPipeline};
use cbid_publish::model::{asset_id_of, AssetDoc, Context, InstanceState, PluginStatus, Scene};
use cbid_publish::store::{MemoryScene, MemoryStore, PublishedIdStore, SceneSnapshot};
use serde_json::json;

const RELATED: &str = "Node Ids Related (ID)";
const IN_DATABASE: &str = "Node Ids in Database";
const HAS_ID: &str = "Instance Nodes Have ID";
const UNIQUE: &str = "Non Duplicate Instance Members (ID)";
const OUT_RELATED: &str = "Animation Out Set Related Node Ids";
const LATEST_VERSION: &str = "Model ids match latest version";

fn store() -> MemoryStore {
    MemoryStore::with_assets(
        "demo",
        vec![AssetDoc::new("id_shotA", "shotA"), AssetDoc::new("id_shotB", "shotB")],
    )
}

fn model_scene(members: serde_json::Value) -> MemoryScene {
    let mut nodes = vec![json!({
        "name": "modelMain",
        "type": "objectSet",
        "attributes": {
            "id": "pyblish.avalon.instance",
            "family": "model",
            "subset": "modelMain",
            "asset": "shotA"
        },
        "members": members
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].clone())
            .collect::<Vec<_>>()
    })];
    nodes.extend(members.as_array().unwrap().iter().cloned());

    let snapshot: SceneSnapshot = serde_json::from_value(json!({
        "current_file": "/projects/demo/shotA/work/model_v001.ma",
        "nodes": nodes
    }))
    .unwrap();
    MemoryScene::from_snapshot(snapshot)
}

#[tokio::test]
async fn test_relatedness_names_foreign_assets() {
    let scene = model_scene(json!([
        {"name": "|geo|bodyShape", "type": "mesh", "attributes": {"cbId": "id_shotA:aaa"}},
        {"name": "|geo|armShape", "type": "mesh", "attributes": {"cbId": "id_shotB:bbb"}}
    ]));
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());
    let mut context = Context::new("demo");

    let report = pipeline.run(&env, &mut context).await;
    assert!(report.aborted.is_none());

    let related = report.failure_for(RELATED, "modelMain").unwrap();
    assert_eq!(related.invalid, vec!["|geo|armShape"]);
    assert!(related.details.contains("shotB"));
    assert!(related.message.contains("shotA"));

    assert!(report.failure_for(IN_DATABASE, "modelMain").is_none());
    assert!(report.failure_for(HAS_ID, "modelMain").is_none());
    assert_eq!(context.data.get_str("currentFile"), Some("/projects/demo/shotA/work/model_v001.ma"));
    assert_eq!(context.data.get_str("host"), Some("maya"));
}

#[tokio::test]
async fn test_deleted_asset_is_flagged_but_never_named() {
    let scene = model_scene(json!([
        {"name": "|geo|bodyShape", "type": "mesh", "attributes": {"cbId": "id_shotA:aaa"}},
        {"name": "|geo|oldShape", "type": "mesh", "attributes": {"cbId": "id_deleted:ccc"}}
    ]));
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());
    let mut context = Context::new("demo");

    let report = pipeline.run(&env, &mut context).await;
    assert!(report.aborted.is_none());

    let missing = report.failure_for(IN_DATABASE, "modelMain").unwrap();
    assert_eq!(missing.invalid, vec!["|geo|oldShape"]);

    let related = report.failure_for(RELATED, "modelMain").unwrap();
    assert_eq!(related.invalid, vec!["|geo|oldShape"]);
    assert!(!related.details.contains("Related assets"));
    assert!(!related.details.contains("id_deleted:"));
}

#[tokio::test]
async fn test_repair_cycle_then_publish() {
    let scene = model_scene(json!([
        {"name": "|geo", "type": "transform"},
        {"name": "|geo|bodyShape", "type": "mesh", "attributes": {"cbId": "id_shotA:dup"}},
        {"name": "|geo|headShape", "type": "mesh", "attributes": {"cbId": "id_shotA:dup"}},
        {"name": "|geo|armShape", "type": "mesh"},
        {"name": "|geo|legShape", "type": "mesh", "attributes": {"cbId": "id_shotB:leg"}}
    ]));
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());
    let mut context = Context::new("demo");

    let report = pipeline.run(&env, &mut context).await;
    assert!(!report.success());
    assert_eq!(report.failure_for(HAS_ID, "modelMain").unwrap().invalid, vec!["|geo|armShape"]);
    assert_eq!(
        report.failure_for(UNIQUE, "modelMain").unwrap().invalid,
        vec!["|geo|bodyShape", "|geo|headShape"]
    );
    assert_eq!(report.failure_for(RELATED, "modelMain").unwrap().invalid, vec!["|geo|legShape"]);
    assert_eq!(context.instance("modelMain").unwrap().state, InstanceState::Failed);

    let summary = pipeline.repair(&env, &mut context, &report, None).await;
    assert_eq!(summary.changed_nodes(), 3);
    assert!(summary.unrepairable.is_empty());
    assert_eq!(context.instance("modelMain").unwrap().state, InstanceState::Validating);

    let report = pipeline.validate(&env, &mut context).await;
    assert!(report.success(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(context.instance("modelMain").unwrap().state, InstanceState::Passed);

    for node in scene.nodes().iter().filter(|n| n.node_type() == "mesh") {
        let cb_id = node.get_attribute("cbId").unwrap();
        assert_eq!(asset_id_of(&cb_id), "id_shotA");
    }
    assert!(scene.get_node("|geo").unwrap().get_attribute("cbId").is_none());

    // A fresh publish run integrates the repaired ids.
    let mut context = Context::new("demo");
    let report = pipeline.run(&env, &mut context).await;
    assert!(report.success());
    let published = store
        .latest_published_ids("demo", "id_shotA", "modelMain")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.version, 1);
    assert_eq!(published.ids_by_path.len(), 4);
    assert_eq!(published.representations, vec!["ids"]);
    let instance = context.instance("modelMain").unwrap();
    let ids_file = &instance.representations[0].paths()[0];
    let extracted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ids_file).unwrap()).unwrap();
    assert_eq!(extracted.as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_changed_ids_detected_against_latest_version() {
    let scene = model_scene(json!([
        {"name": "|geo|bodyShape", "type": "mesh", "attributes": {"cbId": "id_shotA:body"}}
    ]));
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());

    let report = pipeline.run(&env, &mut Context::new("demo")).await;
    assert!(report.success());

    scene
        .get_node("|geo|bodyShape")
        .unwrap()
        .set_attribute("cbId", "id_shotA:changed")
        .unwrap();

    let mut context = Context::new("demo");
    let report = pipeline.run(&env, &mut context).await;
    let changed = report.failure_for(LATEST_VERSION, "modelMain").unwrap();
    assert_eq!(changed.invalid, vec!["|geo|bodyShape"]);

    let summary = pipeline
        .repair(&env, &mut context, &report, Some(LATEST_VERSION))
        .await;
    assert_eq!(summary.changed_nodes(), 1);
    assert_eq!(
        scene.get_node("|geo|bodyShape").unwrap().get_attribute("cbId").as_deref(),
        Some("id_shotA:body")
    );
}

#[tokio::test]
async fn test_animation_out_set_follows_history() {
    let snapshot: SceneSnapshot = serde_json::from_value(json!({
        "nodes": [
            {
                "name": "animMain",
                "type": "objectSet",
                "attributes": {
                    "id": "pyblish.avalon.instance",
                    "family": "animation",
                    "asset": "shotA"
                },
                "members": ["|char|bodyShapeDeformed"]
            },
            {"name": "|ref:char|bodyShape", "type": "mesh", "referenced": true,
             "attributes": {"cbId": "id_shotB:body"}},
            {"name": "|char|bodyShapeDeformed", "type": "mesh",
             "attributes": {"cbId": "id_shotA:fresh"}, "history": "|ref:char|bodyShape"}
        ]
    }))
    .unwrap();
    let scene = MemoryScene::from_snapshot(snapshot);
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());
    let mut context = Context::new("demo");

    let report = pipeline.run(&env, &mut context).await;
    let out_related = report.failure_for(OUT_RELATED, "animMain").unwrap();
    assert_eq!(out_related.invalid, vec!["|char|bodyShapeDeformed"]);

    pipeline
        .repair(&env, &mut context, &report, Some(OUT_RELATED))
        .await;
    let report = pipeline.validate(&env, &mut context).await;
    assert!(report.failure_for(OUT_RELATED, "animMain").is_none());
    assert!(report
        .results
        .iter()
        .any(|r| r.plugin == OUT_RELATED && r.status == PluginStatus::Passed));
}

#[tokio::test]
async fn test_animation_out_set_members_are_checked() {
    let snapshot: SceneSnapshot = serde_json::from_value(json!({
        "nodes": [
            {
                "name": "animMain",
                "type": "objectSet",
                "attributes": {
                    "id": "pyblish.avalon.instance",
                    "family": "animation",
                    "asset": "shotA"
                },
                "members": ["|char|controls", "char:out_SET"]
            },
            {"name": "|char|controls", "type": "transform"},
            {"name": "char:out_SET", "type": "objectSet", "members": ["|char|bodyShapeDeformed"]},
            {"name": "|ref:char|bodyShape", "type": "mesh", "referenced": true,
             "attributes": {"cbId": "id_shotA:body"}},
            {"name": "|char|bodyShapeDeformed", "type": "mesh",
             "attributes": {"cbId": "id_shotA:fresh"}, "history": "|ref:char|bodyShape"}
        ]
    }))
    .unwrap();
    let scene = MemoryScene::from_snapshot(snapshot);
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());
    let mut context = Context::new("demo");

    let report = pipeline.run(&env, &mut context).await;
    assert_eq!(
        context.instance("animMain").unwrap().get("out_hierarchy"),
        Some(&json!(["|char|bodyShapeDeformed"]))
    );
    let out_related = report.failure_for(OUT_RELATED, "animMain").unwrap();
    assert_eq!(out_related.invalid, vec!["|char|bodyShapeDeformed"]);
}

#[tokio::test]
async fn test_unknown_asset_aborts_run() {
    let snapshot: SceneSnapshot = serde_json::from_value(json!({
        "nodes": [{
            "name": "modelMain",
            "type": "objectSet",
            "attributes": {"id": "pyblish.avalon.instance", "family": "model", "asset": "nowhere"}
        }]
    }))
    .unwrap();
    let scene = MemoryScene::from_snapshot(snapshot);
    let store = store();
    let env = PublishEnv::new(&scene, &store, IdentityRules::default(), "maya");
    let pipeline = PublishPipeline::from_config(&AppConfig::default());

    let report = pipeline.run(&env, &mut Context::new("demo")).await;
    assert!(report.aborted.as_deref().unwrap_or_default().contains("nowhere"));
    assert!(report.results.iter().all(|r| r.plugin != HAS_ID));
}
