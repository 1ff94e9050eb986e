/// Schema inference and reconciliation over a loaded game state.

use narrative_state::schema::game_data::{GameData, RootFlags};
use narrative_state::schema::infer::{
    clean_up_metadata, generate_schema, reconcile_and_apply_schema, refresh_schema_at,
};
use narrative_state::schema::node::{get_schema_for_path, SchemaNode};
use narrative_state::schema::path::{self, Path};
use serde_json::json;

fn load_fixture() -> GameData {
    let source = std::fs::read_to_string("tests/fixtures/game_data.json").unwrap();
    serde_json::from_str(&source).unwrap()
}

fn node<'a>(gd: &'a GameData, p: &str) -> &'a SchemaNode {
    let schema = gd.schema.as_ref().unwrap();
    get_schema_for_path(&schema.root, &Path::parse(p).unwrap()).unwrap()
}

#[test]
fn reconcile_reads_metadata_then_cleanup_strips_it() {
    let mut gd = load_fixture();
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    clean_up_metadata(&mut gd.stat_data);

    let inventory = node(&gd, "inventory").as_array().unwrap();
    assert!(inventory.extensible);
    assert_eq!(inventory.template, Some(json!({"qty": 1, "rarity": "common"})));
    assert!(node(&gd, "flags").as_array().unwrap().extensible);

    let quests = node(&gd, "quests").as_object().unwrap();
    assert!(quests.extensible);
    assert!(quests.is_required("main"));

    let player = node(&gd, "player").as_object().unwrap();
    assert!(!player.extensible);
    assert!(player.is_required("mana"));

    assert!(gd.stat_data.get("$meta").is_none());
    assert!(gd.stat_data["quests"].get("$meta").is_none());
    assert_eq!(gd.stat_data["inventory"].as_array().unwrap().len(), 1);
    assert_eq!(gd.stat_data["flags"], json!([]));
}

#[test]
fn paths_resolve_through_element_types() {
    let mut gd = load_fixture();
    reconcile_and_apply_schema(&mut gd, RootFlags::default());

    assert_eq!(node(&gd, "inventory[0].qty"), &SchemaNode::Number);
    assert_eq!(node(&gd, "inventory.3.name"), &SchemaNode::String);
    assert!(matches!(node(&gd, "player.health"), SchemaNode::Array(_)));

    let root = &gd.schema.as_ref().unwrap().root;
    assert!(get_schema_for_path(root, &Path::parse("player.missing").unwrap()).is_none());
    assert!(get_schema_for_path(root, &Path::parse("player.name[0]").unwrap()).is_none());
}

#[test]
fn inference_is_stable_over_clean_data() {
    let gd = load_fixture();
    let first = generate_schema(&gd.stat_data, None, false);
    let mut clean = gd.stat_data.clone();
    clean_up_metadata(&mut clean);
    let second = generate_schema(&clean, Some(&first), false);
    let third = generate_schema(&clean, Some(&second), false);
    assert_eq!(second, third);
    assert_eq!(first, second);
}

#[test]
fn root_meta_flags_beat_previous_flags() {
    let mut gd = GameData::new(json!({"$meta": {"strictSet": true}, "hp": 1}));
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    clean_up_metadata(&mut gd.stat_data);
    assert!(gd.schema.as_ref().unwrap().flags.strict_set);

    // Without fresh metadata the previous flags carry forward.
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    assert!(gd.schema.as_ref().unwrap().flags.strict_set);

    path::set(&mut gd.stat_data, &Path::parse("$meta.strictSet").unwrap(), json!(false));
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    assert!(!gd.schema.as_ref().unwrap().flags.strict_set);
}

#[test]
fn refresh_captures_metadata_of_inserted_values() {
    let mut gd = GameData::new(json!({"bags": {"$meta": {"extensible": true}}}));
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    clean_up_metadata(&mut gd.stat_data);

    let pouch = Path::parse("bags.pouch").unwrap();
    path::set(
        &mut gd.stat_data,
        &pouch,
        json!({"$meta": {"extensible": true, "template": {"count": 0}}}),
    );
    refresh_schema_at(&mut gd, &Path::parse("bags").unwrap(), RootFlags::default());

    let pouch_schema = node(&gd, "bags.pouch").as_object().unwrap();
    assert!(pouch_schema.extensible);
    assert_eq!(pouch_schema.template, Some(json!({"count": 0})));
}

#[test]
fn emptied_arrays_keep_their_element_type() {
    let mut gd = GameData::new(json!({"log": [{"line": "hello"}]}));
    reconcile_and_apply_schema(&mut gd, RootFlags::default());
    path::set(&mut gd.stat_data, &Path::parse("log").unwrap(), json!([]));
    reconcile_and_apply_schema(&mut gd, RootFlags::default());

    let log = node(&gd, "log").as_array().unwrap();
    assert!(log.element_type.as_object().unwrap().properties.contains_key("line"));
}
