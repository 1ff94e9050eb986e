//! Schema inference, reconciliation and metadata cleanup.
//!
//! Inference reads the `$meta` side channel, the extensible marker and
//! `$arrayMeta` sentinels from the data without touching it; cleanup is a
//! separate pass that removes those artifacts from the live tree.

use rustc_hash::FxHashSet;
use serde_json::{Map, Value};

use super::game_data::{GameData, RootFlags, StateSchema};
use super::node::{
    get_schema_for_path_mut, inherits_recursive_extensible, ArraySchema, ObjectSchema,
    PropertySchema, SchemaNode,
};
use super::path::{self, Path, Segment};
use super::value::{ARRAY_META_KEY, EXTENSIBLE_MARKER, META_KEY};

/// What a node passes down to its children during inference.
#[derive(Debug, Clone, Copy, Default)]
struct Inherited {
    recursive_extensible: bool,
}

/// Infer a schema for `data`, merging with the schema it previously had.
pub fn generate_schema(
    data: &Value,
    old: Option<&SchemaNode>,
    parent_recursive_extensible: bool,
) -> SchemaNode {
    infer(
        data,
        old,
        Inherited {
            recursive_extensible: parent_recursive_extensible,
        },
    )
}

fn infer(data: &Value, old: Option<&SchemaNode>, inherited: Inherited) -> SchemaNode {
    match data {
        Value::Array(items) => {
            let old = match old {
                Some(SchemaNode::Array(array)) => Some(array),
                Some(SchemaNode::Object(_)) => {
                    tracing::warn!(
                        target: "narrative_state::schema",
                        "expected object data for object schema, found array; using a fresh schema"
                    );
                    None
                }
                _ => None,
            };
            SchemaNode::Array(infer_array(items, old, inherited))
        }
        Value::Object(map) => {
            let old = match old {
                Some(SchemaNode::Object(object)) => Some(object),
                Some(SchemaNode::Array(_)) => {
                    tracing::warn!(
                        target: "narrative_state::schema",
                        "expected array data for array schema, found object; using a fresh schema"
                    );
                    None
                }
                _ => None,
            };
            SchemaNode::Object(infer_object(map, old, inherited))
        }
        Value::String(_) => SchemaNode::String,
        Value::Number(_) => SchemaNode::Number,
        Value::Bool(_) => SchemaNode::Boolean,
        Value::Null => SchemaNode::Any,
    }
}

fn meta_flag(meta: Option<&Map<String, Value>>, name: &str) -> Option<bool> {
    meta.and_then(|m| m.get(name)).and_then(Value::as_bool)
}

fn infer_array(items: &[Value], old: Option<&ArraySchema>, inherited: Inherited) -> ArraySchema {
    let mut marked = false;
    let mut sentinel: Option<&Map<String, Value>> = None;
    let mut first_element = None;

    for item in items {
        if is_extensible_marker(item) {
            marked = true;
        } else if is_array_meta(item) {
            sentinel = item.get(META_KEY).and_then(Value::as_object).or(sentinel);
        } else if first_element.is_none() {
            first_element = Some(item);
        }
    }

    let extensible = old.is_some_and(|o| o.extensible)
        || inherited.recursive_extensible
        || marked
        || meta_flag(sentinel, "extensible") == Some(true);
    let recursive_extensible = old.is_some_and(|o| o.recursive_extensible)
        || meta_flag(sentinel, "recursiveExtensible") == Some(true)
        || inherited.recursive_extensible;
    let template = sentinel
        .and_then(|m| m.get("template"))
        .cloned()
        .or_else(|| old.and_then(|o| o.template.clone()));

    let element_type = match first_element {
        Some(first) => infer(
            first,
            old.map(|o| o.element_type.as_ref()),
            Inherited {
                recursive_extensible,
            },
        ),
        // Emptied arrays keep what they knew about their elements.
        None => old
            .map(|o| o.element_type.as_ref().clone())
            .unwrap_or(SchemaNode::Any),
    };

    ArraySchema {
        element_type: Box::new(element_type),
        extensible,
        recursive_extensible,
        template,
    }
}

fn infer_object(
    map: &Map<String, Value>,
    old: Option<&ObjectSchema>,
    inherited: Inherited,
) -> ObjectSchema {
    let meta = map.get(META_KEY).and_then(Value::as_object);
    let declared_extensible = meta_flag(meta, "extensible");
    let declared_recursive = meta_flag(meta, "recursiveExtensible") == Some(true);

    let extensible = old.is_some_and(|o| o.extensible)
        || declared_extensible == Some(true)
        || declared_recursive
        || inherited.recursive_extensible;
    let recursive_extensible = old.is_some_and(|o| o.recursive_extensible) || declared_recursive;
    let template = meta
        .and_then(|m| m.get("template"))
        .cloned()
        .or_else(|| old.and_then(|o| o.template.clone()));

    let required: FxHashSet<&str> = meta
        .and_then(|m| m.get("required"))
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    // An explicit `extensible: false` stops the cascade at this node.
    let child_inherited = Inherited {
        recursive_extensible: declared_extensible != Some(false)
            && (recursive_extensible || inherited.recursive_extensible),
    };

    let mut properties = std::collections::BTreeMap::new();
    for (key, child) in map {
        if key == META_KEY {
            continue;
        }
        let old_property = old.and_then(|o| o.properties.get(key));
        let schema = infer(child, old_property.map(|p| &p.schema), child_inherited);

        // The stored flag outlives later changes to the owner's extensibility.
        let is_required = old_property
            .and_then(|p| p.required)
            .unwrap_or_else(|| required.contains(key.as_str()) || !extensible);

        properties.insert(
            key.clone(),
            PropertySchema {
                schema,
                required: Some(is_required),
            },
        );
    }

    ObjectSchema {
        properties,
        extensible,
        recursive_extensible,
        template,
    }
}

fn is_extensible_marker(item: &Value) -> bool {
    item.as_str() == Some(EXTENSIBLE_MARKER)
}

fn is_array_meta(item: &Value) -> bool {
    item.get(ARRAY_META_KEY).and_then(Value::as_bool) == Some(true)
}

/// Regenerate the whole schema from `stat_data` and carry the root flags forward.
///
/// Flags declared in the root `$meta` take precedence over the previous
/// schema's flags, which take precedence over `defaults`.
pub fn reconcile_and_apply_schema(game_data: &mut GameData, defaults: RootFlags) {
    let previous = game_data.schema.take();
    let root = generate_schema(
        &game_data.stat_data,
        previous.as_ref().map(|s| &s.root),
        false,
    );
    let flags = previous
        .map(|s| s.flags)
        .unwrap_or(defaults)
        .overlay_meta(&game_data.stat_data);

    tracing::debug!(target: "narrative_state::schema", ?flags, "schema reconciled");
    game_data.schema = Some(StateSchema { root, flags });
}

/// Merge a freshly inferred sub-schema for the data at `container` into the live schema.
///
/// Used right after an insertion so metadata carried by the inserted value
/// (templates, extensibility) is captured before it is stripped. State that
/// has no schema yet gets a full one built from `defaults`.
pub fn refresh_schema_at(game_data: &mut GameData, container: &Path, defaults: RootFlags) {
    if game_data.schema.is_none() {
        reconcile_and_apply_schema(game_data, defaults);
        return;
    }
    let Some(schema) = game_data.schema.as_mut() else {
        return;
    };
    let Some(data) = path::get(&game_data.stat_data, container) else {
        return;
    };

    let inherited = inherits_recursive_extensible(&schema.root, container);
    if let Some(node) = get_schema_for_path_mut(&mut schema.root, container) {
        *node = generate_schema(data, Some(&*node), inherited);
        return;
    }

    // The container itself is new: hang it under its parent object schema.
    let (Some(parent), Some(Segment::Key(key))) = (container.parent(), container.last()) else {
        return;
    };
    if let Some(SchemaNode::Object(object)) = get_schema_for_path_mut(&mut schema.root, &parent) {
        object.properties.insert(
            key.clone(),
            PropertySchema {
                schema: generate_schema(data, None, inherited),
                required: Some(!object.extensible),
            },
        );
    }
}

/// Remove `$meta` keys, extensible markers and `$arrayMeta` sentinels from `tree`.
pub fn clean_up_metadata(tree: &mut Value) {
    match tree {
        Value::Object(map) => {
            map.shift_remove(META_KEY);
            for child in map.values_mut() {
                clean_up_metadata(child);
            }
        }
        Value::Array(items) => {
            items.retain(|item| !is_extensible_marker(item) && !is_array_meta(item));
            for child in items.iter_mut() {
                clean_up_metadata(child);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::get_schema_for_path;
    use serde_json::json;

    fn at<'a>(schema: &'a SchemaNode, p: &str) -> &'a SchemaNode {
        get_schema_for_path(schema, &Path::parse(p).unwrap()).unwrap()
    }

    #[test]
    fn primitives_map_directly() {
        assert_eq!(generate_schema(&json!("x"), None, false), SchemaNode::String);
        assert_eq!(generate_schema(&json!(1.5), None, false), SchemaNode::Number);
        assert_eq!(generate_schema(&json!(true), None, false), SchemaNode::Boolean);
        assert_eq!(generate_schema(&json!(null), None, false), SchemaNode::Any);
    }

    #[test]
    fn plain_objects_are_closed_with_required_keys() {
        let schema = generate_schema(&json!({"hp": 10, "name": "x"}), None, false);
        let object = schema.as_object().unwrap();
        assert!(!object.extensible);
        assert!(object.is_required("hp"));
        assert!(object.is_required("name"));
    }

    #[test]
    fn meta_declares_extensible_and_required() {
        let data = json!({
            "$meta": {"extensible": true, "required": ["name"]},
            "name": "Ada",
            "nick": "A"
        });
        let schema = generate_schema(&data, None, false);
        let object = schema.as_object().unwrap();
        assert!(object.extensible);
        assert!(object.is_required("name"));
        assert!(!object.is_required("nick"));
        assert!(!object.properties.contains_key("$meta"));
    }

    #[test]
    fn old_required_flag_wins_last() {
        let first = generate_schema(&json!({"$meta": {"required": ["a"]}, "a": 1}), None, false);
        let second = generate_schema(&json!({"a": 1}), Some(&first), false);
        assert_eq!(second.as_object().unwrap().properties["a"].required, Some(true));
    }

    #[test]
    fn required_survives_the_owner_becoming_extensible() {
        let first = generate_schema(&json!({"stats": {"str": 5}}), None, false);
        let opened = json!({"stats": {"$meta": {"extensible": true}, "str": 5, "dex": 2}});
        let second = generate_schema(&opened, Some(&first), false);
        let stats = at(&second, "stats").as_object().unwrap();
        assert!(stats.extensible);
        assert!(stats.is_required("str"));
        assert!(!stats.is_required("dex"));
    }

    #[test]
    fn marker_and_sentinel_make_arrays_extensible() {
        let marked = generate_schema(&json!(["$__META_EXTENSIBLE__$", "a"]), None, false);
        let marked = marked.as_array().unwrap();
        assert!(marked.extensible);
        assert_eq!(*marked.element_type, SchemaNode::String);

        let data = json!([
            {"$arrayMeta": true, "$meta": {"extensible": true, "template": {"qty": 1}}},
            {"name": "potion", "qty": 3}
        ]);
        let schema = generate_schema(&data, None, false);
        let array = schema.as_array().unwrap();
        assert!(array.extensible);
        assert_eq!(array.template, Some(json!({"qty": 1})));
        assert!(array.element_type.as_object().unwrap().properties.contains_key("name"));
    }

    #[test]
    fn recursive_extensible_cascades() {
        let data = json!({
            "$meta": {"recursiveExtensible": true},
            "bag": {"pouch": {"coins": 1}},
            "list": [[1]]
        });
        let schema = generate_schema(&data, None, false);
        assert!(at(&schema, "bag").as_object().unwrap().extensible);
        assert!(at(&schema, "bag.pouch").as_object().unwrap().extensible);
        assert!(at(&schema, "list").as_array().unwrap().extensible);
        assert!(at(&schema, "list[0]").as_array().unwrap().extensible);
    }

    #[test]
    fn explicit_false_blocks_the_cascade() {
        let data = json!({
            "$meta": {"recursiveExtensible": true},
            "locked": {"$meta": {"extensible": false}, "inner": {"x": 1}}
        });
        let schema = generate_schema(&data, None, false);
        assert!(!at(&schema, "locked.inner").as_object().unwrap().extensible);
    }

    #[test]
    fn mismatched_old_schema_degrades_to_fresh() {
        let old = generate_schema(&json!([1, 2]), None, false);
        let schema = generate_schema(&json!({"a": 1}), Some(&old), false);
        assert!(schema.as_object().unwrap().properties.contains_key("a"));
    }

    #[test]
    fn inference_is_idempotent_after_cleanup() {
        let mut data = json!({
            "$meta": {"extensible": true, "template": {"hp": 1}},
            "items": ["$__META_EXTENSIBLE__$", {"name": "sword"}],
            "stats": {"$meta": {"required": ["str"]}, "str": 5, "dex": [3, "agility"]}
        });
        let first = generate_schema(&data, None, false);
        clean_up_metadata(&mut data);
        let second = generate_schema(&data, Some(&first), false);
        let third = generate_schema(&data, Some(&second), false);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn cleanup_strips_all_artifacts() {
        let mut data = json!({
            "$meta": {"extensible": true},
            "list": ["$__META_EXTENSIBLE__$", {"$arrayMeta": true, "$meta": {}}, {"$meta": {}, "a": 1}]
        });
        clean_up_metadata(&mut data);
        assert_eq!(data, json!({"list": [{"a": 1}]}));
    }

    #[test]
    fn reconcile_carries_flags_forward() {
        let mut gd = GameData::new(json!({"$meta": {"strictSet": true}, "hp": 1}));
        reconcile_and_apply_schema(&mut gd, RootFlags::default());
        clean_up_metadata(&mut gd.stat_data);
        assert!(gd.schema.as_ref().unwrap().flags.strict_set);

        // Without root meta the previous schema's flags persist.
        reconcile_and_apply_schema(&mut gd, RootFlags::default());
        assert!(gd.schema.as_ref().unwrap().flags.strict_set);

        // Root meta overrides the previous schema.
        gd.stat_data["$meta"] = json!({"strictSet": false});
        reconcile_and_apply_schema(&mut gd, RootFlags::default());
        assert!(!gd.schema.as_ref().unwrap().flags.strict_set);
    }

    #[test]
    fn refresh_captures_inserted_metadata() {
        let mut gd = GameData::new(json!({"bag": {"$meta": {"extensible": true}}}));
        reconcile_and_apply_schema(&mut gd, RootFlags::default());
        clean_up_metadata(&mut gd.stat_data);

        gd.stat_data["bag"]["pouch"] = json!({"$meta": {"template": {"coins": 0}}});
        refresh_schema_at(&mut gd, &Path::parse("bag").unwrap(), RootFlags::default());
        let root = &gd.schema.as_ref().unwrap().root;
        assert_eq!(at(root, "bag.pouch").template(), Some(&json!({"coins": 0})));
        assert!(at(root, "bag").as_object().unwrap().extensible);
    }

    #[test]
    fn refresh_builds_a_missing_schema_from_the_live_tree() {
        let mut gd = GameData::new(json!({"bag": {}}));
        gd.stat_data["bag"]["pouch"] =
            json!({"$meta": {"extensible": true, "template": {"coins": 0}}});
        refresh_schema_at(&mut gd, &Path::parse("bag").unwrap(), RootFlags::default());
        let root = &gd.schema.as_ref().unwrap().root;
        let pouch = at(root, "bag.pouch");
        assert!(pouch.as_object().unwrap().extensible);
        assert_eq!(pouch.template(), Some(&json!({"coins": 0})));
    }
}
