use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::node::SchemaNode;
use super::value::META_KEY;

/// Behaviour flags persisted on the root of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootFlags {
    /// Primitives are never wrapped to match a sequence template.
    #[serde(default)]
    pub strict_template: bool,
    /// Sequence templates are appended rather than merged by position.
    #[serde(default = "default_true")]
    pub concat_template_array: bool,
    /// `set` always replaces the whole value, even for annotated scalars.
    #[serde(default)]
    pub strict_set: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RootFlags {
    fn default() -> Self {
        Self {
            strict_template: false,
            concat_template_array: true,
            strict_set: false,
        }
    }
}

impl RootFlags {
    /// Overlay any flags declared in the root `$meta` of `stat_data`.
    pub fn overlay_meta(self, stat_data: &Value) -> RootFlags {
        let meta = stat_data.get(META_KEY);
        let flag = |name: &str, fallback: bool| {
            meta.and_then(|m| m.get(name))
                .and_then(Value::as_bool)
                .unwrap_or(fallback)
        };
        RootFlags {
            strict_template: flag("strictTemplate", self.strict_template),
            concat_template_array: flag("concatTemplateArray", self.concat_template_array),
            strict_set: flag("strictSet", self.strict_set),
        }
    }
}

/// The root schema together with its persisted flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSchema {
    pub root: SchemaNode,
    #[serde(default)]
    pub flags: RootFlags,
}

/// Persistent game state handed to the engine for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    /// The live state tree mutated by commands.
    #[serde(default = "empty_map")]
    pub stat_data: Value,
    /// Full-shape view of the last batch with changed leaves replaced by diff strings.
    #[serde(default = "empty_map")]
    pub display_data: Value,
    /// Sparse view holding only the paths the last batch touched.
    #[serde(default = "empty_map")]
    pub delta_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<StateSchema>,
}

fn empty_map() -> Value {
    Value::Object(Map::new())
}

impl Default for GameData {
    fn default() -> Self {
        Self::new(empty_map())
    }
}

impl GameData {
    pub fn new(stat_data: Value) -> Self {
        Self {
            display_data: stat_data.clone(),
            stat_data,
            delta_data: empty_map(),
            schema: None,
        }
    }

    /// Flags in effect for the next batch: the schema's, else `defaults`.
    pub fn flags_or(&self, defaults: RootFlags) -> RootFlags {
        self.schema.as_ref().map(|s| s.flags).unwrap_or(defaults)
    }
}
