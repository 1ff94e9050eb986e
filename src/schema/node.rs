//! Structural schema inferred from state data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::path::{Path, Segment};

/// Inferred structural description of a state subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    Object(ObjectSchema),
    Array(ArraySchema),
    String,
    Number,
    Boolean,
    Any,
}

/// Schema of a map node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub extensible: bool,
    #[serde(default)]
    pub recursive_extensible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
}

/// A property slot of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(flatten)]
    pub schema: SchemaNode,
    /// Inference always stores the resolved flag. `None` only occurs in
    /// hand-built schemas and falls back to the owner's extensibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Schema of a sequence node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArraySchema {
    pub element_type: Box<SchemaNode>,
    #[serde(default)]
    pub extensible: bool,
    #[serde(default)]
    pub recursive_extensible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
}

impl Default for ArraySchema {
    fn default() -> Self {
        Self {
            element_type: Box::new(SchemaNode::Any),
            extensible: false,
            recursive_extensible: false,
            template: None,
        }
    }
}

impl ObjectSchema {
    /// Whether `key` is required. Keys default to required in non-extensible objects.
    pub fn is_required(&self, key: &str) -> bool {
        match self.properties.get(key) {
            Some(property) => property.required.unwrap_or(!self.extensible),
            None => false,
        }
    }

    /// Whether a new key may be added.
    pub fn accepts_key(&self, key: &str) -> bool {
        self.extensible || self.properties.contains_key(key)
    }
}

impl SchemaNode {
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            SchemaNode::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArraySchema> {
        match self {
            SchemaNode::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn template(&self) -> Option<&Value> {
        match self {
            SchemaNode::Object(object) => object.template.as_ref(),
            SchemaNode::Array(array) => array.template.as_ref(),
            _ => None,
        }
    }

    pub fn recursive_extensible(&self) -> bool {
        match self {
            SchemaNode::Object(object) => object.recursive_extensible,
            SchemaNode::Array(array) => array.recursive_extensible,
            _ => false,
        }
    }

    fn child(&self, segment: &Segment) -> Option<&SchemaNode> {
        match (self, segment.as_index()) {
            (SchemaNode::Array(array), Some(_)) => Some(&array.element_type),
            (SchemaNode::Object(object), _) => object
                .properties
                .get(&segment.as_key())
                .map(|property| &property.schema),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut SchemaNode> {
        match (self, segment.as_index()) {
            (SchemaNode::Array(array), Some(_)) => Some(&mut array.element_type),
            (SchemaNode::Object(object), _) => object
                .properties
                .get_mut(&segment.as_key())
                .map(|property| &mut property.schema),
            _ => None,
        }
    }
}

/// Resolve the schema node describing `path`.
///
/// Numeric segments descend into an array's element type, names into an
/// object's properties. Any mismatch yields `None`.
pub fn get_schema_for_path<'a>(schema: &'a SchemaNode, path: &Path) -> Option<&'a SchemaNode> {
    path.segments()
        .iter()
        .try_fold(schema, |node, segment| node.child(segment))
}

pub fn get_schema_for_path_mut<'a>(
    schema: &'a mut SchemaNode,
    path: &Path,
) -> Option<&'a mut SchemaNode> {
    let mut node = schema;
    for segment in path.segments() {
        node = node.child_mut(segment)?;
    }
    Some(node)
}

/// Whether any node strictly above `path` cascades extensibility downward.
pub fn inherits_recursive_extensible(schema: &SchemaNode, path: &Path) -> bool {
    let mut node = schema;
    for segment in path.segments() {
        if node.recursive_extensible() {
            return true;
        }
        match node.child(segment) {
            Some(next) => node = next,
            None => return false,
        }
    }
    false
}
