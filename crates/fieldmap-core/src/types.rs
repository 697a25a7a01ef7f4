//! Canonical data model shared by the parsers, validators and pipeline
//!
//! Every supported input format is reduced to a tree of [`FieldNode`]s whose
//! types are drawn from the closed [`FieldType`] lattice. Connections and
//! transformation rules are plain values handed in by the caller for a single
//! validation or pipeline run.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::transformer::TransformKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical field type every format-specific type collapses into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Date,
    Null,
    Any,
}

impl FieldType {
    /// Every canonical type, in declaration order
    pub const ALL: [FieldType; 9] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Integer,
        FieldType::Boolean,
        FieldType::Object,
        FieldType::Array,
        FieldType::Date,
        FieldType::Null,
        FieldType::Any,
    ];

    /// Canonical token for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Date => "date",
            FieldType::Null => "null",
            FieldType::Any => "any",
        }
    }

    /// Look up a canonical token (exact, lowercase)
    pub fn from_canonical(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == token)
    }

    /// Whether nodes of this type may carry children
    pub fn is_container(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Array)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node in a canonical schema tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    /// Identifier derived from `path`
    pub id: String,
    /// Display name, unique among siblings
    pub name: String,
    /// Canonical address from the tree root
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Always false for sample-derived nodes
    pub required: bool,
    #[serde(default)]
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    /// Create a node without children; the id is derived from the path
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        field_type: FieldType,
        required: bool,
    ) -> Self {
        let path = path.into();
        Self {
            id: crate::normalizer::generate_id(&path),
            name: name.into(),
            path,
            field_type,
            required,
            children: Vec::new(),
        }
    }

    /// Attach children, returning the node
    pub fn with_children(mut self, children: Vec<FieldNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order traversal of this node and all descendants
    pub fn walk(&self) -> Vec<&FieldNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Leaf descendants (or the node itself when it has no children)
    pub fn leaves(&self) -> Vec<&FieldNode> {
        self.walk().into_iter().filter(|n| n.is_leaf()).collect()
    }
}

/// All leaves of a forest, in pre-order
pub fn flatten_leaves(nodes: &[FieldNode]) -> Vec<&FieldNode> {
    nodes.iter().flat_map(|n| n.leaves()).collect()
}

/// All nodes of a forest, in pre-order
pub fn flatten_nodes(nodes: &[FieldNode]) -> Vec<&FieldNode> {
    nodes.iter().flat_map(|n| n.walk()).collect()
}

/// Find a node anywhere in a forest by its path
pub fn find_by_path<'a>(nodes: &'a [FieldNode], path: &str) -> Option<&'a FieldNode> {
    flatten_nodes(nodes).into_iter().find(|n| n.path == path)
}

/// Total number of nodes in a forest
pub fn count_nodes(nodes: &[FieldNode]) -> usize {
    nodes.iter().map(|n| n.walk().len()).sum()
}

/// Transform attached to a connection; order is implied by declaration sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTransform {
    #[serde(rename = "type")]
    pub transform_type: String,
    #[serde(default)]
    pub config: Value,
}

impl ConnectionTransform {
    pub fn new(kind: TransformKind, config: Value) -> Self {
        Self {
            transform_type: kind.as_str().to_string(),
            config,
        }
    }

    /// Parsed transform kind, `None` for unknown type names
    pub fn kind(&self) -> Option<TransformKind> {
        TransformKind::parse(&self.transform_type)
    }
}

/// Proposed source-path to target-path edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(alias = "source", alias = "sourceField")]
    pub source_path: String,
    #[serde(alias = "target", alias = "targetField")]
    pub target_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<ConnectionTransform>,
}

impl Connection {
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            transformation: None,
        }
    }

    pub fn with_transformation(mut self, kind: TransformKind, config: Value) -> Self {
        self.transformation = Some(ConnectionTransform::new(kind, config));
        self
    }
}

/// One declared step in a transformation pipeline
///
/// `rule_type` is kept as the raw type name so that unknown kinds reach the
/// rule validator instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub source_fields: Vec<String>,
    pub target_field: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub order: u32,
}

impl TransformationRule {
    /// Parsed transform kind, `None` for unknown type names
    pub fn kind(&self) -> Option<TransformKind> {
        TransformKind::parse(&self.rule_type)
    }
}
