//! Mapping validation over two field trees
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::compatibility::is_compatible;
use super::{ValidationError, ValidationResult};
use crate::types::{flatten_leaves, flatten_nodes, Connection, FieldNode, FieldType};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Check `connections` between `source` and `target` trees
///
/// Two passes, both run to completion:
/// 1. every required target leaf must be the target of some connection;
/// 2. every connection's output type (after its transformation, if any) must
///    be accepted by its target field.
///
/// Connections naming a path that exists in neither tree are ignored by the
/// type check.
#[instrument(skip_all, fields(connections = connections.len()))]
pub fn validate_mapping(
    source: &[FieldNode],
    target: &[FieldNode],
    connections: &[Connection],
) -> ValidationResult {
    let mut errors = Vec::new();

    let mapped: HashSet<&str> = connections.iter().map(|c| c.target_path.as_str()).collect();
    for leaf in flatten_leaves(target) {
        if leaf.required && !mapped.contains(leaf.path.as_str()) {
            errors.push(ValidationError::missing_required(&leaf.path));
        }
    }

    let source_types = type_index(source);
    let target_types = type_index(target);
    for connection in connections {
        let (Some(&source_type), Some(&target_type)) = (
            source_types.get(connection.source_path.as_str()),
            target_types.get(connection.target_path.as_str()),
        ) else {
            debug!(
                source = %connection.source_path,
                target = %connection.target_path,
                "connection endpoint not found, skipping type check"
            );
            continue;
        };

        let (output_type, via) = match &connection.transformation {
            None => (source_type, None),
            Some(transform) => match transform.kind() {
                Some(kind) => (kind.output_type(source_type, &transform.config), Some(kind)),
                None => {
                    debug!(kind = %transform.transform_type, "unknown transformation, skipping type check");
                    continue;
                }
            },
        };

        if !is_compatible(output_type, target_type) {
            let message = match via {
                None => format!(
                    "Type mismatch: '{}' ({}) cannot be mapped to '{}' ({}) without a transformation",
                    connection.source_path, source_type, connection.target_path, target_type
                ),
                Some(kind) => format!(
                    "Type mismatch: '{}' produces {} after {} but '{}' expects {}",
                    connection.source_path, output_type, kind, connection.target_path, target_type
                ),
            };
            errors.push(ValidationError::type_mismatch(
                &connection.source_path,
                &connection.target_path,
                message,
            ));
        }
    }

    let result = ValidationResult::from_errors(errors);
    debug!(valid = result.valid, errors = result.error_count, "mapping validated");
    result
}

fn type_index(nodes: &[FieldNode]) -> HashMap<&str, FieldType> {
    flatten_nodes(nodes)
        .into_iter()
        .map(|n| (n.path.as_str(), n.field_type))
        .collect()
}
