//! Type compatibility matrix
//!
//! Which canonical target types a source type may feed without an explicit
//! transformation. Narrowing `number` to `integer` is allowed.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::types::FieldType;

use FieldType::*;

/// Target types accepted from `source` without a transformation
pub fn allowed_targets(source: FieldType) -> &'static [FieldType] {
    match source {
        String => &[String, Number, Integer, Boolean, Date, Any],
        Number | Integer => &[Number, Integer, String, Any],
        Boolean => &[Boolean, String, Number, Integer, Any],
        Date => &[Date, String, Number, Any],
        Object => &[Object, String, Any],
        Array => &[Array, String, Any],
        Null => &[Any],
        Any => &FieldType::ALL,
    }
}

pub fn is_compatible(source: FieldType, target: FieldType) -> bool {
    allowed_targets(source).contains(&target)
}
