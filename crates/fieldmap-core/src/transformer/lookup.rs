//! Lookup-table collaborator
//!
//! The `lookup` transform asks an external keyed store for the value mapped
//! to its input under a named table. Implementations live outside the core;
//! [`InMemoryLookupStore`] is provided for tests and local tooling.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::functions::display_string;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Failures reported by a lookup store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    /// The store could not be reached or answered with an error
    #[error("lookup store unavailable: {message}")]
    Unavailable { message: String },

    /// Store content could not be interpreted
    #[error("malformed lookup data: {message}")]
    Malformed { message: String },
}

/// Keyed value store consulted by `lookup` rules
#[async_trait]
pub trait LookupStore: Send + Sync {
    /// Value mapped to `key` in `table`, `None` when there is no entry
    async fn lookup(&self, table: &str, key: &Value) -> Result<Option<Value>, LookupError>;
}

/// Store key for a lookup input; scalars match their text form
pub fn lookup_key(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => display_string(other),
    }
}

/// Lookup tables held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryLookupStore {
    tables: HashMap<String, HashMap<String, Value>>,
}

impl InMemoryLookupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any table with the same name
    pub fn with_table<K, I>(mut self, name: impl Into<String>, entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.insert_table(name, entries);
        self
    }

    pub fn insert_table<K, I>(&mut self, name: impl Into<String>, entries: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let table = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.tables.insert(name.into(), table);
    }

    /// Build from `{"table": {"key": value, ...}, ...}`
    pub fn from_json(document: &Value) -> Result<Self, LookupError> {
        let Value::Object(tables) = document else {
            return Err(LookupError::Malformed {
                message: "expected an object of tables".to_string(),
            });
        };
        let mut store = Self::new();
        for (name, entries) in tables {
            let Value::Object(entries) = entries else {
                return Err(LookupError::Malformed {
                    message: format!("table '{}' must be an object of entries", name),
                });
            };
            store.insert_table(name.clone(), entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(store)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl LookupStore for InMemoryLookupStore {
    async fn lookup(&self, table: &str, key: &Value) -> Result<Option<Value>, LookupError> {
        Ok(self
            .tables
            .get(table)
            .and_then(|entries| entries.get(&lookup_key(key)))
            .cloned())
    }
}
