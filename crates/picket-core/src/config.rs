// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Plain key/value configuration categories.
//!
//! The host framework parses its configuration documents and hands plugins a
//! flat category of string-typed items. Plugins look items up by key and
//! parse them into whatever type the item calls for.

use std::collections::BTreeMap;

// =============================================================================
// ConfigCategory
// =============================================================================

/// A named set of string-typed configuration items.
///
/// # Example
///
/// ```
/// use picket_core::ConfigCategory;
///
/// let config = ConfigCategory::new("modbus")
///     .with_item("protocol", "TCP")
///     .with_item("port", "502");
///
/// assert!(config.item_exists("protocol"));
/// assert_eq!(config.get_int("port"), Some(502));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigCategory {
    name: String,
    items: BTreeMap<String, String>,
}

impl ConfigCategory {
    /// Creates an empty category.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    /// The category name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an item, builder style.
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// Sets an item.
    pub fn set_item(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    /// Returns `true` if the item exists.
    pub fn item_exists(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Returns the raw string value of an item.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Returns the item as a string, or `default` when absent.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_value(key).unwrap_or(default).to_string()
    }

    /// Returns the item parsed as an integer, `None` when absent or unparsable.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_value(key)?.trim().parse().ok()
    }

    /// Returns the item parsed as a float, `None` when absent or unparsable.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get_value(key)?.trim().parse().ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
