// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration errors.

use thiserror::Error;

/// A fatal configuration failure.
///
/// Item-level problems inside a register map are logged and counted by the
/// plugin; only failures that make the plugin unusable surface as errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration item is missing.
    #[error("missing required configuration item: {0}")]
    MissingItem(&'static str),

    /// A configuration item has an unusable value.
    #[error("invalid value for {item}: {reason}")]
    InvalidValue {
        /// The offending item key.
        item: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    pub fn invalid(item: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            item,
            reason: reason.into(),
        }
    }
}
