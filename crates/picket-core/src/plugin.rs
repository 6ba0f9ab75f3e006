// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The south plugin contract.
//!
//! A south plugin samples data from a field device and returns it to the
//! host as [`Reading`]s. The host may call any entry point from any thread;
//! implementations serialise the operations internally.

use async_trait::async_trait;

use crate::config::ConfigCategory;
use crate::error::ConfigError;
use crate::types::Reading;

// =============================================================================
// PluginInfo
// =============================================================================

/// Static plugin metadata reported to the host loader.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: &'static str,
    /// Plugin version.
    pub version: &'static str,
    /// Whether the plugin accepts setpoint control writes.
    pub supports_control: bool,
}

// =============================================================================
// SouthPlugin
// =============================================================================

/// The entry points a south plugin exposes to its loader.
///
/// Construction (`init`) is plugin-specific and returns the handle the host
/// passes back into every call here.
///
/// # Concurrency
///
/// `poll`, `write`, `reconfigure`, and `shutdown` may be invoked
/// concurrently from arbitrary threads. Implementations must serialise them
/// on a single fair lock; `shutdown` waits for any in-flight operation.
#[async_trait]
pub trait SouthPlugin: Send + Sync {
    /// Returns the plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Called by the host once after `init`. Polled plugins have nothing to
    /// start, so the default is a no-op.
    async fn start(&self) {}

    /// Takes one set of readings from the device.
    ///
    /// Returns `Some(readings)` on success (possibly empty when the device
    /// is unreachable), or `None` when the device failed persistently within
    /// the cycle, letting the host distinguish "broken" from "no data yet".
    async fn poll(&self) -> Option<Vec<Reading>>;

    /// Writes a setpoint value to the named datapoint.
    ///
    /// Returns `true` when the write was delivered to the device.
    async fn write(&self, name: &str, value: &str) -> bool;

    /// Applies a new configuration, replacing the previous one atomically
    /// with respect to concurrent polls.
    async fn reconfigure(&self, config: &ConfigCategory) -> Result<(), ConfigError>;

    /// Releases the device connection and any held resources.
    async fn shutdown(&self);
}
