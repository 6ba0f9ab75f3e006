// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The host-facing plugin surface.
//!
//! [`ModbusPlugin`] wraps a [`ModbusCore`] behind one `tokio::sync::Mutex`.
//! The host may invoke `poll`, `write`, `reconfigure`, and `shutdown` from
//! arbitrary tasks; the mutex queues waiters in FIFO order, so no caller
//! can be starved and every operation observes a complete configuration.

use async_trait::async_trait;
use tokio::sync::Mutex;

use picket_core::{ConfigCategory, ConfigError, PluginInfo, Reading, SouthPlugin};

use crate::link::ModbusLink;
use crate::poll::ModbusCore;

// =============================================================================
// ModbusPlugin
// =============================================================================

/// The Modbus south plugin.
pub struct ModbusPlugin {
    core: Mutex<ModbusCore>,
}

impl ModbusPlugin {
    /// Plugin metadata reported to the host loader.
    pub const INFO: PluginInfo = PluginInfo {
        name: "modbus",
        version: env!("CARGO_PKG_VERSION"),
        supports_control: true,
    };

    /// Creates a plugin handle from an initial configuration.
    pub fn init(config: &ConfigCategory) -> Result<Self, ConfigError> {
        let mut core = ModbusCore::new();
        core.configure(config)?;
        Ok(Self {
            core: Mutex::new(core),
        })
    }

    /// Creates a plugin handle with a custom transport link installed,
    /// e.g. a simulated device.
    pub fn init_with_link(
        config: &ConfigCategory,
        link: Box<dyn ModbusLink>,
    ) -> Result<Self, ConfigError> {
        let plugin = Self::init(config)?;
        plugin
            .core
            .try_lock()
            .expect("freshly created core is uncontended")
            .install_link(link);
        Ok(plugin)
    }
}

#[async_trait]
impl SouthPlugin for ModbusPlugin {
    fn info(&self) -> PluginInfo {
        Self::INFO.clone()
    }

    async fn poll(&self) -> Option<Vec<Reading>> {
        self.core.lock().await.poll().await
    }

    async fn write(&self, name: &str, value: &str) -> bool {
        self.core.lock().await.write(name, value).await
    }

    async fn reconfigure(&self, config: &ConfigCategory) -> Result<(), ConfigError> {
        self.core.lock().await.configure(config)
    }

    async fn shutdown(&self) {
        self.core.lock().await.shutdown().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
