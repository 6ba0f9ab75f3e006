// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # picket-modbus
//!
//! A Modbus TCP/RTU polling south plugin for the picket plugin family.
//!
//! The plugin samples a declarative map of coils, discrete inputs, holding
//! registers, and input registers from one or more slaves, decodes them
//! into typed datapoints, and returns them as per-asset readings. Adjacent
//! register accesses are coalesced into bulk block reads ahead of each poll
//! cycle, and selected holding registers can accept setpoint writes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ModbusPlugin                          │
//! │          (SouthPlugin impl, FIFO-fair operations lock)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ModbusCore                           │
//! │      (configure / poll cycle / write dispatch / state)      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │  CacheManager  │ │   ModbusEntity   │ │    ModbusLink    │
//! │  (block reads) │ │  (entity codec)  │ │   (TCP / RTU)    │
//! └────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use picket_core::{ConfigCategory, SouthPlugin};
//! use picket_modbus::ModbusPlugin;
//!
//! let config = ConfigCategory::new("modbus")
//!     .with_item("protocol", "TCP")
//!     .with_item("address", "192.168.1.20")
//!     .with_item("port", "502")
//!     .with_item("map", r#"{"values": [
//!         {"name": "temperature", "register": 100, "scale": 0.1}
//!     ]}"#);
//!
//! let plugin = ModbusPlugin::init(&config)?;
//! let readings = plugin.poll().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod link;
pub mod map;
pub mod plugin;
pub mod poll;
pub mod types;

#[cfg(test)]
mod testlink;

pub use cache::{CacheManager, CACHE_THRESHOLD, MAX_MODBUS_BLOCK};
pub use config::{ControlPolicy, ModbusConfig, ReadMethod};
pub use entity::ModbusEntity;
pub use error::{FailureKind, TransportError, TransportResult, WriteError};
pub use link::{ModbusLink, Transport};
pub use map::{parse_map, MapItem, ParsedMap};
pub use plugin::ModbusPlugin;
pub use poll::{ModbusCore, ERR_THRESHOLD, MAX_READ_RETRIES, RECONNECT_LIMIT};
pub use types::{
    ItemFlags, LinkSettings, Parity, RegisterBinding, RegisterSpan, RtuSettings, SourceKind,
    TcpSettings,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
