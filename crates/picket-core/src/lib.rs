// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # picket-core
//!
//! Core abstractions shared by picket south plugins and the host
//! data-acquisition framework that loads them.
//!
//! This crate provides:
//!
//! - **Types**: the value objects handed to the host — [`Value`],
//!   [`Datapoint`], and [`Reading`]
//! - **Config**: [`ConfigCategory`], the plain key/value configuration
//!   contract the host's category parser yields
//! - **Plugin**: the [`SouthPlugin`] trait with the five host-facing entry
//!   points, plus [`PluginInfo`] metadata
//! - **Error**: [`ConfigError`] for fatal configuration failures
//!
//! ## Example
//!
//! ```rust
//! use picket_core::{Datapoint, Reading, Value};
//!
//! let mut reading = Reading::new("pump-3", Datapoint::new("rpm", Value::Float(1480.0)));
//! reading.add_datapoint(Datapoint::new("running", Value::Integer(1)));
//! assert_eq!(reading.asset_name(), "pump-3");
//! assert_eq!(reading.datapoints().len(), 2);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod plugin;
pub mod types;

pub use config::ConfigCategory;
pub use error::ConfigError;
pub use plugin::{PluginInfo, SouthPlugin};
pub use types::{Datapoint, Reading, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
