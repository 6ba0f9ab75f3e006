// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Plugin configuration.
//!
//! Assembles a [`ModbusConfig`] from the host's flat [`ConfigCategory`].
//! Every item except `protocol` has a default; a missing or unknown
//! `protocol` is fatal since the transport kind cannot be guessed.

use std::time::Duration;

use picket_core::{ConfigCategory, ConfigError};

use crate::types::{LinkSettings, Parity, RtuSettings, TcpSettings};

// =============================================================================
// ReadMethod
// =============================================================================

/// How register reads are batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMethod {
    /// Coalesce contiguous map ranges into bulk block reads.
    #[default]
    EfficientBlockRead,
    /// Read each map object individually.
    ObjectRead,
    /// Read one register per request.
    SingleRegisterRead,
}

impl ReadMethod {
    fn from_config(value: &str) -> Option<Self> {
        match value {
            "Efficient Block Read" => Some(Self::EfficientBlockRead),
            "Object Read" => Some(Self::ObjectRead),
            "Single Register Read" => Some(Self::SingleRegisterRead),
            _ => None,
        }
    }
}

// =============================================================================
// ControlPolicy
// =============================================================================

/// Which datapoints accept setpoint writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPolicy {
    /// Writes are disabled.
    #[default]
    None,
    /// Every read-map entity is addressable for write.
    UseRegisterMap,
    /// A dedicated control map defines the writable datapoints.
    UseControlMap,
}

impl ControlPolicy {
    fn from_config(value: &str) -> Option<Self> {
        match value {
            "None" => Some(Self::None),
            "Use Register Map" => Some(Self::UseRegisterMap),
            "Use Control Map" => Some(Self::UseControlMap),
            _ => None,
        }
    }
}

// =============================================================================
// ModbusConfig
// =============================================================================

/// The full plugin configuration, parsed and defaulted.
#[derive(Debug, Clone)]
pub struct ModbusConfig {
    /// Transport connection parameters.
    pub link: LinkSettings,
    /// Default slave for map entries without one.
    pub slave: u8,
    /// Default asset name for bindings without one.
    pub asset: String,
    /// Read batching strategy.
    pub read_method: ReadMethod,
    /// Write policy.
    pub control: ControlPolicy,
    /// The register map JSON document.
    pub map: String,
    /// The control map JSON document (dedicated policy only).
    pub controlmap: String,
}

impl ModbusConfig {
    /// Builds a configuration from a host category.
    pub fn from_category(config: &ConfigCategory) -> Result<Self, ConfigError> {
        let link = match config.get_value("protocol") {
            Some("TCP") => {
                let timeout = config.get_float("timeout").unwrap_or(0.5);
                LinkSettings::Tcp(TcpSettings {
                    address: config.get_string("address", "127.0.0.1"),
                    port: int_item(config, "port", 2222),
                    timeout: Duration::from_secs_f64(timeout.max(0.0)),
                })
            }
            Some("RTU") => {
                let parity = config
                    .get_value("parity")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(Parity::None);
                LinkSettings::Rtu(RtuSettings {
                    device: config.get_string("device", ""),
                    baud: int_item(config, "baud", 9600),
                    data_bits: int_item(config, "bits", 8),
                    stop_bits: int_item(config, "stopbits", 1),
                    parity,
                })
            }
            Some(other) => {
                return Err(ConfigError::invalid(
                    "protocol",
                    format!("must be TCP or RTU, not {other}"),
                ))
            }
            None => return Err(ConfigError::MissingItem("protocol")),
        };

        let slave = match config.get_int("slave") {
            Some(id) if (1..=247).contains(&id) => id as u8,
            Some(id) => {
                tracing::warn!(slave = id, "default slave out of range, using 1");
                1
            }
            None => 1,
        };

        let read_method = match config.get_value("readMethod") {
            Some(value) => ReadMethod::from_config(value).unwrap_or_else(|| {
                tracing::warn!(value, "unknown readMethod, using Efficient Block Read");
                ReadMethod::default()
            }),
            None => ReadMethod::default(),
        };

        let control = match config.get_value("control") {
            Some(value) => ControlPolicy::from_config(value).unwrap_or_else(|| {
                tracing::warn!(value, "unknown control policy, disabling writes");
                ControlPolicy::None
            }),
            None => ControlPolicy::None,
        };

        Ok(Self {
            link,
            slave,
            asset: config.get_string("asset", "modbus"),
            read_method,
            control,
            map: config.get_string("map", "{}"),
            controlmap: config.get_string("controlmap", "{}"),
        })
    }
}

fn int_item<T>(config: &ConfigCategory, key: &str, default: T) -> T
where
    T: TryFrom<i64> + Copy,
{
    config
        .get_int(key)
        .and_then(|value| T::try_from(value).ok())
        .unwrap_or(default)
}

// =============================================================================
// Tests
// =============================================================================
