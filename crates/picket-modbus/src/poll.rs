// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The poll orchestrator.
//!
//! [`ModbusCore`] owns all engine state: the connection settings, the
//! transport link, the block cache, the entity map keyed by slave, and the
//! write map. The plugin layer serialises access, so one core services one
//! operation at a time.
//!
//! A poll cycle connects if needed, refreshes the block cache, then walks
//! the map in slave order reading every entity. Failures are classified and
//! recovered per entity: the connection is re-established and the read
//! retried, bounded by [`MAX_READ_RETRIES`]. Soft failures accumulate
//! toward [`ERR_THRESHOLD`], which forces an extra reconnect; more than
//! [`RECONNECT_LIMIT`] forced reconnects abort the cycle with no readings
//! at all, telling the host the device is broken rather than merely quiet.

use std::collections::{BTreeMap, HashMap};

use picket_core::{ConfigError, Datapoint, Reading};

use crate::cache::CacheManager;
use crate::config::{ControlPolicy, ModbusConfig, ReadMethod};
use crate::entity::ModbusEntity;
use crate::error::FailureKind;
use crate::link::{ModbusLink, Transport};
use crate::map::parse_map;

/// Per-entity bound on read retries within one cycle.
pub const MAX_READ_RETRIES: u32 = 10;

/// Soft-error count that forces a reconnect.
pub const ERR_THRESHOLD: u32 = 2;

/// Forced reconnects allowed within one cycle before it aborts.
pub const RECONNECT_LIMIT: u32 = 2;

// =============================================================================
// ModbusCore
// =============================================================================

/// The Modbus polling engine.
pub struct ModbusCore {
    config: Option<ModbusConfig>,
    link: Option<Box<dyn ModbusLink>>,
    cache: CacheManager,
    map: BTreeMap<u8, Vec<ModbusEntity>>,
    write_map: HashMap<String, ModbusEntity>,
}

impl ModbusCore {
    /// Creates an unconfigured core.
    pub fn new() -> Self {
        Self {
            config: None,
            link: None,
            cache: CacheManager::new(),
            map: BTreeMap::new(),
            write_map: HashMap::new(),
        }
    }

    /// Installs a custom transport link.
    ///
    /// The core builds a [`Transport`] from its settings on first use;
    /// installing a link beforehand substitutes a simulated or
    /// pre-established one instead.
    pub fn install_link(&mut self, link: Box<dyn ModbusLink>) {
        self.link = Some(link);
    }

    /// Applies a configuration, tearing down and rebuilding the entity map
    /// and write map.
    ///
    /// The transport is recreated only when the connection-identifying
    /// parameters changed; a timeout-only change is applied in place.
    pub fn configure(&mut self, category: &picket_core::ConfigCategory) -> Result<(), ConfigError> {
        let config = ModbusConfig::from_category(category)?;

        let same_endpoint = self
            .config
            .as_ref()
            .is_some_and(|old| old.link.same_endpoint(&config.link));
        if same_endpoint {
            if let Some(link) = self.link.as_mut() {
                link.apply_settings(&config.link);
            }
        } else {
            self.link = None;
        }

        self.map.clear();
        self.write_map.clear();
        self.cache = CacheManager::new();

        let parsed = parse_map(&config.map, config.slave)?;
        for item in parsed.items {
            for addr in item.binding.span.addresses() {
                self.cache.register_item(item.slave, item.kind, addr);
            }
            let entity = ModbusEntity::new(item.slave, item.kind, item.binding);
            if config.control == ControlPolicy::UseRegisterMap {
                self.write_map
                    .insert(entity.name().to_string(), entity.clone());
            }
            self.map.entry(item.slave).or_default().push(entity);
        }

        if config.control == ControlPolicy::UseControlMap {
            let control = parse_map(&config.controlmap, config.slave)?;
            for item in control.items {
                let entity = ModbusEntity::new(item.slave, item.kind, item.binding);
                self.write_map.insert(entity.name().to_string(), entity);
            }
        }

        if config.read_method == ReadMethod::EfficientBlockRead {
            tracing::info!("creating Modbus block caches");
            self.cache.seal();
        }

        self.config = Some(config);
        Ok(())
    }

    /// Runs one poll cycle.
    ///
    /// Returns `Some(readings)` on success (empty when the device was
    /// unreachable), or `None` after persistent failure within the cycle.
    pub async fn poll(&mut self) -> Option<Vec<Reading>> {
        let mut readings: Vec<Reading> = Vec::new();
        let mut errcount: u32 = 0;
        let mut reconnects: u32 = 0;

        let Some(config) = self.config.as_ref() else {
            tracing::error!("poll invoked before configuration");
            return Some(readings);
        };
        let default_asset = config.asset.clone();

        if self.link.is_none() {
            self.link = Some(Box::new(Transport::new(config.link.clone())));
        }
        let Some(link) = self.link.as_mut() else {
            return Some(readings);
        };

        if !link.is_connected() {
            if let Err(e) = link.connect().await {
                tracing::error!(error = %e, "failed to connect to Modbus device");
                return Some(readings);
            }
        }

        self.cache.refresh(&mut **link).await;

        for (&slave, entities) in &self.map {
            link.select_slave(slave);
            for entity in entities {
                let mut retries: u32 = 0;
                loop {
                    if retries > MAX_READ_RETRIES {
                        tracing::error!(
                            datapoint = entity.name(),
                            "excessive retries reading the Modbus device, aborting cycle"
                        );
                        return Some(readings);
                    }

                    match entity.read(&mut **link, &self.cache).await {
                        Ok(datapoint) => {
                            errcount = 0;
                            add_value(&mut readings, entity.asset_name(), &default_asset, datapoint);
                            break;
                        }
                        Err(e) => {
                            match e.kind() {
                                FailureKind::ConnectionLost => {
                                    tracing::warn!(
                                        error = %e,
                                        "Modbus connection lost, re-establishing the connection"
                                    );
                                    errcount = 0;
                                }
                                FailureKind::InvalidRequest
                                | FailureKind::ConnectionReset
                                | FailureKind::BadData => {
                                    link.close().await;
                                    tracing::warn!(
                                        error = %e,
                                        "Modbus failure, closing and re-establishing the connection"
                                    );
                                    errcount = 0;
                                }
                                FailureKind::Timeout | FailureKind::Other => {
                                    tracing::warn!(error = %e, errcount, "Modbus read failed");
                                    link.close().await;
                                    errcount += 1;
                                }
                            }

                            if let Err(ce) = link.connect().await {
                                tracing::error!(error = %ce, "failed to connect to Modbus device");
                                return Some(readings);
                            }
                            link.select_slave(slave);

                            if errcount > ERR_THRESHOLD {
                                reconnects += 1;
                                if reconnects > RECONNECT_LIMIT {
                                    tracing::error!(
                                        "persistent failure of Modbus reads, aborting reading cycle"
                                    );
                                    return None;
                                }
                                tracing::warn!(
                                    reconnects,
                                    "excessive Modbus failures, closing and re-establishing the connection"
                                );
                                link.close().await;
                                if let Err(ce) = link.connect().await {
                                    tracing::error!(error = %ce, "failed to connect to Modbus device");
                                    return Some(readings);
                                }
                                link.select_slave(slave);
                                errcount = 0;
                            }

                            retries += 1;
                        }
                    }
                }
            }
        }

        Some(readings)
    }

    /// Executes a setpoint write against the write map.
    pub async fn write(&mut self, name: &str, value: &str) -> bool {
        let control = self
            .config
            .as_ref()
            .map(|config| config.control)
            .unwrap_or(ControlPolicy::None);
        if control == ControlPolicy::None {
            tracing::warn!(name, "write request rejected, control is disabled");
            return false;
        }

        let Some(entity) = self.write_map.get(name) else {
            tracing::warn!(name, "write request for unknown datapoint");
            return false;
        };

        if self.link.is_none() {
            let Some(config) = self.config.as_ref() else {
                return false;
            };
            self.link = Some(Box::new(Transport::new(config.link.clone())));
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };

        if !link.is_connected() {
            if let Err(e) = link.connect().await {
                tracing::error!(error = %e, "failed to connect to Modbus device");
                return false;
            }
        }

        link.select_slave(entity.slave());
        match entity.write(&mut **link, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(name, error = %e, "Modbus write failed");
                false
            }
        }
    }

    /// Closes the transport link.
    pub async fn shutdown(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.close().await;
        }
    }
}

impl Default for ModbusCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends a datapoint to the reading for its asset, creating the reading
/// on the asset's first datapoint.
fn add_value(
    readings: &mut Vec<Reading>,
    asset_name: &str,
    default_asset: &str,
    datapoint: Datapoint,
) {
    let asset = if asset_name.is_empty() {
        default_asset
    } else {
        asset_name
    };

    match readings
        .iter_mut()
        .find(|reading| reading.asset_name() == asset)
    {
        Some(reading) => reading.add_datapoint(datapoint),
        None => readings.push(Reading::new(asset, datapoint)),
    }
}

// =============================================================================
// Tests
// =============================================================================
