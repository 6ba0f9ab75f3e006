// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pre-built configurations and register maps.

use picket_core::ConfigCategory;

/// Configuration fixtures.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A TCP configuration with the given register map.
    pub fn tcp(map: &str) -> ConfigCategory {
        ConfigCategory::new("modbus")
            .with_item("protocol", "TCP")
            .with_item("address", "127.0.0.1")
            .with_item("port", "2222")
            .with_item("timeout", "0.25")
            .with_item("map", map)
    }

    /// A TCP configuration with write access to the register map.
    pub fn tcp_with_register_control(map: &str) -> ConfigCategory {
        Self::tcp(map).with_item("control", "Use Register Map")
    }

    /// A TCP configuration with a dedicated control map.
    pub fn tcp_with_control_map(map: &str, controlmap: &str) -> ConfigCategory {
        Self::tcp(map)
            .with_item("control", "Use Control Map")
            .with_item("controlmap", controlmap)
    }
}

/// Register map fixtures.
pub struct MapFixtures;

impl MapFixtures {
    /// A single scaled temperature register on slave 1.
    pub fn scaled_temperature() -> &'static str {
        r#"{"values": [
            {"name": "temp", "slave": 1, "register": 100, "scale": 0.1, "offset": 0}
        ]}"#
    }

    /// Five contiguous holding registers, enough to materialise one block.
    pub fn contiguous_block() -> &'static str {
        r#"{"values": [
            {"name": "r0", "register": 10},
            {"name": "r1", "register": 11},
            {"name": "r2", "register": 12},
            {"name": "r3", "register": 13},
            {"name": "r4", "register": 14}
        ]}"#
    }

    /// Four contiguous holding registers, one short of the block threshold.
    pub fn sub_threshold_run() -> &'static str {
        r#"{"values": [
            {"name": "s0", "register": 20},
            {"name": "s1", "register": 21},
            {"name": "s2", "register": 22},
            {"name": "s3", "register": 23}
        ]}"#
    }

    /// A mixed map across two slaves, assets, and source kinds.
    pub fn two_slave_plant() -> &'static str {
        r#"{"values": [
            {"name": "temperature", "slave": 1, "assetName": "Booth1",
             "register": 0, "scale": 0.1, "offset": 0.0},
            {"name": "humidity", "register": 1},
            {"name": "power", "slave": 2, "assetName": "Feeder",
             "register": [40, 41], "type": "float", "swap": "words"},
            {"name": "running", "slave": 2, "assetName": "Feeder", "coil": 5},
            {"name": "door", "input": 7}
        ]}"#
    }

    /// A legacy-format map.
    pub fn legacy() -> &'static str {
        r#"{
            "coils": {"pump": 1},
            "registers": {"speed": 4},
            "inputRegisters": {"flow": 9}
        }"#
    }
}
