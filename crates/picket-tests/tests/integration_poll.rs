// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Poll Integration Tests
//!
//! Full configure → poll cycles against a simulated device:
//!
//! - decode of scalar, composite, and bit datapoints
//! - grouping of datapoints into per-asset readings
//! - recovery behavior: empty, partial, and null cycles

use std::io;

use picket_core::{Reading, SouthPlugin, Value};
use picket_modbus::{ModbusPlugin, SourceKind};

use picket_tests::common::{init_test_logging, ConfigFixtures, DeviceRequest, MapFixtures, SimulatedDevice};

fn value_of(readings: &[Reading], asset: &str, name: &str) -> Option<Value> {
    readings
        .iter()
        .find(|reading| reading.asset_name() == asset)?
        .datapoint(name)
        .map(|dp| dp.value)
}

// =============================================================================
// Decode Tests
// =============================================================================

#[tokio::test]
async fn test_poll_single_scaled_register() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.set_holding(1, 100, 234);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::scaled_temperature()),
        Box::new(device),
    )
    .unwrap();

    let readings = plugin.poll().await.expect("poll should succeed");
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].asset_name(), "modbus");
    assert_eq!(value_of(&readings, "modbus", "temp"), Some(Value::Float(23.4)));
}

#[tokio::test]
async fn test_poll_mixed_plant_groups_by_asset() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.set_holding(1, 0, 215); // temperature 21.5
    device.set_holding(1, 1, 60); // humidity
    device.set_holding(2, 40, 0x4048); // power low word
    device.set_holding(2, 41, 0xF5C3); // power high word
    device.set_coil(2, 5, true);
    device.set_discrete(1, 7, false);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::two_slave_plant()),
        Box::new(device),
    )
    .unwrap();

    let readings = plugin.poll().await.expect("poll should succeed");

    // Three assets: Booth1, Feeder, and the default.
    assert_eq!(readings.len(), 3);
    assert_eq!(
        value_of(&readings, "Booth1", "temperature"),
        Some(Value::Float(21.5))
    );
    assert_eq!(
        value_of(&readings, "modbus", "humidity"),
        Some(Value::Float(60.0))
    );
    assert_eq!(value_of(&readings, "modbus", "door"), Some(Value::Integer(0)));
    assert_eq!(
        value_of(&readings, "Feeder", "running"),
        Some(Value::Integer(1))
    );

    // 0xF5C34048 word-swapped is 0x4048F5C3 = 3.1400001 as binary32.
    let power = value_of(&readings, "Feeder", "power").unwrap();
    assert!((power.as_f64() - 3.14).abs() < 1e-4);
}

#[tokio::test]
async fn test_poll_legacy_map() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.set_coil(1, 1, true);
    device.set_holding(1, 4, 1450);
    device.set_input(1, 9, 88);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::legacy()),
        Box::new(device),
    )
    .unwrap();

    let readings = plugin.poll().await.expect("poll should succeed");
    assert_eq!(readings.len(), 1);
    assert_eq!(value_of(&readings, "modbus", "pump"), Some(Value::Integer(1)));
    assert_eq!(
        value_of(&readings, "modbus", "speed"),
        Some(Value::Float(1450.0))
    );
    assert_eq!(value_of(&readings, "modbus", "flow"), Some(Value::Float(88.0)));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[tokio::test]
async fn test_unreachable_device_yields_empty_readings() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.fail_connection(true);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::scaled_temperature()),
        Box::new(device.clone()),
    )
    .unwrap();

    let readings = plugin.poll().await.expect("cycle completes without data");
    assert!(readings.is_empty());

    // The device comes back; the next cycle reads normally.
    device.fail_connection(false);
    device.set_holding(1, 100, 100);
    let readings = plugin.poll().await.unwrap();
    assert_eq!(value_of(&readings, "modbus", "temp"), Some(Value::Float(10.0)));
}

#[tokio::test]
async fn test_persistent_failure_returns_null() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.fail_reads(usize::MAX, io::ErrorKind::Other);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::scaled_temperature()),
        Box::new(device),
    )
    .unwrap();

    assert!(plugin.poll().await.is_none());
}

#[tokio::test]
async fn test_transient_failure_recovers_within_the_cycle() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.set_holding(1, 100, 55);
    device.fail_reads(1, io::ErrorKind::ConnectionReset);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::scaled_temperature()),
        Box::new(device.clone()),
    )
    .unwrap();

    let readings = plugin.poll().await.expect("cycle recovers");
    assert_eq!(value_of(&readings, "modbus", "temp"), Some(Value::Float(5.5)));
    // The reset forced one reconnect after the initial connect.
    assert_eq!(device.connect_count(), 2);
}

// =============================================================================
// Reconfigure Tests
// =============================================================================

#[tokio::test]
async fn test_reconfigure_swaps_the_map_between_polls() {
    init_test_logging();

    let device = SimulatedDevice::new();
    device.set_holding(1, 100, 10);
    device.set_input(1, 3, 30);

    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(MapFixtures::scaled_temperature()),
        Box::new(device),
    )
    .unwrap();

    let readings = plugin.poll().await.unwrap();
    assert!(value_of(&readings, "modbus", "temp").is_some());

    let updated =
        ConfigFixtures::tcp(r#"{"values": [{"name": "level", "inputRegister": 3}]}"#);
    plugin.reconfigure(&updated).await.unwrap();

    let readings = plugin.poll().await.unwrap();
    assert!(value_of(&readings, "modbus", "temp").is_none());
    assert_eq!(value_of(&readings, "modbus", "level"), Some(Value::Float(30.0)));
}

// =============================================================================
// Request Shape Tests
// =============================================================================

#[tokio::test]
async fn test_bit_reads_use_their_own_function_codes() {
    init_test_logging();

    let device = SimulatedDevice::new();
    let plugin = ModbusPlugin::init_with_link(
        &ConfigFixtures::tcp(
            r#"{"values": [{"name": "c", "coil": 1}, {"name": "d", "input": 2}]}"#,
        ),
        Box::new(device.clone()),
    )
    .unwrap();

    plugin.poll().await.unwrap();
    assert_eq!(
        device.requests(),
        vec![
            DeviceRequest::Read(SourceKind::Coil, 1, 1, 1),
            DeviceRequest::Read(SourceKind::DiscreteInput, 1, 2, 1),
        ]
    );
}
