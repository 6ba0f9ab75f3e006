// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mock implementations for testing picket components in isolation.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy to set up error injection

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use picket_modbus::{ModbusLink, SourceKind, TransportError, TransportResult};

// =============================================================================
// Simulated Modbus Device
// =============================================================================

/// A request observed by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    /// A read (kind, slave, start, count).
    Read(SourceKind, u8, u16, u16),
    /// A single-coil write (slave, addr, value).
    WriteBit(u8, u16, bool),
    /// A single-register write (slave, addr, value).
    WriteRegister(u8, u16, u16),
    /// A multi-register write (slave, start, values).
    WriteRegisters(u8, u16, Vec<u16>),
}

#[derive(Debug, Default)]
struct DeviceBanks {
    coils: HashMap<(u8, u16), bool>,
    discrete: HashMap<(u8, u16), bool>,
    holding: HashMap<(u8, u16), u16>,
    input: HashMap<(u8, u16), u16>,
}

/// A configurable simulated Modbus device.
///
/// The device is a cheap clone over shared state: hand one clone to the
/// plugin and keep another to script failures and inspect traffic.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    banks: Arc<Mutex<DeviceBanks>>,
    requests: Arc<Mutex<Vec<DeviceRequest>>>,
    selected: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    fail_connection: Arc<AtomicBool>,
    failing_reads: Arc<AtomicUsize>,
    fail_error_kind: Arc<Mutex<Option<io::ErrorKind>>>,
    connect_count: Arc<AtomicU64>,
}

impl SimulatedDevice {
    /// Creates a device with empty banks (reads return zeros).
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Bank setup
    // =========================================================================

    /// Sets a coil.
    pub fn set_coil(&self, slave: u8, addr: u16, value: bool) {
        self.banks.lock().unwrap().coils.insert((slave, addr), value);
    }

    /// Sets a discrete input.
    pub fn set_discrete(&self, slave: u8, addr: u16, value: bool) {
        self.banks
            .lock()
            .unwrap()
            .discrete
            .insert((slave, addr), value);
    }

    /// Sets a holding register.
    pub fn set_holding(&self, slave: u8, addr: u16, value: u16) {
        self.banks
            .lock()
            .unwrap()
            .holding
            .insert((slave, addr), value);
    }

    /// Reads back a holding register.
    pub fn holding(&self, slave: u8, addr: u16) -> Option<u16> {
        self.banks.lock().unwrap().holding.get(&(slave, addr)).copied()
    }

    /// Reads back a coil.
    pub fn coil(&self, slave: u8, addr: u16) -> Option<bool> {
        self.banks.lock().unwrap().coils.get(&(slave, addr)).copied()
    }

    /// Sets an input register.
    pub fn set_input(&self, slave: u8, addr: u16, value: u16) {
        self.banks.lock().unwrap().input.insert((slave, addr), value);
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Makes every connection attempt fail.
    pub fn fail_connection(&self, fail: bool) {
        self.fail_connection.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` reads with the given I/O error kind.
    pub fn fail_reads(&self, count: usize, kind: io::ErrorKind) {
        *self.fail_error_kind.lock().unwrap() = Some(kind);
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Every request the device observed, in order.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The writes the device observed, in order.
    pub fn writes(&self) -> Vec<DeviceRequest> {
        self.requests()
            .into_iter()
            .filter(|request| !matches!(request, DeviceRequest::Read(..)))
            .collect()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    fn selected(&self) -> u8 {
        self.selected.load(Ordering::SeqCst) as u8
    }

    fn record(&self, request: DeviceRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn maybe_fail(&self) -> TransportResult<()> {
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            let kind = self
                .fail_error_kind
                .lock()
                .unwrap()
                .unwrap_or(io::ErrorKind::Other);
            return Err(TransportError::Io(io::Error::new(kind, "simulated failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ModbusLink for SimulatedDevice {
    async fn connect(&mut self) -> TransportResult<()> {
        if self.fail_connection.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                endpoint: "simulated".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn select_slave(&mut self, slave: u8) {
        self.selected.store(u64::from(slave), Ordering::SeqCst);
    }

    async fn read_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let slave = self.selected();
        self.record(DeviceRequest::Read(SourceKind::Coil, slave, addr, count));
        self.maybe_fail()?;
        let banks = self.banks.lock().unwrap();
        Ok((addr..addr + count)
            .map(|a| banks.coils.get(&(slave, a)).copied().unwrap_or(false))
            .collect())
    }

    async fn read_input_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let slave = self.selected();
        self.record(DeviceRequest::Read(
            SourceKind::DiscreteInput,
            slave,
            addr,
            count,
        ));
        self.maybe_fail()?;
        let banks = self.banks.lock().unwrap();
        Ok((addr..addr + count)
            .map(|a| banks.discrete.get(&(slave, a)).copied().unwrap_or(false))
            .collect())
    }

    async fn read_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let slave = self.selected();
        self.record(DeviceRequest::Read(
            SourceKind::HoldingRegister,
            slave,
            addr,
            count,
        ));
        self.maybe_fail()?;
        let banks = self.banks.lock().unwrap();
        Ok((addr..addr + count)
            .map(|a| banks.holding.get(&(slave, a)).copied().unwrap_or(0))
            .collect())
    }

    async fn read_input_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let slave = self.selected();
        self.record(DeviceRequest::Read(
            SourceKind::InputRegister,
            slave,
            addr,
            count,
        ));
        self.maybe_fail()?;
        let banks = self.banks.lock().unwrap();
        Ok((addr..addr + count)
            .map(|a| banks.input.get(&(slave, a)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_bit(&mut self, addr: u16, value: bool) -> TransportResult<()> {
        let slave = self.selected();
        self.banks.lock().unwrap().coils.insert((slave, addr), value);
        self.record(DeviceRequest::WriteBit(slave, addr, value));
        Ok(())
    }

    async fn write_register(&mut self, addr: u16, value: u16) -> TransportResult<()> {
        let slave = self.selected();
        self.banks
            .lock()
            .unwrap()
            .holding
            .insert((slave, addr), value);
        self.record(DeviceRequest::WriteRegister(slave, addr, value));
        Ok(())
    }

    async fn write_registers(&mut self, addr: u16, values: &[u16]) -> TransportResult<()> {
        let slave = self.selected();
        {
            let mut banks = self.banks.lock().unwrap();
            for (i, &value) in values.iter().enumerate() {
                banks.holding.insert((slave, addr + i as u16), value);
            }
        }
        self.record(DeviceRequest::WriteRegisters(slave, addr, values.to_vec()));
        Ok(())
    }
}
