// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! A scripted in-memory [`ModbusLink`] for unit tests.
//!
//! The link is a cheap clone over shared state, so a test can hand one
//! clone to the engine and keep another to script failures and inspect the
//! traffic afterwards.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::link::ModbusLink;
use crate::types::SourceKind;

/// A write delivered to the mock device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Single coil write (slave, addr, value).
    Bit(u8, u16, bool),
    /// Single register write (slave, addr, value).
    Register(u8, u16, u16),
    /// Multi-register write (slave, start, values).
    Registers(u8, u16, Vec<u16>),
}

#[derive(Debug, Default)]
struct MockState {
    coils: HashMap<(u8, u16), bool>,
    discrete: HashMap<(u8, u16), bool>,
    holding: HashMap<(u8, u16), u16>,
    input: HashMap<(u8, u16), u16>,
    selected: u8,
    connected: bool,
    fail_connect: bool,
    skip_before_fail: usize,
    fail_reads: usize,
    fail_kind: Option<io::ErrorKind>,
    truncate: Option<usize>,
    read_log: Vec<(SourceKind, u16, u16)>,
    writes: Vec<WriteOp>,
    connect_count: usize,
}

impl MockState {
    fn take_failure(&mut self) -> Option<TransportError> {
        if self.skip_before_fail > 0 {
            self.skip_before_fail -= 1;
            return None;
        }
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            let kind = self.fail_kind.unwrap_or(io::ErrorKind::Other);
            return Some(TransportError::Io(io::Error::new(kind, "injected failure")));
        }
        None
    }

    fn finish<T>(&self, mut values: Vec<T>) -> Vec<T> {
        if let Some(len) = self.truncate {
            values.truncate(len);
        }
        values
    }
}

/// In-memory Modbus device with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Creates a mock with all banks empty (reads return zeros).
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Sets a coil value.
    pub fn set_coil(&self, slave: u8, addr: u16, value: bool) {
        self.lock().coils.insert((slave, addr), value);
    }

    /// Sets a discrete input value.
    pub fn set_discrete(&self, slave: u8, addr: u16, value: bool) {
        self.lock().discrete.insert((slave, addr), value);
    }

    /// Sets a holding register value.
    pub fn set_holding(&self, slave: u8, addr: u16, value: u16) {
        self.lock().holding.insert((slave, addr), value);
    }

    /// Reads back a holding register.
    pub fn holding(&self, slave: u8, addr: u16) -> Option<u16> {
        self.lock().holding.get(&(slave, addr)).copied()
    }

    /// Sets an input register value.
    pub fn set_input(&self, slave: u8, addr: u16, value: u16) {
        self.lock().input.insert((slave, addr), value);
    }

    /// Makes every `connect` fail.
    pub fn refuse_connections(&self) {
        self.lock().fail_connect = true;
    }

    /// Fails the next `count` reads with the given I/O error kind.
    pub fn fail_reads(&self, count: usize, kind: io::ErrorKind) {
        let mut state = self.lock();
        state.skip_before_fail = 0;
        state.fail_reads = count;
        state.fail_kind = Some(kind);
    }

    /// Lets `skip` reads succeed, then fails the next `count`.
    pub fn fail_reads_after(&self, skip: usize, count: usize, kind: io::ErrorKind) {
        let mut state = self.lock();
        state.skip_before_fail = skip;
        state.fail_reads = count;
        state.fail_kind = Some(kind);
    }

    /// Truncates every read response to at most `len` elements.
    pub fn truncate_reads(&self, len: usize) {
        self.lock().truncate = Some(len);
    }

    /// The (kind, addr, count) of every read issued.
    pub fn read_log(&self) -> Vec<(SourceKind, u16, u16)> {
        self.lock().read_log.clone()
    }

    /// Every write delivered, in order.
    pub fn writes(&self) -> Vec<WriteOp> {
        self.lock().writes.clone()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }
}

#[async_trait]
impl ModbusLink for MockLink {
    async fn connect(&mut self) -> TransportResult<()> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(TransportError::ConnectFailed {
                endpoint: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        state.connected = true;
        state.connect_count += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn select_slave(&mut self, slave: u8) {
        self.lock().selected = slave;
    }

    async fn read_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let mut state = self.lock();
        state.read_log.push((SourceKind::Coil, addr, count));
        if let Some(err) = state.take_failure() {
            return Err(err);
        }
        let slave = state.selected;
        let values = (addr..addr + count)
            .map(|a| state.coils.get(&(slave, a)).copied().unwrap_or(false))
            .collect();
        Ok(state.finish(values))
    }

    async fn read_input_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let mut state = self.lock();
        state.read_log.push((SourceKind::DiscreteInput, addr, count));
        if let Some(err) = state.take_failure() {
            return Err(err);
        }
        let slave = state.selected;
        let values = (addr..addr + count)
            .map(|a| state.discrete.get(&(slave, a)).copied().unwrap_or(false))
            .collect();
        Ok(state.finish(values))
    }

    async fn read_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let mut state = self.lock();
        state
            .read_log
            .push((SourceKind::HoldingRegister, addr, count));
        if let Some(err) = state.take_failure() {
            return Err(err);
        }
        let slave = state.selected;
        let values = (addr..addr + count)
            .map(|a| state.holding.get(&(slave, a)).copied().unwrap_or(0))
            .collect();
        Ok(state.finish(values))
    }

    async fn read_input_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let mut state = self.lock();
        state.read_log.push((SourceKind::InputRegister, addr, count));
        if let Some(err) = state.take_failure() {
            return Err(err);
        }
        let slave = state.selected;
        let values = (addr..addr + count)
            .map(|a| state.input.get(&(slave, a)).copied().unwrap_or(0))
            .collect();
        Ok(state.finish(values))
    }

    async fn write_bit(&mut self, addr: u16, value: bool) -> TransportResult<()> {
        let mut state = self.lock();
        let slave = state.selected;
        state.coils.insert((slave, addr), value);
        state.writes.push(WriteOp::Bit(slave, addr, value));
        Ok(())
    }

    async fn write_register(&mut self, addr: u16, value: u16) -> TransportResult<()> {
        let mut state = self.lock();
        let slave = state.selected;
        state.holding.insert((slave, addr), value);
        state.writes.push(WriteOp::Register(slave, addr, value));
        Ok(())
    }

    async fn write_registers(&mut self, addr: u16, values: &[u16]) -> TransportResult<()> {
        let mut state = self.lock();
        let slave = state.selected;
        for (i, &value) in values.iter().enumerate() {
            state.holding.insert((slave, addr + i as u16), value);
        }
        state
            .writes
            .push(WriteOp::Registers(slave, addr, values.to_vec()));
        Ok(())
    }
}
