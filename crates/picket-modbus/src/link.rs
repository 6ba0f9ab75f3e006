// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The transport link to a Modbus device.
//!
//! [`ModbusLink`] is the seam between the polling engine and the wire: the
//! production [`Transport`] drives a `tokio-modbus` client context over TCP
//! or a serial line, and scripted implementations stand in for real devices
//! in tests and simulations.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, ExceptionCode};
use tokio_serial::{
    DataBits as SerialDataBits, Parity as SerialParity, SerialPortBuilderExt,
    StopBits as SerialStopBits,
};

use crate::error::{TransportError, TransportResult};
use crate::types::{LinkSettings, Parity, RtuSettings, TcpSettings};

/// Response timeout applied to serial requests, where no timeout is
/// configurable from the host.
const RTU_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// ModbusLink
// =============================================================================

/// One session to a Modbus device.
///
/// All requests are addressed to the most recently selected slave. The
/// polling engine owns the link exclusively for the duration of an
/// operation, so methods take `&mut self`.
#[async_trait]
pub trait ModbusLink: Send {
    /// Establishes the session.
    async fn connect(&mut self) -> TransportResult<()>;

    /// Releases the session. Safe to call when already closed.
    async fn close(&mut self);

    /// Returns `true` while a session is established.
    fn is_connected(&self) -> bool;

    /// Selects the destination slave for subsequent requests.
    fn select_slave(&mut self, slave: u8);

    /// Re-applies non-identifying settings (the request timeout) in place.
    fn apply_settings(&mut self, _settings: &LinkSettings) {}

    /// Reads coils (FC 01).
    async fn read_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>>;

    /// Reads discrete inputs (FC 02).
    async fn read_input_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>>;

    /// Reads holding registers (FC 03).
    async fn read_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>>;

    /// Reads input registers (FC 04).
    async fn read_input_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>>;

    /// Writes a single coil (FC 05).
    async fn write_bit(&mut self, addr: u16, value: bool) -> TransportResult<()>;

    /// Writes a single holding register (FC 06).
    async fn write_register(&mut self, addr: u16, value: u16) -> TransportResult<()>;

    /// Writes multiple holding registers (FC 16).
    async fn write_registers(&mut self, addr: u16, values: &[u16]) -> TransportResult<()>;
}

// =============================================================================
// Transport
// =============================================================================

/// The production [`ModbusLink`] over `tokio-modbus`.
///
/// TCP sessions attach to a [`TcpStream`]; RTU sessions attach to a
/// `tokio-serial` stream. Every request is bounded by the configured
/// response timeout.
pub struct Transport {
    settings: LinkSettings,
    ctx: Option<ModbusContext>,
    slave: u8,
}

impl Transport {
    /// Creates an unconnected transport for the given settings.
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            settings,
            ctx: None,
            slave: 1,
        }
    }

    /// Returns the connection settings.
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn request_timeout(&self) -> Duration {
        match &self.settings {
            LinkSettings::Tcp(tcp) => tcp.timeout,
            LinkSettings::Rtu(_) => RTU_REQUEST_TIMEOUT,
        }
    }

    async fn connect_tcp(slave: u8, tcp: &TcpSettings) -> TransportResult<ModbusContext> {
        let endpoint = format!("{}:{}", tcp.address, tcp.port);

        let socket_addr = match endpoint.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(_) => tokio::net::lookup_host(&endpoint)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    endpoint: endpoint.clone(),
                    source: e,
                })?
                .next()
                .ok_or_else(|| TransportError::BadEndpoint(endpoint.clone()))?,
        };

        let stream = timeout(tcp.timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| TransportError::Timeout(tcp.timeout))?
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: endpoint.clone(),
                source: e,
            })?;
        stream.set_nodelay(true).ok();

        Ok(tcp::attach_slave(stream, Slave(slave)))
    }

    fn connect_rtu(&self, rtu: &RtuSettings) -> TransportResult<ModbusContext> {
        let builder = tokio_serial::new(rtu.device.as_str(), rtu.baud)
            .data_bits(convert_data_bits(rtu.data_bits))
            .stop_bits(convert_stop_bits(rtu.stop_bits))
            .parity(convert_parity(rtu.parity));

        let port = builder
            .open_native_async()
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: rtu.device.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        Ok(rtu::attach_slave(port, Slave(self.slave)))
    }
}

#[async_trait]
impl ModbusLink for Transport {
    async fn connect(&mut self) -> TransportResult<()> {
        // A lost peer leaves a stale context behind; always rebuild the
        // session so a reconnect after a broken pipe gets a fresh socket.
        self.ctx = None;

        let ctx = match &self.settings {
            LinkSettings::Tcp(tcp) => Self::connect_tcp(self.slave, tcp).await,
            LinkSettings::Rtu(rtu) => self.connect_rtu(rtu),
        };

        match ctx {
            Ok(ctx) => {
                self.ctx = Some(ctx);
                tracing::info!(
                    protocol = self.settings.protocol_name(),
                    endpoint = %self.settings.endpoint(),
                    "Modbus connected"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    protocol = self.settings.protocol_name(),
                    endpoint = %self.settings.endpoint(),
                    error = %e,
                    "failed to connect to Modbus device"
                );
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::debug!(error = %e, "error disconnecting from Modbus device");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    fn select_slave(&mut self, slave: u8) {
        self.slave = slave;
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_slave(Slave(slave));
        }
    }

    fn apply_settings(&mut self, settings: &LinkSettings) {
        self.settings = settings.clone();
    }

    async fn read_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        let bits = timeout(t, ctx.read_coils(addr, count))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x01, e))?;
        check_count(bits, count)
    }

    async fn read_input_bits(&mut self, addr: u16, count: u16) -> TransportResult<Vec<bool>> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        let bits = timeout(t, ctx.read_discrete_inputs(addr, count))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x02, e))?;
        check_count(bits, count)
    }

    async fn read_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        let words = timeout(t, ctx.read_holding_registers(addr, count))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x03, e))?;
        check_count(words, count)
    }

    async fn read_input_registers(&mut self, addr: u16, count: u16) -> TransportResult<Vec<u16>> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        let words = timeout(t, ctx.read_input_registers(addr, count))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x04, e))?;
        check_count(words, count)
    }

    async fn write_bit(&mut self, addr: u16, value: bool) -> TransportResult<()> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        timeout(t, ctx.write_single_coil(addr, value))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x05, e))?;
        Ok(())
    }

    async fn write_register(&mut self, addr: u16, value: u16) -> TransportResult<()> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        timeout(t, ctx.write_single_register(addr, value))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x06, e))?;
        Ok(())
    }

    async fn write_registers(&mut self, addr: u16, values: &[u16]) -> TransportResult<()> {
        let t = self.request_timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;
        timeout(t, ctx.write_multiple_registers(addr, values))
            .await
            .map_err(|_| TransportError::Timeout(t))?
            .map_err(map_modbus_error)?
            .map_err(|e| map_exception(0x10, e))?;
        Ok(())
    }
}

// =============================================================================
// Error mapping
// =============================================================================

fn check_count<T>(values: Vec<T>, requested: u16) -> TransportResult<Vec<T>> {
    if values.len() != requested as usize {
        return Err(TransportError::ShortResponse {
            expected: requested as usize,
            actual: values.len(),
        });
    }
    Ok(values)
}

fn map_modbus_error(error: TokioModbusError) -> TransportError {
    match error {
        TokioModbusError::Transport(io_error) => TransportError::Io(io_error),
        TokioModbusError::Protocol(protocol_error) => {
            TransportError::Protocol(protocol_error.to_string())
        }
    }
}

fn map_exception(function: u8, exception: ExceptionCode) -> TransportError {
    TransportError::Exception {
        function,
        exception: exception_code_to_u8(exception),
    }
}

fn exception_code_to_u8(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        _ => 0xFF,
    }
}

fn convert_data_bits(bits: u8) -> SerialDataBits {
    match bits {
        5 => SerialDataBits::Five,
        6 => SerialDataBits::Six,
        7 => SerialDataBits::Seven,
        _ => SerialDataBits::Eight,
    }
}

fn convert_stop_bits(bits: u8) -> SerialStopBits {
    match bits {
        2 => SerialStopBits::Two,
        _ => SerialStopBits::One,
    }
}

fn convert_parity(parity: Parity) -> SerialParity {
    match parity {
        Parity::None => SerialParity::None,
        Parity::Odd => SerialParity::Odd,
        Parity::Even => SerialParity::Even,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn tcp_settings() -> LinkSettings {
        LinkSettings::Tcp(TcpSettings {
            address: "127.0.0.1".to_string(),
            port: 2222,
            timeout: Duration::from_millis(250),
        })
    }

    #[test]
    fn test_transport_starts_disconnected() {
        let transport = Transport::new(tcp_settings());
        assert!(!transport.is_connected());
        assert_eq!(transport.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_apply_settings_updates_timeout_in_place() {
        let mut transport = Transport::new(tcp_settings());
        let updated = LinkSettings::Tcp(TcpSettings {
            address: "127.0.0.1".to_string(),
            port: 2222,
            timeout: Duration::from_secs(2),
        });
        transport.apply_settings(&updated);
        assert_eq!(transport.request_timeout(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_requests_fail_when_not_connected() {
        let mut transport = Transport::new(tcp_settings());
        let err = transport.read_registers(0, 1).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert_eq!(err.kind(), FailureKind::ConnectionLost);
    }

    #[test]
    fn test_short_response_detection() {
        let err = check_count(vec![1u16, 2, 3], 5).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortResponse {
                expected: 5,
                actual: 3
            }
        ));
        assert!(check_count(vec![1u16, 2, 3], 3).is_ok());
    }

    #[test]
    fn test_exception_mapping() {
        let err = map_exception(0x03, ExceptionCode::IllegalDataAddress);
        assert!(matches!(
            err,
            TransportError::Exception {
                function: 0x03,
                exception: 0x02
            }
        ));
        assert_eq!(err.kind(), FailureKind::BadData);
    }
}
