// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus engine types.
//!
//! This module provides the building blocks of the register map:
//!
//! - **SourceKind**: the four Modbus entity kinds with their metadata
//! - **ItemFlags** / **RegisterSpan** / **RegisterBinding**: one map item
//! - **LinkSettings**: TCP and RTU connection parameters with the identity
//!   comparison that drives transport recreation on reconfigure

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// SourceKind
// =============================================================================

/// The kind of Modbus source a datapoint is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Coil (read/write, 1 bit). FC 01 read, FC 05 write.
    Coil,
    /// Discrete input (read-only, 1 bit). FC 02 read.
    DiscreteInput,
    /// Holding register (read/write, 16 bits). FC 03 read, FC 06/16 write.
    HoldingRegister,
    /// Input register (read-only, 16 bits). FC 04 read.
    InputRegister,
}

impl SourceKind {
    /// Returns `true` for the single-bit kinds.
    #[inline]
    pub const fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Returns `true` for the kinds that accept writes.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::HoldingRegister)
    }

    /// Returns the Modbus function code used to read this kind.
    #[inline]
    pub const fn read_function_code(&self) -> u8 {
        match self {
            Self::Coil => 0x01,
            Self::DiscreteInput => 0x02,
            Self::HoldingRegister => 0x03,
            Self::InputRegister => 0x04,
        }
    }

    /// Returns a lower-case human name, as used in log messages.
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete input",
            Self::HoldingRegister => "holding register",
            Self::InputRegister => "input register",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

// =============================================================================
// ItemFlags
// =============================================================================

/// Decode modifiers attached to a register binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFlags {
    /// Reinterpret the 32-bit composite as IEEE-754 `binary32`.
    pub float: bool,
    /// Swap the two bytes within every 16-bit word.
    pub swap_bytes: bool,
    /// Swap the two 16-bit halves of every 32-bit group.
    pub swap_words: bool,
}

impl ItemFlags {
    /// Returns flags for a `swap` map property value, `None` for an unknown
    /// value.
    pub fn from_swap(value: &str) -> Option<Self> {
        match value {
            "bytes" => Some(Self {
                swap_bytes: true,
                ..Self::default()
            }),
            "words" => Some(Self {
                swap_words: true,
                ..Self::default()
            }),
            "both" => Some(Self {
                swap_bytes: true,
                swap_words: true,
                ..Self::default()
            }),
            _ => None,
        }
    }

    /// Merges another flag set into this one.
    pub fn merge(&mut self, other: Self) {
        self.float |= other.float;
        self.swap_bytes |= other.swap_bytes;
        self.swap_words |= other.swap_words;
    }
}

// =============================================================================
// RegisterSpan
// =============================================================================

/// The register address(es) a binding covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterSpan {
    /// A single register or bit address.
    Single(u16),
    /// A composite value: register `i` contributes bits `16·i .. 16·i+15`.
    Vector(Vec<u16>),
}

impl RegisterSpan {
    /// The first address of the span.
    pub fn first(&self) -> u16 {
        match self {
            Self::Single(addr) => *addr,
            Self::Vector(regs) => regs.first().copied().unwrap_or(0),
        }
    }

    /// All addresses in span order.
    pub fn addresses(&self) -> impl Iterator<Item = u16> + '_ {
        let slice: &[u16] = match self {
            Self::Single(addr) => std::slice::from_ref(addr),
            Self::Vector(regs) => regs.as_slice(),
        };
        slice.iter().copied()
    }

    /// Number of 16-bit words the span covers.
    pub fn width(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Vector(regs) => regs.len(),
        }
    }
}

// =============================================================================
// RegisterBinding
// =============================================================================

/// One entry of the register map: binds addresses to a named datapoint with
/// scaling and decode metadata.
#[derive(Debug, Clone)]
pub struct RegisterBinding {
    /// Asset grouping; empty selects the plugin's default asset.
    pub asset_name: String,
    /// Datapoint name.
    pub name: String,
    /// The bound register address(es).
    pub span: RegisterSpan,
    /// Scale multiplier applied on read.
    pub scale: f64,
    /// Offset added on read.
    pub offset: f64,
    /// Decode modifiers.
    pub flags: ItemFlags,
}

impl RegisterBinding {
    /// Creates a binding with scale 1 and offset 0.
    pub fn new(asset_name: impl Into<String>, name: impl Into<String>, span: RegisterSpan) -> Self {
        Self {
            asset_name: asset_name.into(),
            name: name.into(),
            span,
            scale: 1.0,
            offset: 0.0,
            flags: ItemFlags::default(),
        }
    }

    /// Sets scale and offset.
    pub fn with_scaling(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// Sets the decode flags.
    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Rounds a scaled result to the number of decimal places the scale
    /// warrants.
    ///
    /// The raw value spans `0 ..= 2^bits - 1`; after scaling, one raw step
    /// moves the result by `scale`, so decimals beyond `log10(1/scale)`
    /// carry no information. Scale 1 bypasses rounding.
    pub fn round(&self, value: f64, bits: u32) -> f64 {
        if self.scale == 1.0 {
            return value;
        }
        let fullscale = f64::from(2u32.pow(bits) - 1);
        let min = self.offset;
        let max = fullscale * self.scale + self.offset;
        let slope = (max - min) / fullscale;
        let dp = (1.0 / slope).log10().round();
        let divisor = 10f64.powf(dp);
        (value * divisor).round() / divisor
    }
}

// =============================================================================
// Serial line parameters
// =============================================================================

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Odd => "odd",
            Self::Even => "even",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Parity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "odd" => Ok(Self::Odd),
            "even" => Ok(Self::Even),
            _ => Err(()),
        }
    }
}

// =============================================================================
// LinkSettings
// =============================================================================

/// Modbus TCP connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpSettings {
    /// Server host name or address.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Per-request response timeout.
    pub timeout: Duration,
}

/// Modbus RTU serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtuSettings {
    /// Serial device path.
    pub device: String,
    /// Baud rate.
    pub baud: u32,
    /// Data bits (5-8).
    pub data_bits: u8,
    /// Stop bits (1-2).
    pub stop_bits: u8,
    /// Parity.
    pub parity: Parity,
}

/// Connection parameters for either transport kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum LinkSettings {
    /// Modbus TCP.
    Tcp(TcpSettings),
    /// Modbus RTU over a serial line.
    Rtu(RtuSettings),
}

impl LinkSettings {
    /// Short protocol name for logging.
    pub const fn protocol_name(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "TCP",
            Self::Rtu(_) => "RTU",
        }
    }

    /// The endpoint string for logging.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Tcp(tcp) => format!("{}:{}", tcp.address, tcp.port),
            Self::Rtu(rtu) => rtu.device.clone(),
        }
    }

    /// Returns `true` when both settings identify the same connection.
    ///
    /// Only the identifying parameters force a transport rebuild on
    /// reconfigure: protocol kind, TCP address/port, or any RTU line
    /// parameter. The TCP timeout is re-applied in place instead.
    pub fn same_endpoint(&self, other: &LinkSettings) -> bool {
        match (self, other) {
            (Self::Tcp(a), Self::Tcp(b)) => a.address == b.address && a.port == b.port,
            (Self::Rtu(a), Self::Rtu(b)) => a == b,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
