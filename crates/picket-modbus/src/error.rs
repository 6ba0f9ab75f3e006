// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the Modbus engine.
//!
//! Transport failures carry a [`FailureKind`] classification that the poll
//! orchestrator's recovery policy keys on, replacing the `errno` inspection
//! of classic Modbus clients with a typed result.

use std::io;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// FailureKind
// =============================================================================

/// Recovery classification of a transport failure.
///
/// The poll loop reconnects and retries on every kind; the difference is in
/// how the connection is torn down first and whether the failure counts
/// against the cycle's soft-error threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The peer went away (broken pipe). Reconnect without an explicit
    /// close; resets the soft-error counter.
    ConnectionLost,
    /// The request was rejected as invalid. Close, reconnect; resets the
    /// soft-error counter.
    InvalidRequest,
    /// The peer reset the connection. Close, reconnect; resets the
    /// soft-error counter.
    ConnectionReset,
    /// The response was malformed or a Modbus exception. Close, reconnect;
    /// resets the soft-error counter.
    BadData,
    /// The request timed out. Counts against the soft-error threshold.
    Timeout,
    /// Anything else. Counts against the soft-error threshold.
    Other,
}

impl FailureKind {
    /// Returns `true` when the failure counts against the cycle's
    /// soft-error threshold rather than resetting it.
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Timeout | Self::Other)
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// A failure raised by the transport link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No session is established.
    #[error("not connected to the Modbus device")]
    NotConnected,

    /// The session could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        /// The endpoint that refused us.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The endpoint address could not be resolved.
    #[error("invalid Modbus endpoint: {0}")]
    BadEndpoint(String),

    /// A request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// An I/O failure on an established session.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The slave answered with a Modbus exception.
    #[error("modbus exception: function {function:#04x}, exception code {exception:#04x}")]
    Exception {
        /// Function code of the failed request.
        function: u8,
        /// Exception code from the response.
        exception: u8,
    },

    /// The response carried fewer elements than requested.
    #[error("short response: expected {expected} values, got {actual}")]
    ShortResponse {
        /// Number of elements requested.
        expected: usize,
        /// Number of elements returned.
        actual: usize,
    },

    /// A protocol-level violation (framing, transaction mismatch).
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Classifies the failure for the poll loop's recovery policy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io(e) => match e.kind() {
                io::ErrorKind::BrokenPipe => FailureKind::ConnectionLost,
                io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                    FailureKind::InvalidRequest
                }
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    FailureKind::ConnectionReset
                }
                io::ErrorKind::TimedOut => FailureKind::Timeout,
                _ => FailureKind::Other,
            },
            Self::Exception { .. } | Self::ShortResponse { .. } | Self::Protocol(_) => {
                FailureKind::BadData
            }
            Self::Timeout(_) => FailureKind::Timeout,
            Self::NotConnected => FailureKind::ConnectionLost,
            Self::ConnectFailed { .. } | Self::BadEndpoint(_) => FailureKind::Other,
        }
    }
}

/// A Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// WriteError
// =============================================================================

/// A failure of a setpoint write.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The datapoint's source kind is read-only, or control is disabled.
    #[error("datapoint {0} is not writable")]
    NotWritable(String),

    /// No writable datapoint with this name exists.
    #[error("no writable datapoint named {0}")]
    UnknownDatapoint(String),

    /// The value string could not be converted for the target registers.
    #[error("value '{value}' is not valid for {name}: {reason}")]
    BadValue {
        /// Target datapoint.
        name: String,
        /// The rejected value string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The transport failed while delivering the write.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Tests
// =============================================================================
