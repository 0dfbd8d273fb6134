//! Error types for bmap-client.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::protocol::{to_hex, ErrorCode, PacketKind};

/// Failure reported by the device in an `ERROR` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// Command the error was reported for.
    pub cmd: u16,
    /// Decoded reason, if the payload was a single byte.
    pub code: Option<ErrorCode>,
    /// Raw `ERROR` payload.
    pub payload: Bytes,
}

impl DeviceError {
    /// Build from the command id and the raw payload of an `ERROR` packet.
    pub fn from_payload(cmd: u16, payload: Bytes) -> Self {
        Self {
            cmd,
            code: ErrorCode::from_payload(&payload),
            payload,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "error received for 0x{:04x}: {}", self.cmd, code),
            None => write!(
                f,
                "error received for 0x{:04x}: [{}]",
                self.cmd,
                to_hex(&self.payload)
            ),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Main error type for all bmap operations.
#[derive(Debug, Error)]
pub enum BmapError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration document could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Device answered with an `ERROR` packet.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A packet kind that is not valid at this point of a response.
    #[error("received unexpected kind for 0x{cmd:04x}: {kind}")]
    UnexpectedKind { cmd: u16, kind: PacketKind },

    /// A `PROCESSING` response mixed continuation and nested children.
    #[error("mixed continuation and nested children in response for 0x{cmd:04x}")]
    MixedChildren { cmd: u16 },

    /// Payload does not fit in a single physical packet.
    #[error("payload of {0} bytes exceeds the 255 byte packet limit")]
    PayloadTooLarge(usize),

    /// Stream buffer would grow past its ceiling.
    #[error("stream buffer overflow: {needed} bytes needed, capacity {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },

    /// Only host-to-device kinds may be used for requests.
    #[error("kind {0} cannot be sent to the device")]
    InvalidRequestKind(PacketKind),

    /// A request is already waiting for its response.
    #[error("request for 0x{requested:04x} rejected: 0x{pending:04x} is still pending")]
    RequestPending { pending: u16, requested: u16 },

    /// No matching response after all attempts.
    #[error("no response for 0x{cmd:04x} after {attempts} attempts")]
    Timeout { cmd: u16, attempts: u32 },

    /// Transport went away while a request was waiting.
    #[error("device disconnected")]
    Disconnected,

    /// Connection was closed locally.
    #[error("connection closed")]
    ConnectionClosed,
}

impl BmapError {
    /// Faults the read loop survives: it drops the current response and
    /// keeps reading.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Device(_) | Self::UnexpectedKind { .. } | Self::MixedChildren { .. }
        )
    }
}

/// Result type alias using BmapError.
pub type Result<T> = std::result::Result<T, BmapError>;
