//! Wire format encoding and decoding.
//!
//! Implements the 4-byte packet header:
//! ```text
//! ┌──────────┬───────┬────────┐
//! │ Command  │ Kind  │ Length │
//! │ 2 bytes  │ 1 byte│ 1 byte │
//! │ uint16 BE│       │ uint8  │
//! └──────────┴───────┴────────┘
//! ```
//!
//! The payload (0-255 bytes) follows the header directly.

use std::fmt;

use serde::Serialize;

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Maximum payload of a single physical packet.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Largest possible physical packet (header + payload).
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Role tag of a packet.
///
/// Requests use `Set`, `Get`, `SetGet` and `Start`. The device answers with
/// `Status`, `Error`, `Result` and `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketKind {
    Set,
    Get,
    SetGet,
    Status,
    Error,
    Start,
    Result,
    Processing,
    /// A kind byte outside the protocol's range, kept for diagnostics.
    Unknown(u8),
}

impl PacketKind {
    /// Decode a kind byte. Never fails; out-of-range values map to `Unknown`.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Set,
            1 => Self::Get,
            2 => Self::SetGet,
            3 => Self::Status,
            4 => Self::Error,
            5 => Self::Start,
            6 => Self::Result,
            7 => Self::Processing,
            other => Self::Unknown(other),
        }
    }

    /// Wire representation of this kind.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Set => 0,
            Self::Get => 1,
            Self::SetGet => 2,
            Self::Status => 3,
            Self::Error => 4,
            Self::Start => 5,
            Self::Result => 6,
            Self::Processing => 7,
            Self::Unknown(b) => b,
        }
    }

    /// Kinds the host may send.
    #[inline]
    pub fn is_outbound(self) -> bool {
        matches!(self, Self::Set | Self::Get | Self::SetGet | Self::Start)
    }

    /// Kinds the device may send.
    #[inline]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Status | Self::Error | Self::Result | Self::Processing
        )
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("SET"),
            Self::Get => f.write_str("GET"),
            Self::SetGet => f.write_str("SET_GET"),
            Self::Status => f.write_str("STATUS"),
            Self::Error => f.write_str("ERROR"),
            Self::Start => f.write_str("START"),
            Self::Result => f.write_str("RESULT"),
            Self::Processing => f.write_str("PROCESSING"),
            Self::Unknown(b) => write!(f, "UNKNOWN({})", b),
        }
    }
}

/// Failure reason carried in the single payload byte of an `ERROR` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Length,
    Checksum,
    FblockNotSupported,
    FunctionNotSupported,
    OperationNotSupported,
    InvalidData,
    DataUnavailable,
    Runtime,
    Timeout,
    InvalidState,
    DeviceNotFound,
    Busy,
    NoConnectionTimeout,
    NoConnectionKey,
    OtaUpdate,
    OtaLowBattery,
    OtaNoCharger,
    /// Block-specific failure (`0xFF`, i.e. `-1` as a signed byte).
    FblockSpecific,
    /// Unassigned code, preserved numerically.
    Unknown(u8),
}

impl ErrorCode {
    /// Decode an error code byte.
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::Length,
            2 => Self::Checksum,
            3 => Self::FblockNotSupported,
            4 => Self::FunctionNotSupported,
            5 => Self::OperationNotSupported,
            6 => Self::InvalidData,
            7 => Self::DataUnavailable,
            8 => Self::Runtime,
            9 => Self::Timeout,
            10 => Self::InvalidState,
            11 => Self::DeviceNotFound,
            12 => Self::Busy,
            13 => Self::NoConnectionTimeout,
            14 => Self::NoConnectionKey,
            15 => Self::OtaUpdate,
            16 => Self::OtaLowBattery,
            17 => Self::OtaNoCharger,
            0xFF => Self::FblockSpecific,
            other => Self::Unknown(other),
        }
    }

    /// Wire representation of this code.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Length => 1,
            Self::Checksum => 2,
            Self::FblockNotSupported => 3,
            Self::FunctionNotSupported => 4,
            Self::OperationNotSupported => 5,
            Self::InvalidData => 6,
            Self::DataUnavailable => 7,
            Self::Runtime => 8,
            Self::Timeout => 9,
            Self::InvalidState => 10,
            Self::DeviceNotFound => 11,
            Self::Busy => 12,
            Self::NoConnectionTimeout => 13,
            Self::NoConnectionKey => 14,
            Self::OtaUpdate => 15,
            Self::OtaLowBattery => 16,
            Self::OtaNoCharger => 17,
            Self::FblockSpecific => 0xFF,
            Self::Unknown(b) => b,
        }
    }

    /// Decode the payload of an `ERROR` packet.
    ///
    /// Only a payload of exactly one byte carries a code.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [b] => Some(Self::from_byte(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Length => "LENGTH",
            Self::Checksum => "CHKSUM",
            Self::FblockNotSupported => "FBLOCK_NOT_SUPP",
            Self::FunctionNotSupported => "FUNC_NOT_SUPP",
            Self::OperationNotSupported => "OP_NOT_SUPP",
            Self::InvalidData => "INVALID_DATA",
            Self::DataUnavailable => "DATA_UNAVAILABLE",
            Self::Runtime => "RUNTIME",
            Self::Timeout => "TIMEOUT",
            Self::InvalidState => "INVALID_STATE",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::Busy => "BUSY",
            Self::NoConnectionTimeout => "NOCONN_TIMEOUT",
            Self::NoConnectionKey => "NOCONN_KEY",
            Self::OtaUpdate => "OTA_UPDATE",
            Self::OtaLowBattery => "OTA_LOW_BATT",
            Self::OtaNoCharger => "OTA_NO_CHARGER",
            Self::FblockSpecific => "FBLOCK_SPECIFIC",
            Self::Unknown(b) => return write!(f, "UNKNOWN({})", b),
        };
        f.write_str(name)
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Block/function command identifier.
    pub cmd: u16,
    /// Packet role.
    pub kind: PacketKind,
    /// Payload length in bytes.
    pub payload_length: u8,
}

impl Header {
    /// Create a new header.
    pub fn new(cmd: u16, kind: PacketKind, payload_length: u8) -> Self {
        Self {
            cmd,
            kind,
            payload_length,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use bmap_client::protocol::{Header, PacketKind};
    ///
    /// let header = Header::new(0x0102, PacketKind::Get, 0);
    /// assert_eq!(header.encode(), [0x01, 0x02, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let [hi, lo] = self.cmd.to_be_bytes();
        [hi, lo, self.kind.as_byte(), self.payload_length]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            cmd: u16::from_be_bytes([buf[0], buf[1]]),
            kind: PacketKind::from_byte(buf[2]),
            payload_length: buf[3],
        })
    }

    /// Total packet size described by this header.
    #[inline]
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.payload_length as usize
    }
}

/// Format bytes as space separated lowercase hex, e.g. `01 02 ff`.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}
