//! Physical packet with typed accessors.
//!
//! Represents one wire-level packet: header fields plus a payload of at most
//! 255 bytes. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use bmap_client::protocol::{encode_packet, Packet, PacketKind};
//!
//! let bytes = encode_packet(0x0102, PacketKind::SetGet, b"Name").unwrap();
//! assert_eq!(bytes.len(), 4 + 4);
//!
//! let packet = Packet::decode(&bytes).unwrap();
//! assert_eq!(packet.cmd, 0x0102);
//! assert_eq!(packet.payload(), b"Name");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, PacketKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{BmapError, Result};

/// A complete physical packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Block/function command identifier.
    pub cmd: u16,
    /// Packet role.
    pub kind: PacketKind,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(cmd: u16, kind: PacketKind, payload: Bytes) -> Self {
        Self { cmd, kind, payload }
    }

    /// Create a packet from raw bytes (copies data).
    pub fn from_parts(cmd: u16, kind: PacketKind, payload: &[u8]) -> Self {
        Self::new(cmd, kind, Bytes::copy_from_slice(payload))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header describing this packet.
    ///
    /// Fails if the payload does not fit a physical packet.
    pub fn header(&self) -> Result<Header> {
        let len = u8::try_from(self.payload.len())
            .map_err(|_| BmapError::PayloadTooLarge(self.payload.len()))?;
        Ok(Header::new(self.cmd, self.kind, len))
    }

    /// Encode this packet to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode_packet(self.cmd, self.kind, &self.payload)
    }

    /// Decode one complete packet from the start of `buf`.
    ///
    /// Returns `None` if `buf` does not yet hold the header and the full
    /// declared payload. Trailing bytes are ignored.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let header = Header::decode(buf)?;
        if buf.len() < header.packet_size() {
            return None;
        }
        Some(Self::from_parts(
            header.cmd,
            header.kind,
            &buf[HEADER_SIZE..header.packet_size()],
        ))
    }
}

/// Encode a packet to wire bytes.
///
/// Produces exactly `4 + payload.len()` bytes. Payloads longer than 255
/// bytes are rejected rather than truncated.
pub fn encode_packet(cmd: u16, kind: PacketKind, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(BmapError::PayloadTooLarge(payload.len()));
    }
    let header = Header::new(cmd, kind, payload.len() as u8);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = encode_packet(0x0505, PacketKind::Set, &[0x0a, 0x0b]).unwrap();
        assert_eq!(&bytes[..], &[0x05, 0x05, 0x00, 0x02, 0x0a, 0x0b]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let bytes = encode_packet(0x0001, PacketKind::Get, &[]).unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_max_payload() {
        let payload = vec![0xAB; MAX_PAYLOAD_SIZE];
        let bytes = encode_packet(0x0101, PacketKind::SetGet, &payload).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 255);
        assert_eq!(bytes[3], 0xFF);
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let payload = vec![0u8; 256];
        let result = encode_packet(0x0101, PacketKind::Set, &payload);
        assert!(matches!(result, Err(BmapError::PayloadTooLarge(256))));
    }

    #[test]
    fn test_decode_incomplete() {
        let bytes = encode_packet(0x0102, PacketKind::Status, b"abc").unwrap();
        assert!(Packet::decode(&bytes[..3]).is_none());
        assert!(Packet::decode(&bytes[..6]).is_none());
        assert!(Packet::decode(&bytes).is_some());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_packet(0x0102, PacketKind::Status, b"abc")
            .unwrap()
            .to_vec();
        bytes.extend_from_slice(&[0x00, 0x01]);

        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.payload(), b"abc");
    }

    #[test]
    fn test_header_from_packet() {
        let packet = Packet::from_parts(0x0202, PacketKind::Status, &[50]);
        let header = packet.header().unwrap();
        assert_eq!(header.payload_length, 1);
        assert_eq!(packet.encode().unwrap().len(), 5);

        let oversize = Packet::new(1, PacketKind::Set, Bytes::from(vec![0u8; 300]));
        assert!(oversize.header().is_err());
    }
}
