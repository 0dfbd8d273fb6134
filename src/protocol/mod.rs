//! Protocol module - wire format, packets, buffering and tree assembly.
//!
//! This module implements the binary protocol spoken over the serial link:
//! - 4-byte header encoding/decoding
//! - Packet buffer for accumulating partial reads
//! - Tree assembler folding multi-packet responses into one value

pub mod function;
mod packet;
mod packet_buffer;
mod tree;
mod wire_format;

pub use packet::{encode_packet, Packet};
pub use packet_buffer::{PacketBuffer, PacketReader, DEFAULT_BUFFER_CAPACITY};
pub use tree::{read_tree, PacketTree, TreeAssembler, TreePayload};
pub use wire_format::{
    to_hex, ErrorCode, Header, PacketKind, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
};
