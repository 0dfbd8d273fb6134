//! Packet buffer for accumulating partial reads.
//!
//! Serial links hand out data in arbitrary chunks: half a header, three
//! packets at once, or a single byte. [`PacketBuffer`] keeps the unconsumed
//! tail of the stream between extractions and [`PacketReader`] drives it from
//! an `AsyncRead`, performing one transport read at a time until a complete
//! packet is available.
//!
//! The buffer is pre-sized to a fixed ceiling ([`DEFAULT_BUFFER_CAPACITY`])
//! and never grows past it. A packet is at most 259 bytes, so the ceiling is
//! never reached by a well-formed stream.
//!
//! # Example
//!
//! ```
//! use bmap_client::protocol::{encode_packet, PacketBuffer, PacketKind};
//!
//! let bytes = encode_packet(0x0202, PacketKind::Status, &[80]).unwrap();
//! let mut buffer = PacketBuffer::new();
//!
//! buffer.push(&bytes[..2]).unwrap();
//! assert!(buffer.try_extract().is_none());
//!
//! buffer.push(&bytes[2..]).unwrap();
//! let packet = buffer.try_extract().unwrap();
//! assert_eq!(packet.payload(), &[80]);
//! ```

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::packet::Packet;
use super::wire_format::{to_hex, Header, HEADER_SIZE, MAX_PACKET_SIZE};
use crate::error::{BmapError, Result};

/// Default buffer ceiling in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Largest single transport read.
const READ_CHUNK_SIZE: usize = 256;

/// Buffer for accumulating incoming bytes and extracting complete packets.
///
/// All data is stored in a single `BytesMut` allocated up front. Extraction
/// discards the consumed prefix and keeps any bytes that already belong to
/// the next packet.
#[derive(Debug)]
pub struct PacketBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Hard ceiling on buffered bytes.
    capacity: usize,
}

impl PacketBuffer {
    /// Create a buffer with the default 1 KiB ceiling.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer with a custom ceiling.
    ///
    /// The ceiling is raised to the largest packet size if smaller, so that
    /// every well-formed packet fits.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MAX_PACKET_SIZE);
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk of transport data.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if the chunk would push the buffer past its
    /// ceiling. Nothing is appended in that case.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.buffer.len() + data.len();
        if needed > self.capacity {
            return Err(BmapError::BufferOverflow {
                needed,
                capacity: self.capacity,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to extract a single packet from the buffer.
    ///
    /// Returns `None` if more data is needed.
    pub fn try_extract(&mut self) -> Option<Packet> {
        let header = Header::decode(&self.buffer)?;
        let size = header.packet_size();
        if self.buffer.len() < size {
            return None;
        }

        tracing::trace!("Read {}", to_hex(&self.buffer[..size]));

        let packet = Packet::from_parts(header.cmd, header.kind, &self.buffer[HEADER_SIZE..size]);
        self.buffer.advance(size);
        Some(packet)
    }

    /// Bytes still required before the next packet is complete.
    ///
    /// Zero when a packet can be extracted.
    pub fn missing(&self) -> usize {
        match Header::decode(&self.buffer) {
            Some(header) => header.packet_size().saturating_sub(self.buffer.len()),
            None => HEADER_SIZE - self.buffer.len(),
        }
    }

    /// Space left before the ceiling is reached.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Get the buffer ceiling.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls complete packets out of an async byte stream.
#[derive(Debug)]
pub struct PacketReader<R> {
    reader: R,
    buffer: PacketBuffer,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Wrap a reader with a default-sized buffer.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_CAPACITY)
    }

    /// Wrap a reader with a custom buffer ceiling.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: PacketBuffer::with_capacity(capacity),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Read the next complete packet.
    ///
    /// Performs transport reads until a packet is buffered. Returns
    /// `Ok(None)` when the stream ends; that is a normal shutdown, not an
    /// error. Bytes of an incomplete trailing packet are discarded.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            if let Some(packet) = self.buffer.try_extract() {
                return Ok(Some(packet));
            }

            let room = self.buffer.remaining_capacity().min(self.chunk.len());
            if room == 0 {
                return Err(BmapError::BufferOverflow {
                    needed: self.buffer.len() + self.buffer.missing(),
                    capacity: self.buffer.capacity(),
                });
            }

            let n = self.reader.read(&mut self.chunk[..room]).await?;
            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        "Stream ended with {} unconsumed bytes",
                        self.buffer.len()
                    );
                }
                return Ok(None);
            }

            self.buffer.push(&self.chunk[..n])?;
        }
    }

    /// Get the buffered, not yet consumed byte count.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Unwrap the underlying reader, dropping buffered bytes.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
