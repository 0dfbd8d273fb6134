//! Transport module - the byte stream under a connection.
//!
//! Any duplex async byte stream can carry the protocol. The accessory is
//! normally reached through the serial port the OS exposes for its
//! Bluetooth SPP/RFCOMM link; see [`open_serial`].

mod serial;

use tokio::io::{AsyncRead, AsyncWrite};

pub use serial::{available_ports, open_serial, DEFAULT_BAUD_RATE};

/// A duplex byte stream usable by [`Connection`](crate::Connection).
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
