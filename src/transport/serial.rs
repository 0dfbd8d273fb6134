//! Serial port transport.
//!
//! # Example
//!
//! ```ignore
//! use bmap_client::transport::{open_serial, DEFAULT_BAUD_RATE};
//! use bmap_client::Connection;
//!
//! let port = open_serial("/dev/rfcomm0", DEFAULT_BAUD_RATE)?;
//! let connection = Connection::open(port, Default::default())?;
//! ```

use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::Result;

/// Line rate used when none is configured. RFCOMM ignores it, but the OS
/// still requires one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Open a serial port as 8N1 without flow control.
///
/// # Errors
///
/// Returns `Serial` if the port does not exist or cannot be configured.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    tracing::debug!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(stream)
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(tokio_serial::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
