//! # bmap-client
//!
//! Async client for the BMAP request/response protocol used to configure and
//! monitor Bluetooth audio accessories over a serial link.
//!
//! ## Architecture
//!
//! - **Framing**: 4-byte header (`cmd` u16 BE, `kind`, length) + up to 255
//!   payload bytes per physical packet
//! - **Assembly**: multi-packet responses are folded into one [`PacketTree`]
//! - **Correlation**: one request in flight at a time, matched by command id,
//!   with per-attempt timeout and retries
//! - **Notifications**: every tree, solicited or not, is broadcast to
//!   subscribers
//!
//! ## Example
//!
//! ```ignore
//! use bmap_client::protocol::{function, PacketKind};
//! use bmap_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> bmap_client::error::Result<()> {
//!     let connection = Connection::builder().open_serial("/dev/rfcomm0", 115_200)?;
//!
//!     let battery = connection
//!         .issue(function::BATTERY_LEVEL, PacketKind::Get, &[])
//!         .await?;
//!     println!("battery: {:?}", battery.expect_status()?);
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod correlator;
pub mod error;
pub mod protocol;
pub mod transport;

mod connection;
mod writer;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionBuilder, Subscription};
pub use error::{BmapError, DeviceError};
pub use protocol::{PacketKind, PacketTree, TreePayload};
