//! Monitor - example of requesting data and watching notifications.
//!
//! This example demonstrates:
//! - Opening a serial port with `ConnectionBuilder::open_serial`
//! - The mandatory first request (`PRODUCT_VERSION`)
//! - Printing every received tree as a JSON line
//!
//! # Running
//!
//! ```text
//! RUST_LOG=bmap_client=debug cargo run --example monitor -- /dev/rfcomm0 [config.json]
//! ```
//!
//! Without arguments the available serial ports are listed.

use bmap_client::protocol::{function, PacketKind};
use bmap_client::transport::{available_ports, DEFAULT_BAUD_RATE};
use bmap_client::{Connection, ConnectionConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        for port in available_ports()? {
            println!("{}", port);
        }
        return Ok(());
    };

    let config = match args.next() {
        Some(file) => ConnectionConfig::from_json(&std::fs::read_to_string(file)?)?,
        None => ConnectionConfig::default(),
    };

    let connection = Connection::builder()
        .config(config)
        .open_serial(&path, DEFAULT_BAUD_RATE)?;

    let version = connection
        .issue(function::PRODUCT_VERSION, PacketKind::Get, &[])
        .await?;
    println!(
        "product version: {}",
        String::from_utf8_lossy(version.expect_status()?)
    );

    let settings = connection
        .issue(function::SETTINGS_GET_ALL, PacketKind::Start, &[])
        .await?;
    println!("{}", serde_json::to_string(&settings)?);

    let mut updates = connection.subscribe();

    loop {
        tokio::select! {
            tree = updates.recv() => match tree {
                Some(tree) => println!("{}", serde_json::to_string(&tree)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    connection.close().await;
    Ok(())
}
