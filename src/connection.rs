//! Connection builder and runtime loop.
//!
//! The [`ConnectionBuilder`] provides a fluent API for configuring timeouts
//! and retries. The [`Connection`] manages the lifecycle:
//! 1. Split the transport into read and write halves
//! 2. Spawn the writer task
//! 3. Spawn the read loop, which assembles packet trees, broadcasts them to
//!    subscribers and hands them to the pending request
//! 4. On `close()`, abort the writer and cancel the read loop
//!
//! # Example
//!
//! ```ignore
//! use bmap_client::protocol::{function, PacketKind};
//! use bmap_client::transport::open_serial;
//! use bmap_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = open_serial("/dev/rfcomm0", 115_200)?;
//!     let connection = Connection::builder().max_attempts(5).open(port)?;
//!
//!     let mut updates = connection.subscribe();
//!     let version = connection
//!         .issue(function::PRODUCT_VERSION, PacketKind::Get, &[])
//!         .await?;
//!     println!("{:?}", version.expect_status()?);
//!
//!     while let Some(tree) = updates.recv().await {
//!         println!("0x{:04x} changed", tree.cmd);
//!     }
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::correlator::{Correlator, Resolution};
use crate::error::{BmapError, Result};
use crate::protocol::{encode_packet, function, read_tree, PacketKind, PacketReader, PacketTree};
use crate::transport::{open_serial, Transport};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for configuring and opening a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of write attempts per request.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set how long each attempt waits for its response.
    ///
    /// Default: 1 second
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Set the read loop pause after a protocol fault.
    ///
    /// Default: 100 ms
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    /// Set how many trees each subscriber may fall behind.
    ///
    /// Default: 64
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.config.subscriber_capacity = capacity;
        self
    }

    /// Fail a pending request as soon as the device reports an `ERROR` for
    /// its command.
    ///
    /// Default: false (the request times out and retries)
    pub fn propagate_device_errors(mut self, enabled: bool) -> Self {
        self.config.propagate_device_errors = enabled;
        self
    }

    /// Open a connection over `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<T: Transport>(self, transport: T) -> Result<Connection> {
        Connection::open(transport, self.config)
    }

    /// Open the serial port at `path` and connect over it.
    pub fn open_serial(self, path: &str, baud_rate: u32) -> Result<Connection> {
        let port = open_serial(path, baud_rate)?;
        self.open(port)
    }
}

/// Receives every assembled tree, solicited or not.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<PacketTree>,
}

impl Subscription {
    /// Wait for the next tree.
    ///
    /// Returns `None` once the connection has shut down. Trees dropped
    /// because this subscriber fell behind are skipped with a warning.
    pub async fn recv(&mut self) -> Option<PacketTree> {
        loop {
            match self.rx.recv().await {
                Ok(tree) => return Some(tree),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscriber lagged, {} trees dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Unwrap the underlying broadcast receiver.
    pub fn into_inner(self) -> broadcast::Receiver<PacketTree> {
        self.rx
    }
}

/// State shared by the read loop.
struct ReadContext {
    correlator: Correlator,
    trees: broadcast::Sender<PacketTree>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    finished: CancellationToken,
    error_backoff: Duration,
    propagate_device_errors: bool,
}

/// An open connection to an accessory.
///
/// Use `issue()` to send a request and await its response tree, and
/// `subscribe()` to observe everything the device sends.
pub struct Connection {
    config: ConnectionConfig,
    writer: WriterHandle,
    correlator: Correlator,
    /// Template for new subscriptions. The read loop owns the only sender,
    /// so every subscription closes when it exits.
    trees: broadcast::Receiver<PacketTree>,
    live: Arc<AtomicBool>,
    /// Stops the read loop.
    cancel: CancellationToken,
    /// Cancelled by the read loop when it exits.
    finished: CancellationToken,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Open a connection over `transport` and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<T: Transport>(transport: T, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let (read_half, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = spawn_writer_task(write_half, config.write_queue);

        let (tree_tx, trees) = broadcast::channel(config.subscriber_capacity);
        let correlator = Correlator::new();
        let live = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let reader = PacketReader::with_capacity(read_half, config.buffer_capacity);
        let ctx = ReadContext {
            correlator: correlator.clone(),
            trees: tree_tx,
            live: live.clone(),
            cancel: cancel.clone(),
            finished: finished.clone(),
            error_backoff: config.error_backoff,
            propagate_device_errors: config.propagate_device_errors,
        };
        tokio::spawn(Self::read_loop(reader, ctx));

        Ok(Self {
            config,
            writer,
            correlator,
            trees,
            live,
            cancel,
            finished,
            writer_task,
        })
    }

    /// Main read loop - assembles trees and delivers them.
    async fn read_loop<R: AsyncRead + Unpin>(mut reader: PacketReader<R>, ctx: ReadContext) {
        tracing::debug!("Read loop started");

        loop {
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::debug!("Read loop cancelled");
                    break;
                }
                result = read_tree(&mut reader) => result,
            };

            match result {
                Ok(Some(tree)) => Self::dispatch(&ctx, tree),
                Ok(None) => {
                    tracing::debug!("Transport closed");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Retrying after protocol error: {}", e);
                    if ctx.propagate_device_errors {
                        if let BmapError::Device(device) = &e {
                            ctx.correlator.offer_error(device);
                        }
                    }
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => break,
                        _ = tokio::time::sleep(ctx.error_backoff) => {}
                    }
                }
                Err(e) => {
                    tracing::error!("Reader terminated: {}", e);
                    break;
                }
            }
        }

        ctx.live.store(false, Ordering::Release);
        ctx.finished.cancel();
    }

    /// Broadcast a tree, then offer it to the pending request.
    fn dispatch(ctx: &ReadContext, tree: PacketTree) {
        tracing::debug!(
            "Received {} 0x{:04x} ({})",
            tree.kind,
            tree.cmd,
            function::name_of(tree.cmd).unwrap_or("?")
        );
        // No subscribers is fine.
        let _ = ctx.trees.send(tree.clone());
        ctx.correlator.offer(&tree);
    }

    /// Send a request and wait for the response tree with the same command
    /// id.
    ///
    /// Each attempt writes the packet and waits for the response, both
    /// bounded by the attempt timeout. Attempts are repeated up to
    /// `max_attempts` times while the transport is live.
    ///
    /// # Errors
    ///
    /// - `RequestPending` if another request is in flight
    /// - `InvalidRequestKind` / `PayloadTooLarge` for malformed requests
    /// - `Timeout` after the last attempt, `Disconnected` if the transport
    ///   went away
    /// - `Device` if device error propagation is enabled and the device
    ///   rejected the request
    pub async fn issue(&self, cmd: u16, kind: PacketKind, payload: &[u8]) -> Result<PacketTree> {
        if self.cancel.is_cancelled() {
            return Err(BmapError::ConnectionClosed);
        }
        if !kind.is_outbound() {
            return Err(BmapError::InvalidRequestKind(kind));
        }
        let packet = encode_packet(cmd, kind, payload)?;

        let reservation = self.correlator.reserve(cmd)?;
        let attempts = self.config.max_attempts;

        for attempt in 1..=attempts {
            let deadline = Instant::now() + self.config.attempt_timeout;
            let response = reservation.arm(deadline);

            let outcome = self.attempt(packet.clone(), response);
            match tokio::time::timeout_at(deadline, outcome).await {
                Ok(result) => return result,
                Err(_) => {
                    reservation.disarm();
                    if !self.is_live() {
                        return Err(BmapError::Disconnected);
                    }
                    if attempt < attempts {
                        tracing::debug!(
                            "Retry {} {} 0x{:04x} (attempt {}/{})",
                            kind,
                            function::name_of(cmd).unwrap_or("?"),
                            cmd,
                            attempt + 1,
                            attempts
                        );
                    }
                }
            }
        }

        Err(BmapError::Timeout { cmd, attempts })
    }

    /// Write one attempt and wait for its resolution.
    async fn attempt(&self, packet: Bytes, response: oneshot::Receiver<Resolution>) -> Result<PacketTree> {
        self.writer.send(packet).await?;
        match response.await {
            Ok(resolution) => resolution.map_err(BmapError::from),
            Err(_) => Err(BmapError::ConnectionClosed),
        }
    }

    /// Subscribe to every assembled tree.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.trees.resubscribe(),
        }
    }

    /// Whether the transport is still delivering data.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Command id of the request currently in flight.
    pub fn pending_request(&self) -> Option<u16> {
        self.correlator.pending()
    }

    /// Active configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Close the connection.
    ///
    /// Aborts an in-flight write, stops the read loop and releases the
    /// transport. A request still waiting fails with `ConnectionClosed`.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        self.shutdown();
        self.finished.cancelled().await;
        tracing::debug!("Connection closed");
    }

    /// Wait until the read loop has stopped, either because the transport
    /// closed or because `close()` was called.
    pub async fn wait_for_shutdown(&self) {
        self.finished.cancelled().await;
    }

    fn shutdown(&self) {
        self.writer_task.abort();
        self.cancel.cancel();
        self.live.store(false, Ordering::Release);
        self.correlator.abandon();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
