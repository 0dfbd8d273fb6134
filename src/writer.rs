//! Dedicated writer task for outbound packets.
//!
//! Callers hand encoded packets to the writer task over an mpsc channel and
//! wait for the task to report that the transport accepted the bytes.
//!
//! ```text
//! issue() ─► mpsc::Sender<OutboundPacket> ─► Writer Task ─► Transport
//!    ▲                                           │
//!    └────────────── oneshot ack ◄───────────────┘
//! ```
//!
//! Aborting the task (see [`Connection::close`](crate::Connection::close))
//! cancels an in-flight write.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{BmapError, Result};
use crate::protocol::to_hex;

/// An encoded packet queued for the transport.
#[derive(Debug)]
pub struct OutboundPacket {
    /// Wire bytes (header + payload).
    pub bytes: Bytes,
    /// Completed once the transport accepted or rejected the bytes.
    done: oneshot::Sender<std::io::Result<()>>,
}

/// Handle for sending packets to the writer task.
///
/// This is cheaply cloneable.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundPacket>,
}

impl WriterHandle {
    /// Queue a packet and wait until it has been written and flushed.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the writer task is gone, `Io` if the transport
    /// rejected the write.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(OutboundPacket { bytes, done })
            .await
            .map_err(|_| BmapError::ConnectionClosed)?;

        match ack.await {
            Ok(result) => result.map_err(BmapError::Io),
            Err(_) => Err(BmapError::ConnectionClosed),
        }
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending packets.
///
/// The task ends when every handle is dropped or after the first failed
/// write, which is reported to the caller that queued it.
pub fn spawn_writer_task<W>(writer: W, queue: usize) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives packets and writes them in order.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundPacket>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        tracing::trace!("Write {}", to_hex(&packet.bytes));

        // The caller may have given up waiting; the write still happened.
        match write_packet(&mut writer, &packet.bytes).await {
            Ok(()) => {
                let _ = packet.done.send(Ok(()));
            }
            Err(e) => {
                tracing::error!("Writer terminated: {}", e);
                let _ = packet.done.send(Err(std::io::Error::new(e.kind(), e.to_string())));
                return;
            }
        }
    }
    tracing::debug!("Writer channel closed");
}

async fn write_packet<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet, PacketKind};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (host, mut device) = tokio::io::duplex(64);
        let (handle, _task) = spawn_writer_task(host, 4);

        let packet = encode_packet(0x0001, PacketKind::Get, &[]).unwrap();
        handle.send(packet).await.unwrap();

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x00, 0x01, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_writes_keep_order() {
        let (host, mut device) = tokio::io::duplex(256);
        let (handle, _task) = spawn_writer_task(host, 4);

        for i in 0..5u8 {
            let packet = encode_packet(0x0505, PacketKind::Set, &[i]).unwrap();
            handle.send(packet).await.unwrap();
        }

        let mut buf = vec![0u8; 25];
        device.read_exact(&mut buf).await.unwrap();
        let volumes: Vec<u8> = buf.chunks(5).map(|p| p[4]).collect();
        assert_eq!(volumes, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (host, _device) = tokio::io::duplex(64);
        let (handle, task) = spawn_writer_task(host, 4);

        drop(handle);

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "port unplugged",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_error_reaches_caller_and_stops_task() {
        let (handle, task) = spawn_writer_task(BrokenPipe, 4);

        let packet = encode_packet(0x0001, PacketKind::Get, &[]).unwrap();
        let err = handle.send(packet.clone()).await.unwrap_err();
        match err {
            BmapError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "port unplugged");
            }
            other => panic!("unexpected error {:?}", other),
        }

        task.await.unwrap();
        assert!(matches!(
            handle.send(packet).await,
            Err(BmapError::ConnectionClosed)
        ));
        assert!(handle.is_closed());
    }
}
