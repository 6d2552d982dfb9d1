//! Newline-delimited JSON bus publisher for socket-level tests.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use stashline_events::Event;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fixtures::wire_line;

/// Loopback TCP publisher serving one subscriber.
///
/// Lines queued with [`BusPublisher::publish`] are written in order once a
/// subscriber connects. Dropping the publisher (or calling
/// [`BusPublisher::hang_up`]) ends the stream.
pub struct BusPublisher {
    addr: SocketAddr,
    sender: Option<mpsc::UnboundedSender<String>>,
    task: JoinHandle<Result<()>>,
}

impl BusPublisher {
    /// Bind an ephemeral loopback port and wait for a subscriber in the background.
    ///
    /// # Errors
    ///
    /// Returns an error when the port cannot be bound.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind publisher port")?;
        let addr = listener.local_addr()?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            while let Some(line) = receiver.recv().await {
                socket.write_all(line.as_bytes()).await?;
            }
            socket.shutdown().await?;
            Ok::<_, anyhow::Error>(())
        });
        Ok(Self {
            addr,
            sender: Some(sender),
            task,
        })
    }

    /// Bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue an event for the subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error after [`BusPublisher::hang_up`] or once the
    /// connection task has stopped.
    pub fn publish(&self, event: &Event) -> Result<()> {
        self.publish_raw(wire_line(event))
    }

    /// Queue a raw line (newline appended when missing).
    ///
    /// # Errors
    ///
    /// Returns an error after [`BusPublisher::hang_up`] or once the
    /// connection task has stopped.
    pub fn publish_raw(&self, line: impl Into<String>) -> Result<()> {
        let mut line = line.into();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.sender
            .as_ref()
            .context("publisher already hung up")?
            .send(line)
            .context("publisher connection closed")
    }

    /// Flush queued lines, close the connection, and wait for the writer.
    ///
    /// # Errors
    ///
    /// Returns an error when the writer task failed.
    pub async fn hang_up(mut self) -> Result<()> {
        self.sender = None;
        self.task.await.context("publisher task panicked")?
    }
}
