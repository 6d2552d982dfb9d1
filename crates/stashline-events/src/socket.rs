//! Bus client reading newline-delimited JSON records from a socket.
//!
//! Each line published by the host bus is one record of the form
//! `{"tag": "salt/job/<jid>/new", "data": {...}}`. Blank lines are ignored.
//! Lines that do not decode (bad JSON, invalid UTF-8) or exceed the record
//! size limit are logged and skipped. End of stream closes the subscription.
//! Only read failures on the connection itself are fatal.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::payloads::Event;
use crate::subscription::{
    BusRole, EventBusClient, Subscription, SubscriptionItem, SubscriptionRequest, Transport,
};

/// Default time allowed for establishing the bus connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on a single wire record, newline excluded.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Client dialling the host bus over its IPC socket or loopback TCP port.
#[derive(Debug, Clone, Copy)]
pub struct SocketBusClient {
    connect_timeout: Duration,
    max_record_bytes: usize,
}

impl SocketBusClient {
    /// Client using the default connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Override the largest record accepted; longer lines are discarded.
    #[must_use]
    pub const fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    async fn connect(&self, request: &SubscriptionRequest) -> SubscriptionResult<BoxedReader> {
        let endpoint = request.endpoint();
        let connect_error = |source: io::Error| SubscriptionError::Connect {
            role: request.role,
            endpoint: endpoint.clone(),
            source,
        };
        let dial = async {
            match request.transport {
                Transport::Tcp => TcpStream::connect(request.tcp_addr())
                    .await
                    .map(|stream| Box::new(stream) as BoxedReader)
                    .map_err(|source| connect_error(source)),
                Transport::Ipc => connect_ipc(request).await.map_err(|err| match err {
                    IpcDialError::Io(source) => connect_error(source),
                    IpcDialError::Unsupported => SubscriptionError::UnsupportedTransport {
                        transport: Transport::Ipc,
                        reason: "unix_sockets_unavailable",
                    },
                }),
            }
        };
        tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| {
                connect_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out connecting to event bus",
                ))
            })?
    }
}

impl Default for SocketBusClient {
    fn default() -> Self {
        Self::new()
    }
}

enum IpcDialError {
    Io(io::Error),
    #[cfg_attr(unix, allow(dead_code))]
    Unsupported,
}

#[cfg(unix)]
async fn connect_ipc(request: &SubscriptionRequest) -> Result<BoxedReader, IpcDialError> {
    tokio::net::UnixStream::connect(request.ipc_path())
        .await
        .map(|stream| Box::new(stream) as BoxedReader)
        .map_err(IpcDialError::Io)
}

#[cfg(not(unix))]
async fn connect_ipc(_request: &SubscriptionRequest) -> Result<BoxedReader, IpcDialError> {
    Err(IpcDialError::Unsupported)
}

#[async_trait]
impl EventBusClient for SocketBusClient {
    async fn open(
        &self,
        request: &SubscriptionRequest,
    ) -> SubscriptionResult<Box<dyn Subscription>> {
        let reader = self.connect(request).await?;
        let endpoint = request.endpoint();
        debug!(role = %request.role, endpoint = %endpoint, "connected to event bus socket");
        Ok(Box::new(SocketSubscription {
            role: request.role,
            endpoint,
            reader: Some(BufReader::new(reader)),
            max_record_bytes: self.max_record_bytes,
            buffer: Vec::new(),
        }))
    }
}

struct SocketSubscription {
    role: BusRole,
    endpoint: String,
    reader: Option<BufReader<BoxedReader>>,
    max_record_bytes: usize,
    buffer: Vec<u8>,
}

enum LineRead {
    Record,
    Oversized,
    Eof,
}

/// Read one newline-terminated line into `buffer`, holding at most `limit`
/// bytes of it in memory. Longer lines are drained and reported as
/// [`LineRead::Oversized`].
async fn read_line<R>(reader: &mut R, buffer: &mut Vec<u8>, limit: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let window = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    buffer.clear();
    let read = (&mut *reader).take(window).read_until(b'\n', buffer).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buffer.last() == Some(&b'\n') || buffer.len() <= limit {
        return Ok(LineRead::Record);
    }
    loop {
        buffer.clear();
        let drained = (&mut *reader).take(window).read_until(b'\n', buffer).await?;
        if drained == 0 || buffer.last() == Some(&b'\n') {
            break;
        }
    }
    buffer.clear();
    Ok(LineRead::Oversized)
}

#[async_trait]
impl Subscription for SocketSubscription {
    async fn next_item(&mut self) -> SubscriptionResult<SubscriptionItem> {
        let role = self.role;
        loop {
            let reader = self
                .reader
                .as_mut()
                .ok_or(SubscriptionError::Closed { role })?;
            match read_line(reader, &mut self.buffer, self.max_record_bytes).await {
                Ok(LineRead::Record) => {
                    let record = self.buffer.trim_ascii();
                    if record.is_empty() {
                        continue;
                    }
                    match parse_record(record) {
                        Ok(event) => return Ok(SubscriptionItem::Event(event)),
                        Err(err) => {
                            warn!(
                                endpoint = %self.endpoint,
                                error = %err,
                                "discarding malformed event record"
                            );
                        }
                    }
                }
                Ok(LineRead::Oversized) => {
                    warn!(
                        endpoint = %self.endpoint,
                        limit = self.max_record_bytes,
                        "discarding oversized event record"
                    );
                }
                Ok(LineRead::Eof) => {
                    self.reader = None;
                    return Err(SubscriptionError::Closed { role });
                }
                Err(source) => {
                    self.reader = None;
                    return Err(SubscriptionError::Read {
                        endpoint: self.endpoint.clone(),
                        source,
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        self.reader = None;
        self.buffer = Vec::new();
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Parse one wire record into an event.
///
/// # Errors
///
/// Returns an error when the bytes are not a UTF-8 JSON object with a string
/// `tag` and an optional object `data`.
pub fn parse_record(line: &[u8]) -> Result<Event, serde_json::Error> {
    serde_json::from_slice(line)
}
