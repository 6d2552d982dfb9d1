//! Bus roles and the subscription seam consumed by the forwarder.
//!
//! # Design
//! - The host runs one bus per role; which one a subscriber joins is decided
//!   by the host identity (`<name>_master` hosts are coordinators).
//! - `EventBusClient` opens subscriptions; `Subscription` yields events and
//!   must release its connection on `close` and on drop.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::payloads::Event;
use crate::routing::{EventBus, EventStream};

/// Suffix marking a host identity as the coordinator role.
pub const MASTER_ID_SUFFIX: &str = "_master";

/// Default loopback publish port for the coordinator bus over TCP.
pub const DEFAULT_TCP_MASTER_PUB_PORT: u16 = 4512;

/// Default loopback publish port for the worker bus over TCP.
pub const DEFAULT_TCP_MINION_PUB_PORT: u16 = 4510;

/// Bus scope a subscriber attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusRole {
    /// Primary coordinator bus.
    Master,
    /// Worker bus.
    Minion,
}

impl BusRole {
    /// Derive the role from the host identity string.
    #[must_use]
    pub fn from_host_id(id: &str) -> Self {
        if id.ends_with(MASTER_ID_SUFFIX) {
            Self::Master
        } else {
            Self::Minion
        }
    }

    /// Render the role as its lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Minion => "minion",
        }
    }
}

impl Display for BusRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Wire transport used to reach the host bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Unix domain socket inside the host's socket directory.
    #[default]
    Ipc,
    /// Loopback TCP publish port.
    Tcp,
}

impl Transport {
    /// Render the transport as its lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Tcp => "tcp",
        }
    }
}

impl Display for Transport {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ipc" => Ok(Self::Ipc),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unsupported transport '{other}'")),
        }
    }
}

/// Loopback publish ports used by the TCP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpPorts {
    /// Publish port of the coordinator bus.
    pub master_pub: u16,
    /// Publish port of the worker bus.
    pub minion_pub: u16,
}

impl Default for TcpPorts {
    fn default() -> Self {
        Self {
            master_pub: DEFAULT_TCP_MASTER_PUB_PORT,
            minion_pub: DEFAULT_TCP_MINION_PUB_PORT,
        }
    }
}

/// Parameters used to open a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Bus scope to join.
    pub role: BusRole,
    /// Directory holding the bus IPC sockets.
    pub sock_dir: PathBuf,
    /// Transport used to reach the bus.
    pub transport: Transport,
    /// Ports used when `transport` is TCP.
    pub tcp_ports: TcpPorts,
}

impl SubscriptionRequest {
    /// Request an IPC subscription for `role` under `sock_dir`.
    #[must_use]
    pub fn new(role: BusRole, sock_dir: impl Into<PathBuf>) -> Self {
        Self {
            role,
            sock_dir: sock_dir.into(),
            transport: Transport::Ipc,
            tcp_ports: TcpPorts::default(),
        }
    }

    /// Override the transport.
    #[must_use]
    pub const fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Override the TCP publish ports.
    #[must_use]
    pub const fn with_tcp_ports(mut self, tcp_ports: TcpPorts) -> Self {
        self.tcp_ports = tcp_ports;
        self
    }

    /// Path of the role's publish socket under the socket directory.
    #[must_use]
    pub fn ipc_path(&self) -> PathBuf {
        ipc_path_for(&self.sock_dir, self.role)
    }

    /// Loopback address of the role's TCP publish port.
    #[must_use]
    pub fn tcp_addr(&self) -> SocketAddr {
        let port = match self.role {
            BusRole::Master => self.tcp_ports.master_pub,
            BusRole::Minion => self.tcp_ports.minion_pub,
        };
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    /// Human-readable endpoint for logs and errors.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.transport {
            Transport::Ipc => self.ipc_path().display().to_string(),
            Transport::Tcp => self.tcp_addr().to_string(),
        }
    }
}

/// Publish socket path for `role` under `sock_dir`.
#[must_use]
pub fn ipc_path_for(sock_dir: &Path, role: BusRole) -> PathBuf {
    sock_dir.join(format!("{role}_event_pub.ipc"))
}

/// Item yielded by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
    /// A tagged event.
    Event(Event),
    /// The subscriber fell behind and the bus dropped events for it.
    Gap {
        /// Number of events that were skipped.
        skipped: u64,
    },
}

/// Client able to open subscriptions on the host bus.
#[async_trait]
pub trait EventBusClient: Send + Sync {
    /// Open a subscription scoped to the request's role.
    ///
    /// # Errors
    ///
    /// Returns an error when the bus cannot be reached.
    async fn open(&self, request: &SubscriptionRequest)
    -> SubscriptionResult<Box<dyn Subscription>>;
}

/// Open subscription handle. Owned by exactly one consumer.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next item on the bus.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription is lost or closed; the
    /// subscription cannot be resumed afterwards.
    async fn next_item(&mut self) -> SubscriptionResult<SubscriptionItem>;

    /// Release the underlying connection. Calling it more than once is a no-op.
    async fn close(&mut self);

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

/// Bus client serving subscriptions from in-process [`EventBus`] instances.
#[derive(Clone, Default)]
pub struct LocalBusClient {
    buses: HashMap<BusRole, EventBus>,
}

impl LocalBusClient {
    /// Client without any attached bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the bus serving `role`.
    #[must_use]
    pub fn with_bus(mut self, role: BusRole, bus: EventBus) -> Self {
        self.buses.insert(role, bus);
        self
    }
}

#[async_trait]
impl EventBusClient for LocalBusClient {
    async fn open(
        &self,
        request: &SubscriptionRequest,
    ) -> SubscriptionResult<Box<dyn Subscription>> {
        let bus = self
            .buses
            .get(&request.role)
            .ok_or(SubscriptionError::Unavailable { role: request.role })?;
        Ok(Box::new(LocalSubscription {
            role: request.role,
            endpoint: format!("local:{}", request.role),
            stream: Some(bus.subscribe()),
        }))
    }
}

struct LocalSubscription {
    role: BusRole,
    endpoint: String,
    stream: Option<EventStream>,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next_item(&mut self) -> SubscriptionResult<SubscriptionItem> {
        let role = self.role;
        let stream = self
            .stream
            .as_mut()
            .ok_or(SubscriptionError::Closed { role })?;
        match stream.next().await {
            Some(Ok(event)) => Ok(SubscriptionItem::Event(event)),
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                Ok(SubscriptionItem::Gap { skipped })
            }
            None => {
                self.stream = None;
                Err(SubscriptionError::Closed { role })
            }
        }
    }

    async fn close(&mut self) {
        self.stream = None;
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn role_follows_host_id_suffix() {
        assert_eq!(BusRole::from_host_id("salt_master"), BusRole::Master);
        assert_eq!(BusRole::from_host_id("web01"), BusRole::Minion);
        assert_eq!(BusRole::from_host_id("master"), BusRole::Minion);
        assert_eq!(BusRole::from_host_id("_master_backup"), BusRole::Minion);
    }

    #[test]
    fn transport_parses_known_names() {
        assert_eq!("ipc".parse::<Transport>(), Ok(Transport::Ipc));
        assert_eq!(" TCP ".parse::<Transport>(), Ok(Transport::Tcp));
        assert!("zeromq".parse::<Transport>().is_err());
    }

    #[test]
    fn request_endpoints_follow_role() {
        let master = SubscriptionRequest::new(BusRole::Master, "/var/run/salt/master");
        assert_eq!(
            master.ipc_path(),
            PathBuf::from("/var/run/salt/master/master_event_pub.ipc")
        );
        assert_eq!(master.tcp_addr().port(), DEFAULT_TCP_MASTER_PUB_PORT);

        let minion = SubscriptionRequest::new(BusRole::Minion, "/var/run/salt/minion")
            .with_transport(Transport::Tcp)
            .with_tcp_ports(TcpPorts {
                master_pub: 1,
                minion_pub: 4600,
            });
        assert_eq!(minion.endpoint(), "127.0.0.1:4600");
    }

    #[tokio::test]
    async fn local_client_rejects_unknown_role() {
        let client = LocalBusClient::new().with_bus(BusRole::Master, EventBus::new());
        let request = SubscriptionRequest::new(BusRole::Minion, "/tmp");
        let Err(err) = client.open(&request).await else {
            panic!("minion bus should be unavailable");
        };
        assert!(matches!(
            err,
            SubscriptionError::Unavailable {
                role: BusRole::Minion
            }
        ));
    }

    #[tokio::test]
    async fn local_subscription_yields_events_until_closed() {
        let bus = EventBus::with_capacity(4);
        let client = LocalBusClient::new().with_bus(BusRole::Master, bus.clone());
        let request = SubscriptionRequest::new(BusRole::Master, "/tmp");
        let mut subscription = client.open(&request).await.expect("open");
        assert_eq!(subscription.endpoint(), "local:master");

        let _ = bus.publish(Event::new("salt/job/9/new", Map::new()));
        let item = subscription.next_item().await.expect("event");
        let SubscriptionItem::Event(event) = item else {
            panic!("expected event, got {item:?}");
        };
        assert_eq!(event.tag(), "salt/job/9/new");

        subscription.close().await;
        subscription.close().await;
        assert_eq!(bus.subscriber_count(), 0);
        assert!(matches!(
            subscription.next_item().await,
            Err(SubscriptionError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn local_subscription_reports_gaps_and_bus_shutdown() {
        let bus = EventBus::with_capacity(2);
        let client = LocalBusClient::new().with_bus(BusRole::Minion, bus.clone());
        let request = SubscriptionRequest::new(BusRole::Minion, "/tmp");
        let mut subscription = client.open(&request).await.expect("open");
        for i in 0..4 {
            let _ = bus.publish(Event::new(format!("tick/{i}"), Map::new()));
        }

        assert_eq!(
            subscription.next_item().await.expect("gap"),
            SubscriptionItem::Gap { skipped: 2 }
        );
        drop(client);
        drop(bus);
        let mut tags = Vec::new();
        while let Ok(SubscriptionItem::Event(event)) = subscription.next_item().await {
            tags.push(event.tag().to_string());
        }
        assert_eq!(tags, vec!["tick/2".to_string(), "tick/3".to_string()]);
    }
}
