#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(unreachable_pub, clippy::all, clippy::pedantic, clippy::nursery)]

//! Event model and bus subscription interface for Stashline.
//!
//! Layout: `payloads.rs` (event records), `routing.rs` (in-process broadcast
//! bus), `subscription.rs` (role selection and the subscription seam),
//! `socket.rs` (newline-delimited JSON bus client over IPC/TCP sockets),
//! `error.rs` (subscription errors).

pub mod error;
pub mod payloads;
pub mod routing;
pub mod socket;
pub mod subscription;

pub use error::{SubscriptionError, SubscriptionResult};
pub use payloads::{DEFAULT_BUS_CAPACITY, Event};
pub use routing::{EventBus, EventStream};
pub use socket::SocketBusClient;
pub use subscription::{
    BusRole, EventBusClient, LocalBusClient, Subscription, SubscriptionItem, SubscriptionRequest,
    TcpPorts, Transport,
};
