#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(unreachable_pub, clippy::all, clippy::pedantic, clippy::nursery)]

//! Event forwarding engine: bus subscription, tag/function filtering, and
//! HTTP delivery of event data as JSON.
//!
//! Layout: `engine.rs` (control loop and task handle), `filter.rs` (tag globs
//! and function allow-list), `sink.rs` (delivery with retry policy),
//! `http.rs` (HTTP client seam and `reqwest` implementation), `source.rs`
//! (subscription adapter), `error.rs` (fatal and delivery errors).

pub mod engine;
pub mod error;
pub mod filter;
pub mod http;
pub mod sink;
pub mod source;

pub use engine::{Forwarder, ForwarderDeps, ForwarderHandle, start};
pub use error::{DeliveryError, ForwarderError, ForwarderResult};
pub use filter::{EventFilter, FilterDecision, FunAllowList, TagMatcher, should_forward};
pub use http::{HttpClient, HttpClientError, HttpResponse, ReqwestClient, ResponseBody};
pub use sink::{DeliverySink, HttpOutcome, JSON_CONTENT_TYPE};
pub use source::EventSource;
