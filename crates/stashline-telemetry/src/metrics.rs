//! Prometheus-backed forwarding metrics and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values come from closed enums so cardinality stays fixed.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Why an event was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// The tag matched no configured pattern.
    TagMismatch,
    /// The function name was not in the allow-list.
    FunNotAllowed,
    /// Both checks rejected the event.
    TagAndFun,
}

impl FilterReason {
    /// Stable label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TagMismatch => "tag_mismatch",
            Self::FunNotAllowed => "fun_not_allowed",
            Self::TagAndFun => "tag_and_fun",
        }
    }
}

/// Category of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailureKind {
    /// The event data could not be encoded.
    Serialize,
    /// The request never produced a response.
    Transport,
    /// The endpoint answered with a non-success status.
    Status,
}

impl DeliveryFailureKind {
    /// Stable label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serialize => "serialize",
            Self::Transport => "transport",
            Self::Status => "status",
        }
    }
}

/// Prometheus-backed metrics registry for the forwarding loop.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    events_received_total: IntCounter,
    events_forwarded_total: IntCounter,
    events_filtered_total: IntCounterVec,
    delivery_attempts_total: IntCounter,
    delivery_failures_total: IntCounterVec,
    bus_lagged_events_total: IntCounter,
    last_delivery_latency_ms: IntGauge,
}

/// Snapshot of the forwarding counters for shutdown reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events read from the bus.
    pub events_received_total: u64,
    /// Events delivered with a success status.
    pub events_forwarded_total: u64,
    /// Events dropped by the tag or function filter.
    pub events_filtered_total: u64,
    /// HTTP attempts made, retries included.
    pub delivery_attempts_total: u64,
    /// Events whose delivery ultimately failed.
    pub delivery_failures_total: u64,
    /// Events the bus dropped because the subscriber fell behind.
    pub bus_lagged_events_total: u64,
    /// Latency (ms) of the most recent delivery attempt.
    pub last_delivery_latency_ms: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the forwarding collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_received_total = counter(
            &registry,
            "events_received_total",
            "Events read from the event bus",
        )?;
        let events_forwarded_total = counter(
            &registry,
            "events_forwarded_total",
            "Events delivered to the destination endpoint",
        )?;
        let events_filtered_total = counter_vec(
            &registry,
            "events_filtered_total",
            "Events dropped by the forwarding filter",
            &["reason"],
        )?;
        let delivery_attempts_total = counter(
            &registry,
            "delivery_attempts_total",
            "HTTP delivery attempts including retries",
        )?;
        let delivery_failures_total = counter_vec(
            &registry,
            "delivery_failures_total",
            "Events whose delivery failed by failure kind",
            &["kind"],
        )?;
        let bus_lagged_events_total = counter(
            &registry,
            "bus_lagged_events_total",
            "Events skipped because the subscriber lagged behind the bus",
        )?;
        let last_delivery_latency_ms = IntGauge::with_opts(Opts::new(
            "last_delivery_latency_ms",
            "Latency of the most recent delivery attempt (ms)",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "last_delivery_latency_ms",
            source,
        })?;
        register(
            &registry,
            "last_delivery_latency_ms",
            Box::new(last_delivery_latency_ms.clone()),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                events_received_total,
                events_forwarded_total,
                events_filtered_total,
                delivery_attempts_total,
                delivery_failures_total,
                bus_lagged_events_total,
                last_delivery_latency_ms,
            }),
        })
    }

    /// Count an event read from the bus.
    pub fn inc_received(&self) {
        self.inner.events_received_total.inc();
    }

    /// Count an event delivered successfully.
    pub fn inc_forwarded(&self) {
        self.inner.events_forwarded_total.inc();
    }

    /// Count an event dropped by the filter.
    pub fn inc_filtered(&self, reason: FilterReason) {
        self.inner
            .events_filtered_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Count one HTTP attempt.
    pub fn inc_delivery_attempt(&self) {
        self.inner.delivery_attempts_total.inc();
    }

    /// Count an event whose delivery failed.
    pub fn inc_delivery_failure(&self, kind: DeliveryFailureKind) {
        self.inner
            .delivery_failures_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Count events skipped by the bus.
    pub fn add_lagged(&self, skipped: u64) {
        self.inner.bus_lagged_events_total.inc_by(skipped);
    }

    /// Record the latency of the latest delivery attempt.
    pub fn observe_delivery_latency(&self, duration: Duration) {
        self.inner
            .last_delivery_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Take a point-in-time snapshot of the forwarding counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received_total: self.inner.events_received_total.get(),
            events_forwarded_total: self.inner.events_forwarded_total.get(),
            events_filtered_total: sum_labels(
                &self.inner.events_filtered_total,
                &[
                    FilterReason::TagMismatch.as_str(),
                    FilterReason::FunNotAllowed.as_str(),
                    FilterReason::TagAndFun.as_str(),
                ],
            ),
            delivery_attempts_total: self.inner.delivery_attempts_total.get(),
            delivery_failures_total: sum_labels(
                &self.inner.delivery_failures_total,
                &[
                    DeliveryFailureKind::Serialize.as_str(),
                    DeliveryFailureKind::Transport.as_str(),
                    DeliveryFailureKind::Status.as_str(),
                ],
            ),
            bus_lagged_events_total: self.inner.bus_lagged_events_total.get(),
            last_delivery_latency_ms: self.inner.last_delivery_latency_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn counter(registry: &Registry, name: &'static str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    register(registry, name, Box::new(counter.clone()))?;
    Ok(counter)
}

fn counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    register(registry, name, Box::new(counter.clone()))?;
    Ok(counter)
}

fn register(
    registry: &Registry,
    name: &'static str,
    collector: Box<dyn prometheus::core::Collector>,
) -> Result<()> {
    registry
        .register(collector)
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

fn sum_labels(counter: &IntCounterVec, values: &[&str]) -> u64 {
    values
        .iter()
        .filter_map(|value| counter.get_metric_with_label_values(&[*value]).ok())
        .map(|metric| metric.get())
        .sum()
}
