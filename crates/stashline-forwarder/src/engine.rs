//! Forwarding control loop.
//!
//! # Design
//! - One sequential loop: wait for an event, filter it, deliver it inline.
//! - Only the wait is cancellable; an in-flight delivery runs to completion
//!   or to its timeout.
//! - The subscription is closed exactly once on every exit path.

use std::sync::Arc;

use stashline_config::{
    DeliveryPolicy, ForwarderSection, ForwarderSettings, HostOptions, StashlineConfig,
};
use stashline_events::{Event, EventBusClient, SubscriptionRequest};
use stashline_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::error::{ForwarderError, ForwarderResult};
use crate::filter::EventFilter;
use crate::http::HttpClient;
use crate::sink::DeliverySink;
use crate::source::EventSource;

/// Collaborators injected into the forwarder.
#[derive(Clone)]
pub struct ForwarderDeps {
    /// Client opening the bus subscription.
    pub bus: Arc<dyn EventBusClient>,
    /// Client performing the HTTP POSTs.
    pub http: Arc<dyn HttpClient>,
    /// Metrics registry updated by the loop.
    pub metrics: Metrics,
}

/// Configured forwarding loop, ready to run.
pub struct Forwarder {
    url: Url,
    request: SubscriptionRequest,
    filter: EventFilter,
    sink: DeliverySink,
    bus: Arc<dyn EventBusClient>,
    metrics: Metrics,
}

impl Forwarder {
    /// Build a forwarder from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::InvalidPattern`] when a tag pattern cannot
    /// be compiled.
    pub fn new(config: &StashlineConfig, deps: ForwarderDeps) -> ForwarderResult<Self> {
        Self::from_parts(&config.forwarder, &config.host, config.delivery, deps)
    }

    /// Build a forwarder from individual configuration sections.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::InvalidPattern`] when a tag pattern cannot
    /// be compiled.
    pub fn from_parts(
        settings: &ForwarderSettings,
        host: &HostOptions,
        policy: DeliveryPolicy,
        deps: ForwarderDeps,
    ) -> ForwarderResult<Self> {
        let filter = EventFilter::new(settings)?;
        let ForwarderDeps { bus, http, metrics } = deps;
        Ok(Self {
            url: settings.url.clone(),
            request: host.subscription_request(),
            filter,
            sink: DeliverySink::new(http, policy, metrics.clone()),
            bus,
            metrics,
        })
    }

    /// Run until `cancel` fires (returns `Ok`) or the subscription fails.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::Subscription`] when the subscription cannot
    /// be opened or is lost.
    pub async fn run(self, cancel: CancellationToken) -> ForwarderResult<()> {
        let mut source =
            EventSource::open(self.bus.as_ref(), &self.request, self.metrics.clone()).await?;
        info!(
            url = %self.url,
            tag_patterns = self.filter.tags().len(),
            allowed_funs = self.filter.funs().len(),
            max_attempts = self.sink.policy().max_attempts,
            "forwarder started"
        );

        let outcome = loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("forwarder stop requested");
                    break Ok(());
                }
                next = source.next_event() => match next {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(error = %err, kind = err.kind(), "event subscription lost");
                        break Err(ForwarderError::from(err));
                    }
                },
            };
            self.handle(event).await;
        };

        source.close().await;
        outcome
    }

    /// Run the loop on a background task.
    #[must_use]
    pub fn spawn(self) -> ForwarderHandle {
        let cancel = CancellationToken::new();
        let span = info_span!(
            "forwarder",
            role = %self.request.role,
            endpoint = %self.request.endpoint()
        );
        let join = tokio::spawn(self.run(cancel.clone()).instrument(span));
        ForwarderHandle { cancel, join }
    }

    async fn handle(&self, event: Event) {
        let decision = self.filter.evaluate(&event);
        if let Some(reason) = decision.reason() {
            self.metrics.inc_filtered(reason);
            debug!(tag = event.tag(), reason = reason.as_str(), "event filtered");
            return;
        }

        match self.sink.deliver(&self.url, event.data()).await {
            Ok(outcome) => {
                self.metrics.inc_forwarded();
                debug!(
                    tag = event.tag(),
                    status = outcome.status,
                    attempts = outcome.attempts,
                    "event forwarded"
                );
            }
            Err(err) => {
                self.metrics.inc_delivery_failure(err.kind());
                warn!(
                    tag = event.tag(),
                    kind = err.kind().as_str(),
                    error = %err,
                    detail = ?err,
                    "event delivery failed"
                );
            }
        }
    }
}

/// Validate the engine options, then run a forwarder until cancelled or the
/// subscription fails.
///
/// Configuration problems are reported before any subscription is opened.
///
/// # Errors
///
/// Returns [`ForwarderError::Configuration`] for a missing or malformed
/// `url`, [`ForwarderError::InvalidPattern`] for a tag pattern that cannot be
/// compiled, and [`ForwarderError::Subscription`] when the bus fails.
pub async fn start(
    options: ForwarderSection,
    host: &HostOptions,
    policy: DeliveryPolicy,
    deps: ForwarderDeps,
    cancel: CancellationToken,
) -> ForwarderResult<()> {
    let settings = ForwarderSettings::from_section(options)?;
    Forwarder::from_parts(&settings, host, policy, deps)?
        .run(cancel)
        .await
}

/// Handle to a forwarder running on a background task.
pub struct ForwarderHandle {
    cancel: CancellationToken,
    join: JoinHandle<ForwarderResult<()>>,
}

impl ForwarderHandle {
    /// Cancel the loop and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or [`ForwarderError::Join`] if the task
    /// panicked.
    pub async fn stop(self) -> ForwarderResult<()> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the loop to finish without cancelling it.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or [`ForwarderError::Join`] if the task
    /// panicked.
    pub async fn wait(self) -> ForwarderResult<()> {
        self.join
            .await
            .map_err(|source| ForwarderError::Join { source })?
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
