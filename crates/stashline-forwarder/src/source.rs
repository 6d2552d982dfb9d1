//! Event source adapter over a bus subscription.

use stashline_events::{
    BusRole, Event, EventBusClient, Subscription, SubscriptionError, SubscriptionItem,
    SubscriptionRequest, SubscriptionResult,
};
use stashline_telemetry::Metrics;
use tracing::{debug, info, warn};

/// Owns one subscription and releases it exactly once.
pub struct EventSource {
    role: BusRole,
    endpoint: String,
    subscription: Option<Box<dyn Subscription>>,
    metrics: Metrics,
}

impl EventSource {
    /// Open a subscription on the bus for the request's role.
    ///
    /// # Errors
    ///
    /// Returns the client's error when the bus cannot be reached.
    pub async fn open(
        client: &dyn EventBusClient,
        request: &SubscriptionRequest,
        metrics: Metrics,
    ) -> SubscriptionResult<Self> {
        let subscription = client.open(request).await?;
        let endpoint = subscription.endpoint().to_string();
        info!(role = %request.role, endpoint = %endpoint, "event subscription opened");
        Ok(Self {
            role: request.role,
            endpoint,
            subscription: Some(subscription),
            metrics,
        })
    }

    /// Wait for the next event, skipping over bus gaps.
    ///
    /// Cancel-safe: dropping the future loses no event that was already read.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription was lost or already closed.
    pub async fn next_event(&mut self) -> SubscriptionResult<Event> {
        let role = self.role;
        loop {
            let subscription = self
                .subscription
                .as_mut()
                .ok_or(SubscriptionError::Closed { role })?;
            match subscription.next_item().await? {
                SubscriptionItem::Event(event) => {
                    self.metrics.inc_received();
                    return Ok(event);
                }
                SubscriptionItem::Gap { skipped } => {
                    self.metrics.add_lagged(skipped);
                    warn!(endpoint = %self.endpoint, skipped, "event subscriber lagged; events dropped");
                }
            }
        }
    }

    /// Release the subscription. Later calls are no-ops.
    pub async fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close().await;
            info!(role = %self.role, endpoint = %self.endpoint, "event subscription closed");
        }
    }

    /// Returns `true` until [`EventSource::close`] has run.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Endpoint the subscription reads from.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if self.subscription.is_some() {
            debug!(endpoint = %self.endpoint, "event source dropped while open; releasing connection");
        }
    }
}
