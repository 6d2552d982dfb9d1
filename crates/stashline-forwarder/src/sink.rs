//! Delivery sink: POST event data as JSON to the destination endpoint.
//!
//! # Design
//! - Only the event's `data` object is sent; the tag is not part of the body.
//! - Failures are returned, never raised past the loop. Retries apply to
//!   transport failures and 5xx statuses, bounded by the delivery policy.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use stashline_config::DeliveryPolicy;
use stashline_telemetry::Metrics;
use tracing::debug;
use url::Url;

use crate::error::DeliveryError;
use crate::http::{HttpClient, HttpClientError, HttpResponse, ResponseBody};

/// Content type sent with every delivery.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Successful delivery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    /// HTTP status code returned.
    pub status: u16,
    /// Decoded response body.
    pub body: ResponseBody,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Posts accepted events to an HTTP endpoint.
#[derive(Clone)]
pub struct DeliverySink {
    client: Arc<dyn HttpClient>,
    policy: DeliveryPolicy,
    metrics: Metrics,
}

impl DeliverySink {
    /// Sink using `client` under the given policy.
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>, policy: DeliveryPolicy, metrics: Metrics) -> Self {
        Self {
            client,
            policy,
            metrics,
        }
    }

    /// Serialize `data` and POST it to `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when serialization fails, no response is
    /// received, or the endpoint answers with a non-success status.
    pub async fn deliver(
        &self,
        url: &Url,
        data: &Map<String, Value>,
    ) -> Result<HttpOutcome, DeliveryError> {
        let body = serde_json::to_vec(data).map_err(|source| DeliveryError::Serialize { source })?;
        let headers = [("Content-Type", JSON_CONTENT_TYPE)];

        let mut attempt = 1;
        loop {
            self.metrics.inc_delivery_attempt();
            let started = Instant::now();
            let result = self.client.post(url, &headers, body.clone(), true).await;
            self.metrics.observe_delivery_latency(started.elapsed());

            let retryable = match &result {
                Ok(response) if response.is_success() => false,
                Ok(response) => response.status >= 500,
                Err(_) => true,
            };
            if retryable && self.policy.allows_retry_after(attempt) {
                let backoff = self.policy.backoff_after(attempt);
                debug!(
                    url = %url,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying delivery"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
            return finish(url, attempt, result);
        }
    }

    /// Active delivery policy.
    #[must_use]
    pub const fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }
}

fn finish(
    url: &Url,
    attempts: u32,
    result: Result<HttpResponse, HttpClientError>,
) -> Result<HttpOutcome, DeliveryError> {
    match result {
        Ok(HttpResponse { status, body }) if (200..300).contains(&status) => Ok(HttpOutcome {
            status,
            body,
            attempts,
        }),
        Ok(HttpResponse { status, body }) => Err(DeliveryError::Status {
            url: url.to_string(),
            status,
            attempts,
            body,
        }),
        Err(source) => Err(DeliveryError::Transport {
            url: url.to_string(),
            attempts,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use serde_json::json;

    use crate::http::ReqwestClient;

    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<HttpResponse, HttpClientError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<HttpResponse, HttpClientError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn post(
            &self,
            _url: &Url,
            _headers: &[(&str, &str)],
            _body: Vec<u8>,
            _decode: bool,
        ) -> Result<HttpResponse, HttpClientError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Ok(status(200)))
        }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            body: ResponseBody::Empty,
        }
    }

    fn refused() -> HttpClientError {
        HttpClientError::Request {
            source: Box::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }

    fn policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn url() -> Url {
        Url::parse("http://logstash.local:8080/salt").expect("static url")
    }

    #[tokio::test]
    async fn posts_data_object_as_json() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/salt")
                .header("content-type", "application/json")
                .json_body(json!({"fun": "test.ping", "jid": "20240101"}));
            then.status(200).json_body(json!({"ok": true}));
        });

        let metrics = Metrics::new()?;
        let sink = DeliverySink::new(
            Arc::new(ReqwestClient::new(Duration::from_secs(5))?),
            DeliveryPolicy::default(),
            metrics.clone(),
        );
        let data = json!({"fun": "test.ping", "jid": "20240101"});
        let data = data.as_object().cloned().unwrap_or_default();
        let outcome = sink.deliver(&Url::parse(&server.url("/salt"))?, &data).await?;

        mock.assert();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, ResponseBody::Json(json!({"ok": true})));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(metrics.snapshot().delivery_attempts_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn server_error_is_returned_without_retry_by_default() -> Result<()> {
        let client = ScriptedClient::new(vec![Ok(status(500))]);
        let sink = DeliverySink::new(client.clone(), DeliveryPolicy::default(), Metrics::new()?);
        let err = sink
            .deliver(&url(), &Map::new())
            .await
            .expect_err("500 is a failure");
        assert!(matches!(
            err,
            DeliveryError::Status {
                status: 500,
                attempts: 1,
                ..
            }
        ));
        assert_eq!(client.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn transient_failures_are_retried_up_to_limit() -> Result<()> {
        let client = ScriptedClient::new(vec![Err(refused()), Ok(status(503)), Ok(status(202))]);
        let metrics = Metrics::new()?;
        let sink = DeliverySink::new(client.clone(), policy(3), metrics.clone());
        let outcome = sink.deliver(&url(), &Map::new()).await?;
        assert_eq!(outcome.status, 202);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(client.calls(), 3);
        assert_eq!(metrics.snapshot().delivery_attempts_total, 3);

        let client = ScriptedClient::new(vec![Err(refused()), Err(refused())]);
        let sink = DeliverySink::new(client.clone(), policy(2), Metrics::new()?);
        let err = sink
            .deliver(&url(), &Map::new())
            .await
            .expect_err("both attempts fail");
        assert!(matches!(err, DeliveryError::Transport { attempts: 2, .. }));
        assert_eq!(client.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_are_never_retried() -> Result<()> {
        let client = ScriptedClient::new(vec![Ok(status(400)), Ok(status(200))]);
        let sink = DeliverySink::new(client.clone(), policy(5), Metrics::new()?);
        let err = sink
            .deliver(&url(), &Map::new())
            .await
            .expect_err("400 is final");
        assert!(matches!(err, DeliveryError::Status { status: 400, .. }));
        assert_eq!(client.calls(), 1);
        Ok(())
    }
}
