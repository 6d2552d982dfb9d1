//! HTTP client seam used by the delivery sink.
//!
//! # Design
//! - The sink depends on [`HttpClient`] only; `reqwest` lives behind
//!   [`ReqwestClient`] so tests can swap in scripted clients.
//! - Response decoding mirrors a lenient web client: JSON when parseable,
//!   text otherwise, nothing for a blank body.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::error::{ForwarderError, ForwarderResult};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Body parsed as JSON.
    Json(Value),
    /// Body that was not valid JSON.
    Text(String),
    /// No body, or decoding was not requested.
    Empty,
}

impl ResponseBody {
    /// Decode raw response bytes.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        if text.trim().is_empty() {
            return Self::Empty;
        }
        serde_json::from_slice(bytes).map_or_else(|_| Self::Text(text.into_owned()), Self::Json)
    }
}

/// Status and body returned by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body.
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Failure to obtain any response.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The request did not complete within the configured timeout.
    #[error("http request timed out")]
    Timeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The request could not be built or sent.
    #[error("http request failed")]
    Request {
        /// Underlying error.
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Minimal HTTP client interface.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST `body` to `url` with the given headers.
    ///
    /// When `decode` is `false` the response body is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error when no response was received. Non-success statuses
    /// are returned as responses.
    async fn post(
        &self,
        url: &Url,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        decode: bool,
    ) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Build a client applying `timeout` to every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> ForwarderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stashline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ForwarderError::HttpClient { source })?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> HttpClientError {
        if err.is_timeout() {
            HttpClientError::Timeout {
                timeout: self.timeout,
            }
        } else {
            HttpClientError::Request {
                source: Box::new(err),
            }
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &Url,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        decode: bool,
    ) -> Result<HttpResponse, HttpClientError> {
        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                HttpClientError::Request {
                    source: Box::new(err),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|err| HttpClientError::Request {
                source: Box::new(err),
            })?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(url.clone())
            .headers(header_map)
            .body(body)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;
        let status = response.status().as_u16();
        let body = if decode {
            let bytes = response.bytes().await.map_err(|err| self.map_error(err))?;
            ResponseBody::decode(&bytes)
        } else {
            ResponseBody::Empty
        };
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn decode_prefers_json_then_text() {
        assert_eq!(
            ResponseBody::decode(br#"{"ok":true}"#),
            ResponseBody::Json(json!({"ok": true}))
        );
        assert_eq!(
            ResponseBody::decode(b"accepted"),
            ResponseBody::Text("accepted".into())
        );
        assert_eq!(ResponseBody::decode(b"  \n"), ResponseBody::Empty);
    }

    #[tokio::test]
    async fn reqwest_client_posts_headers_and_decodes() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ingest")
                .header("content-type", "application/json")
                .body(r#"{"fun":"test.ping"}"#);
            then.status(201).body(r#"{"queued":1}"#);
        });

        let client = ReqwestClient::new(Duration::from_secs(5))?;
        let url = Url::parse(&server.url("/ingest"))?;
        let response = client
            .post(
                &url,
                &[("Content-Type", "application/json")],
                br#"{"fun":"test.ping"}"#.to_vec(),
                true,
            )
            .await?;

        mock.assert();
        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.body, ResponseBody::Json(json!({"queued": 1})));
        Ok(())
    }

    #[tokio::test]
    async fn error_statuses_are_responses_not_errors() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/ingest");
            then.status(500).body("backend down");
        });

        let client = ReqwestClient::new(Duration::from_secs(5))?;
        let url = Url::parse(&server.url("/ingest"))?;
        let response = client.post(&url, &[], b"{}".to_vec(), true).await?;
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
        assert_eq!(response.body, ResponseBody::Text("backend down".into()));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() -> Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let client = ReqwestClient::new(Duration::from_secs(2))?;
        let url = Url::parse(&format!("http://127.0.0.1:{port}/ingest"))?;
        let err = client
            .post(&url, &[], b"{}".to_vec(), true)
            .await
            .expect_err("nothing listens on the port");
        assert!(matches!(
            err,
            HttpClientError::Request { .. } | HttpClientError::Timeout { .. }
        ));
        Ok(())
    }
}
