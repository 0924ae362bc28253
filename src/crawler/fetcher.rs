//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler:
//! - Building the HTTP client with a browser-like user agent and timeout
//! - Issuing a single GET per task (no retries)
//! - Rejecting anything but `200 OK`
//! - Handing the body back as a stream owned by the caller

use crate::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A response body, yielded chunk by chunk
///
/// Dropping the stream closes the underlying response.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Downloads pages for the crawl engine
///
/// Implementations do not need to observe cancellation themselves: the
/// engine drops the returned future when the crawl is cancelled.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issues a GET for `url`
    ///
    /// # Returns
    ///
    /// * `Ok(BodyStream)` - The server answered `200 OK`
    /// * `Err(FetchError::UnexpectedStatus)` - Any other status; the body is discarded
    /// * `Err(FetchError::Transport)` - Connection, TLS or timeout failure
    async fn fetch(&self, url: &str) -> Result<BodyStream, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The `User-Agent` header sent with every request
/// * `timeout` - Overall per-request timeout, covering connect and body
///
/// # Example
///
/// ```no_run
/// use depthcrawl::crawler::{build_http_client, DEFAULT_USER_AGENT};
/// use std::time::Duration;
///
/// let client = build_http_client(DEFAULT_USER_AGENT, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with its own client
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<BodyStream, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            // Dropping the response closes the body
            drop(response);
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let url = url.to_string();
        let body = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|source| FetchError::BodyRead {
                url: url.clone(),
                source,
            })
        });

        Ok(body.boxed())
    }
}

/// Reads a body stream to the end
pub async fn read_body(mut body: BodyStream) -> Result<Vec<u8>, FetchError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(DEFAULT_USER_AGENT, Duration::from_secs(30));
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_ok_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "depthcrawl-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hello</html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("depthcrawl-test/1.0", Duration::from_secs(5)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        let bytes = read_body(body).await.unwrap();
        assert_eq!(bytes, b"<html>hello</html>");
    }

    #[tokio::test]
    async fn test_fetch_sends_default_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        // Only checked for presence: the default agent contains a comma,
        // which the exact header matcher splits on.
        fetcher().fetch(&server.uri()).await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/broken", server.uri()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FetchError::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_other_2xx_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri()).await.err().unwrap();
        assert!(matches!(err, FetchError::UnexpectedStatus { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transport_error() {
        // Bind then drop a listener so nothing is listening on the port
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = fetcher()
            .fetch(&format!("http://127.0.0.1:{}/", port))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_fetch_honours_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_millis(200)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.err().unwrap();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
