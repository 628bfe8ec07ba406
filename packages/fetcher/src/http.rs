//! HTTP transport for book-source sites.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{HTTP_TIMEOUT_SECS, MAX_RETRIES, RETRY_BASE_DELAY_MS, USER_AGENT};
use crate::error::{FetcherError, Result};
use crate::request::{Method, Request};

/// Fetches page text, enabling mocking in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<String>;
}

/// `reqwest` transport with timeout, user agent and retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpTransport {
    /// Create a transport with the default retry policy.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        })
    }

    /// Replace the retry policy. `max_retries` counts attempts and is at least 1.
    pub fn with_retry_policy(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_base_delay = base_delay;
        self
    }

    /// Delay before `attempt` (1-based retry number): 500ms, 1000ms, 2000ms, ...
    ///
    /// The exponent is capped at 16 doublings.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }

    fn build(&self, request: &Request) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            if request.method == Method::Post
                && !request
                    .headers
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                let content_type = if body.trim_start().starts_with('{') {
                    "application/json"
                } else {
                    "application/x-www-form-urlencoded"
                };
                builder = builder.header("Content-Type", content_type);
            }
            builder = builder.body(body.clone());
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    /// Uses exponential backoff for transient failures (network errors, 5xx responses).
    async fn fetch(&self, request: &Request) -> Result<String> {
        let mut last_error: Option<String> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
                tokio::time::sleep(delay).await;
            }

            match self.build(request).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_server_error() {
                        tracing::warn!(
                            url = %request.url,
                            status = %status,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Server error, will retry"
                        );
                        last_error = Some(format!("Server error: {status}"));
                        continue;
                    }

                    // Client errors won't succeed on retry
                    if !status.is_success() {
                        return Err(FetcherError::Status {
                            url: request.url.clone(),
                            status: status.as_u16(),
                        });
                    }
                    let text = response.text().await?;
                    tracing::debug!(url = %request.url, method = %request.method, bytes = text.len(), "Fetched page");
                    return Ok(text);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!(
                            url = %request.url,
                            error = %e,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Connection error, will retry"
                        );
                        last_error = Some(e.to_string());
                        continue;
                    }
                    return Err(FetcherError::Http(e));
                }
            }
        }

        Err(FetcherError::RetriesExhausted {
            url: request.url.clone(),
            attempts: self.max_retries,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new()
            .unwrap()
            .with_retry_policy(2, Duration::ZERO)
    }

    #[test]
    fn test_create_transport() {
        assert!(HttpTransport::new().is_ok());
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let transport = HttpTransport::new()
            .unwrap()
            .with_retry_policy(40, Duration::from_millis(500));
        assert_eq!(transport.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(transport.backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(transport.backoff_delay(17), Duration::from_millis(500 << 16));
        assert_eq!(transport.backoff_delay(39), Duration::from_millis(500 << 16));
    }

    #[tokio::test]
    async fn test_many_attempts_exhaust_without_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(40)
            .mount(&server)
            .await;

        let err = HttpTransport::new()
            .unwrap()
            .with_retry_policy(40, Duration::ZERO)
            .fetch(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetcherError::RetriesExhausted { attempts: 40, .. }));
    }

    #[tokio::test]
    async fn test_get_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("Referer", "https://www.example.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let mut request = Request::get(format!("{}/page", server.uri()));
        request
            .headers
            .insert("Referer".to_string(), "https://www.example.com/".to_string());
        assert_eq!(transport().fetch(&request).await.unwrap(), "<p>ok</p>");
    }

    #[tokio::test]
    async fn test_post_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string("kw=dune"))
            .respond_with(ResponseTemplate::new(200).set_body_string("found"))
            .mount(&server)
            .await;

        let request = Request {
            url: format!("{}/search", server.uri()),
            method: Method::Post,
            body: Some("kw=dune".to_string()),
            ..Request::default()
        };
        assert_eq!(transport().fetch(&request).await.unwrap(), "found");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = transport()
            .fetch(&Request::get(format!("{}/missing", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, FetcherError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = transport()
            .fetch(&Request::get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetcherError::RetriesExhausted { attempts: 2, .. }));
    }
}
