use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::NextcloudConfig;
use crate::errors::AdapterError;
use crate::models::{HttpEnvelope, RawResponse, RequestBody};

/// Executes one prepared request. The executor never retries; whatever
/// resilience the transport wants lives behind this seam.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &HttpEnvelope) -> Result<RawResponse, AdapterError>;
}

/// Retry tuning for the HTTP transport.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Additional backoff for 429 responses
    pub rate_limit_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            rate_limit_backoff_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// No retries at all; useful for tests and callers that handle
    /// resilience themselves.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// reqwest-backed transport with basic auth and exponential backoff on
/// server errors.
pub struct HttpTransport {
    client: Client,
    config: NextcloudConfig,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(config: NextcloudConfig) -> Result<Self, AdapterError> {
        Self::with_retry(config, RetryConfig::default())
    }

    pub fn with_retry(config: NextcloudConfig, retry: RetryConfig) -> Result<Self, AdapterError> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &HttpEnvelope) -> Result<RawResponse, AdapterError> {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay_ms;

        loop {
            let mut request = self
                .client
                .request(envelope.method.clone(), &envelope.url)
                .basic_auth(&self.config.username, Some(&self.config.password));

            if !envelope.query.is_empty() {
                request = request.query(&envelope.query);
            }
            for (key, value) in &envelope.headers {
                request = request.header(key, value);
            }
            request = match &envelope.body {
                Some(RequestBody::Text(text)) => request.body(text.clone()),
                Some(RequestBody::Binary(bytes)) => request.body(bytes.clone()),
                None => request,
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    // 207 is the WebDAV multistatus success
                    if status.is_success() || status.as_u16() == 207 {
                        return if envelope.binary_response {
                            Ok(RawResponse::Binary(response.bytes().await?.to_vec()))
                        } else {
                            Ok(RawResponse::Text(response.text().await?))
                        };
                    }

                    if status.as_u16() == 429 && attempt < self.retry.max_retries {
                        warn!(
                            "rate limited, backing off for {}ms",
                            self.retry.rate_limit_backoff_ms
                        );
                        sleep(Duration::from_millis(self.retry.rate_limit_backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }

                    if status.is_server_error() && attempt < self.retry.max_retries {
                        warn!(
                            "server error {}, retrying in {}ms (attempt {}/{})",
                            status,
                            delay,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        sleep(Duration::from_millis(delay)).await;
                        delay = std::cmp::min(
                            (delay as f64 * self.retry.backoff_multiplier) as u64,
                            self.retry.max_delay_ms,
                        );
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(AdapterError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        warn!(
                            "request error: {}, retrying in {}ms (attempt {}/{})",
                            e,
                            delay,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        sleep(Duration::from_millis(delay)).await;
                        delay = std::cmp::min(
                            (delay as f64 * self.retry.backoff_multiplier) as u64,
                            self.retry.max_delay_ms,
                        );
                        attempt += 1;
                        continue;
                    }

                    debug!("request to {} failed after {} attempts", envelope.url, attempt + 1);
                    return Err(AdapterError::Transport(e));
                }
            }
        }
    }
}
