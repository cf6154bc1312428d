use crate::types::{FetchConfig, FetchResult, PublisherError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::Utc;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn fetch_feed(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult> {
        let start_time = Instant::now();
        let fetch_time = Utc::now();

        debug!("Fetching feed: {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_with_conditional_headers(url, etag, last_modified).await {
                Ok(response) => {
                    let response_time = start_time.elapsed().as_millis() as u64;
                    let status = response.status();

                    if status == reqwest::StatusCode::NOT_MODIFIED {
                        debug!("Feed not modified: {}", url);
                        return Ok(FetchResult {
                            success: true,
                            error: None,
                            fetch_time,
                            response_time_ms: response_time,
                            http_status: Some(status.as_u16()),
                            etag: etag.map(|s| s.to_string()),
                            last_modified: last_modified.map(|s| s.to_string()),
                            content: None,
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(PublisherError::Fetch(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));

                        // Client errors other than throttling will not fix themselves
                        let retryable = status.is_server_error()
                            || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                        if retryable && attempt < self.config.max_retries {
                            if let Some(delay) = backoff.next_backoff() {
                                warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                        }
                        break;
                    }

                    let new_etag = header_value(&response, "etag");
                    let new_last_modified = header_value(&response, "last-modified");

                    if let Some(content_length) = response.content_length() {
                        let size_mb = content_length as usize / (1024 * 1024);
                        if size_mb > self.config.max_feed_size_mb {
                            return Ok(FetchResult {
                                success: false,
                                error: Some(format!("Feed too large: {}MB", size_mb)),
                                fetch_time,
                                response_time_ms: response_time,
                                http_status: Some(status.as_u16()),
                                etag: new_etag,
                                last_modified: new_last_modified,
                                content: None,
                            });
                        }
                    }

                    match response.text().await {
                        Ok(content) => {
                            info!("Successfully fetched feed: {} ({} bytes)", url, content.len());
                            return Ok(FetchResult {
                                success: true,
                                error: None,
                                fetch_time,
                                response_time_ms: response_time,
                                http_status: Some(status.as_u16()),
                                etag: new_etag,
                                last_modified: new_last_modified,
                                content: Some(content),
                            });
                        }
                        Err(e) => {
                            last_error = Some(PublisherError::Http(e));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        let error_msg = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        error!("Failed to fetch feed {}: {}", url, error_msg);

        Ok(FetchResult {
            success: false,
            error: Some(error_msg),
            fetch_time,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            http_status: None,
            etag: None,
            last_modified: None,
            content: None,
        })
    }

    async fn fetch_with_conditional_headers(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }

        if let Some(last_modified) = last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }

        let response = request.send().await?;
        Ok(response)
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
