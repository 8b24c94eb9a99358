use crate::types::{FeedSource, FetchConfig, PipelineError, RawFeedRecord, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

/// Client for the paged discover feed.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

/// Outcome of a single HTTP attempt.
enum AttemptError {
    /// Worth another try after backing off.
    Transient(String),
    /// Retrying will not help (blocked, malformed, client error).
    Fatal(String),
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn page_url(&self, limit: usize, offset: usize) -> Result<Url> {
        let limit = limit.to_string();
        let offset = offset.to_string();
        Url::parse_with_params(
            &self.config.base_url,
            &[
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("version", self.config.version.as_str()),
                ("topic", self.config.topic.as_str()),
                ("source", self.config.source.as_str()),
            ],
        )
        .map_err(|e| PipelineError::Configuration(format!("invalid feed URL {}: {}", self.config.base_url, e)))
    }

    /// Fetch one page and return the decoded JSON body.
    pub async fn fetch_page_json(&self, limit: usize, offset: usize) -> Result<Value> {
        let url = self.page_url(limit, offset)?;
        let start_time = Instant::now();

        let retry_delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 32,
            multiplier: 2.0,
            // Attempts are bounded by max_retries instead.
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.config.max_retries {
            match self.attempt(&url).await {
                Ok(body) => {
                    info!(
                        "Fetched feed page limit={} offset={} in {}ms",
                        limit,
                        offset,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(body);
                }
                Err(AttemptError::Fatal(message)) => {
                    error!("Feed request to {} rejected: {}", url, message);
                    return Err(PipelineError::SourceFetch(message));
                }
                Err(AttemptError::Transient(message)) => {
                    last_error = message;
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt + 1, url, last_error, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        error!("Failed to fetch feed after {} attempts: {}", self.config.max_retries + 1, url);
        Err(PipelineError::SourceFetch(last_error))
    }

    async fn attempt(&self, url: &Url) -> std::result::Result<Value, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    AttemptError::Fatal(e.to_string())
                } else {
                    AttemptError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        let is_html = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        if looks_like_challenge(status, is_html, &body) {
            return Err(AttemptError::Fatal(format!("blocked by anti-bot protection (HTTP {})", status.as_u16())));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AttemptError::Transient(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if !status.is_success() {
            return Err(AttemptError::Fatal(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        serde_json::from_str(&body).map_err(|e| AttemptError::Fatal(format!("response is not JSON: {}", e)))
    }

    fn dump_raw(&self, path: &Path, body: &Value) {
        let written = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| {
                let pretty = serde_json::to_vec_pretty(body).map_err(std::io::Error::other)?;
                std::fs::write(path, pretty)
            });

        match written {
            Ok(()) => debug!("Saved raw feed page to {}", path.display()),
            Err(e) => warn!("Failed to save raw feed page to {}: {}", path.display(), e),
        }
    }
}

/// Cloudflare-style interstitials come back as HTML, usually with 403 or 503.
fn looks_like_challenge(status: StatusCode, is_html: bool, body: &str) -> bool {
    if status == StatusCode::FORBIDDEN {
        return true;
    }
    let marker = body.contains("cf-chl") || body.contains("Just a moment") || body.contains("challenge-platform");
    (is_html && status.is_success()) || (marker && (status == StatusCode::SERVICE_UNAVAILABLE || status.is_success()))
}

#[async_trait]
impl FeedSource for Fetcher {
    fn source_name(&self) -> String {
        match Url::parse(&self.config.base_url) {
            Ok(parsed) => format!("Discover feed ({})", parsed.host_str().unwrap_or("unknown host")),
            Err(_) => "Discover feed".to_string(),
        }
    }

    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<RawFeedRecord>> {
        let body = self.fetch_page_json(limit, offset).await?;

        if let Some(path) = &self.config.raw_dump_path {
            self.dump_raw(path, &body);
        }

        match body.get("items").and_then(Value::as_array) {
            Some(items) => Ok(items.clone()),
            None => Err(PipelineError::SourceFetch("response has no items array".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_carries_all_parameters() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let url = fetcher.page_url(20, 40).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        assert_eq!(url.path(), "/rest/discover/feed");
        assert!(pairs.contains(&("limit".to_string(), "20".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "40".to_string())));
        assert!(pairs.contains(&("version".to_string(), "2.18".to_string())));
        assert!(pairs.contains(&("topic".to_string(), "top".to_string())));
        assert!(pairs.contains(&("source".to_string(), "default".to_string())));
    }

    #[test]
    fn challenge_detection() {
        assert!(looks_like_challenge(StatusCode::FORBIDDEN, false, ""));
        assert!(looks_like_challenge(StatusCode::OK, true, "<html>"));
        assert!(looks_like_challenge(StatusCode::SERVICE_UNAVAILABLE, true, "Just a moment..."));
        assert!(!looks_like_challenge(StatusCode::SERVICE_UNAVAILABLE, false, "upstream down"));
        assert!(!looks_like_challenge(StatusCode::OK, false, r#"{"items":[]}"#));
    }
}
