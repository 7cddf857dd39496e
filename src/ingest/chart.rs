/// Chart image client for the hydrological information service
///
/// The service publishes each monitoring table as a PNG chart at a fixed
/// URL. Responses are cached aggressively upstream, so every request carries
/// a millisecond timestamp in a `t` query parameter to force a fresh render.
///
/// Example chart URL:
/// http://www.jsswj.com.cn:88/jsswxxSSI/static/map/chart/0/<id>_list.png?t=1718438400000

use crate::config::FeedsConfig;
use crate::model::{FeedKind, FetchError};
use chrono::{DateTime, Utc};
use std::time::Duration;

// ============================================================================
// Chart Sources
// ============================================================================

/// Anything that can produce the raw bytes of a feed's chart image.
///
/// The live implementation is `HttpChartSource`; `dev_mode::FileChartSource`
/// replays images saved on disk.
pub trait ChartSource {
    /// Raw image bytes for the feed, or the reason none could be obtained.
    fn fetch(&self, kind: FeedKind) -> Result<Vec<u8>, FetchError>;

    /// Where the chart comes from, for log messages.
    fn location(&self, kind: FeedKind) -> String;
}

/// Fetches charts over HTTP with a per-request timeout.
pub struct HttpChartSource {
    client: reqwest::blocking::Client,
    level_url: String,
    rain_url: String,
}

impl HttpChartSource {
    pub fn new(feeds: &FeedsConfig) -> Result<Self, FetchError> {
        let client = build_client(feeds.http_timeout())?;
        Ok(Self {
            client,
            level_url: feeds.url(FeedKind::Level).to_string(),
            rain_url: feeds.url(FeedKind::Rain).to_string(),
        })
    }

    fn base_url(&self, kind: FeedKind) -> &str {
        match kind {
            FeedKind::Level => &self.level_url,
            FeedKind::Rain => &self.rain_url,
        }
    }
}

impl ChartSource for HttpChartSource {
    fn fetch(&self, kind: FeedKind) -> Result<Vec<u8>, FetchError> {
        let url = build_chart_url(self.base_url(kind), Utc::now());
        fetch_chart(&self.client, &url)
    }

    fn location(&self, kind: FeedKind) -> String {
        self.base_url(kind).to_string()
    }
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Blocking HTTP client with the given request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Appends the cache-busting `t=<unix millis>` parameter to a chart URL.
pub fn build_chart_url(base_url: &str, now: DateTime<Utc>) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", base_url, separator, now.timestamp_millis())
}

/// Download one chart image.
///
/// # Returns
/// The response body when the service answers 2xx; `FetchError::HttpStatus`
/// otherwise.
pub fn fetch_chart(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "image/png")
        .send()?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let body = response.bytes()?;
    Ok(body.to_vec())
}

// ============================================================================
// Tests
// ============================================================================
