use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::RadarConfig;

#[derive(Debug, Error)]
pub enum RadarError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl RadarError {
    /// Whether the feed is known to be temporarily unavailable.
    ///
    /// The broadcast loop skips the tick for this class of error instead of
    /// falling back to simulation, so real data resumes the moment the feed
    /// recovers.
    pub fn is_temporarily_unavailable(&self) -> bool {
        matches!(self, RadarError::Http(503))
    }
}

/// Vehicle mode reported by the radar feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMode {
    Bus,
    Train,
    /// Ferries, express trains and anything else the feed may report
    #[serde(other)]
    Other,
}

/// Line information attached to a movement
#[derive(Debug, Clone, Deserialize)]
pub struct MovementLine {
    pub name: Option<String>,
    pub mode: Option<LineMode>,
}

/// Coordinates of a movement observation
#[derive(Debug, Clone, Deserialize)]
pub struct MovementLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One raw vehicle observation from a radar snapshot.
///
/// Every field is optional; movements missing the data a consumer needs are
/// dropped silently by that consumer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Movement {
    pub line: Option<MovementLine>,
    pub location: Option<MovementLocation>,
    #[serde(rename = "tripId")]
    pub trip_id: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RadarResponse {
    #[serde(default)]
    movements: Vec<Movement>,
}

/// Source of radar snapshots, abstracted so the broadcast loop can be
/// exercised without a network.
pub trait FeedSource: Send + Sync + 'static {
    fn poll(&self) -> impl Future<Output = Result<Vec<Movement>, RadarError>> + Send;
}

/// Client for the BVG radar endpoint
#[derive(Clone)]
pub struct RadarClient {
    client: Client,
    url: String,
}

impl RadarClient {
    pub fn new(config: &RadarConfig) -> Result<Self, RadarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RadarError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let bbox = &config.bounding_box;
        let url = format!(
            "{}/radar?north={}&west={}&south={}&east={}&results={}&frames=1",
            config.base_url.trim_end_matches('/'),
            bbox.north,
            bbox.west,
            bbox.south,
            bbox.east,
            config.results_limit,
        );

        Ok(Self { client, url })
    }

    /// Fetch one snapshot of current vehicle movements
    pub async fn fetch_movements(&self) -> Result<Vec<Movement>, RadarError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RadarError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RadarError::Http(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RadarError::Network(e.to_string()))?;

        let parsed: RadarResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                error = %e,
                body = truncate_for_log(&body),
                "Failed to parse radar response"
            );
            RadarError::Parse(e.to_string())
        })?;

        Ok(parsed.movements)
    }
}

/// Cap a response body for log output without splitting a multibyte
/// character; the feed may answer with arbitrary non-JSON text.
fn truncate_for_log(body: &str) -> &str {
    const MAX_LOGGED_BYTES: usize = 500;
    if body.len() <= MAX_LOGGED_BYTES {
        return body;
    }
    let mut end = MAX_LOGGED_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

impl FeedSource for RadarClient {
    fn poll(&self) -> impl Future<Output = Result<Vec<Movement>, RadarError>> + Send {
        self.fetch_movements()
    }
}
