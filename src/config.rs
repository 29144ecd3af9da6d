use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
    /// Path to the route geometry file used by the simulation fallback
    #[serde(default = "Config::default_routes_file")]
    pub routes_file: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Radar feed configuration
    #[serde(default)]
    pub radar: RadarConfig,
    /// Broadcast loop configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }
    fn default_routes_file() -> String {
        "config/routes.json".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration for the upstream radar feed
#[derive(Debug, Clone, Deserialize)]
pub struct RadarConfig {
    /// Base URL of the transport REST API
    #[serde(default = "RadarConfig::default_base_url")]
    pub base_url: String,
    /// Geographic area to query vehicles for
    #[serde(default = "RadarConfig::default_bounding_box")]
    pub bounding_box: BoundingBox,
    /// Maximum number of movements per snapshot (default: 100)
    #[serde(default = "RadarConfig::default_results_limit")]
    pub results_limit: u32,
    /// Request timeout in seconds (default: 10)
    ///
    /// Bounded so a stalled upstream cannot stall a broadcast tick.
    #[serde(default = "RadarConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds (default: 5)
    #[serde(default = "RadarConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            bounding_box: Self::default_bounding_box(),
            results_limit: Self::default_results_limit(),
            timeout_secs: Self::default_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

impl RadarConfig {
    fn default_base_url() -> String {
        "https://v6.bvg.transport.rest".to_string()
    }
    fn default_bounding_box() -> BoundingBox {
        // Greater Berlin
        BoundingBox {
            north: 52.6755,
            west: 13.0883,
            south: 52.3382,
            east: 13.7611,
        }
    }
    fn default_results_limit() -> u32 {
        100
    }
    fn default_timeout_secs() -> u64 {
        10
    }
    fn default_connect_timeout_secs() -> u64 {
        5
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

/// Configuration for the discovery and broadcast loops
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Interval in seconds between line discovery cycles (default: 30)
    #[serde(default = "BroadcastConfig::default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,
    /// Interval in seconds between broadcast cycles (default: 3)
    #[serde(default = "BroadcastConfig::default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
    /// Number of synthetic vehicles per line when no real data exists (default: 2)
    #[serde(default = "BroadcastConfig::default_simulated_vehicles")]
    pub simulated_vehicles: usize,
    /// Per-subscriber channel capacity; a subscriber whose buffer stays full
    /// is treated as failed and removed (default: 32)
    #[serde(default = "BroadcastConfig::default_channel_capacity")]
    pub channel_capacity: usize,
    /// Seconds after which an unseen trip-token identity mapping is evicted
    /// (default: 3600)
    #[serde(default = "BroadcastConfig::default_identity_ttl_secs")]
    pub identity_ttl_secs: u64,
    /// Lines that get a subscriber group at startup, before the first
    /// discovery cycle has run
    #[serde(default = "BroadcastConfig::default_seed_lines")]
    pub seed_lines: Vec<String>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: Self::default_discovery_interval_secs(),
            broadcast_interval_secs: Self::default_broadcast_interval_secs(),
            simulated_vehicles: Self::default_simulated_vehicles(),
            channel_capacity: Self::default_channel_capacity(),
            identity_ttl_secs: Self::default_identity_ttl_secs(),
            seed_lines: Self::default_seed_lines(),
        }
    }
}

impl BroadcastConfig {
    fn default_discovery_interval_secs() -> u64 {
        30
    }
    fn default_broadcast_interval_secs() -> u64 {
        3
    }
    fn default_simulated_vehicles() -> usize {
        2
    }
    fn default_channel_capacity() -> usize {
        32
    }
    fn default_identity_ttl_secs() -> u64 {
        3600
    }
    fn default_seed_lines() -> Vec<String> {
        ["255", "100", "200", "M41", "U1", "U2"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
