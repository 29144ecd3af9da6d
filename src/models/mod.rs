use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single position update delivered to stream subscribers.
///
/// Produced fresh on every broadcast tick, either from real radar data or
/// from the simulation fallback. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VehiclePosition {
    /// Line the vehicle runs on (e.g. "100", "M41", "U2")
    pub route_id: String,
    /// Stable display identifier for the vehicle
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// When this position was produced (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Destination shown to subscribers; "Unknown destination" when the feed
    /// reports none, "Simulated destination" for synthetic vehicles
    pub destination: String,
}

/// A known route with its ordered waypoint geometry.
///
/// Loaded from the routes file at startup and used only as simulation input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Route {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// One geographic point along a route
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}
