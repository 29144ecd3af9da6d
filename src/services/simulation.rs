//! Synthetic vehicle positions
//!
//! Fallback used when the radar feed has no vehicles for a subscribed line:
//! vehicles are scattered along the route's waypoints with a small random
//! offset so subscribers always observe some motion.

use chrono::Utc;
use rand::Rng;

use crate::models::{VehiclePosition, Waypoint};

/// Random offset applied to both axes, in degrees (roughly a 200 m box)
const JITTER_DEGREES: f64 = 0.001;

pub const SIMULATED_DESTINATION: &str = "Simulated destination";

/// Produce `count` synthetic positions along the given waypoints.
///
/// Returns an empty vec when there are no waypoints to place vehicles on;
/// callers treat that as a normal outcome.
pub fn simulate(route_id: &str, waypoints: &[Waypoint], count: usize) -> Vec<VehiclePosition> {
    if waypoints.is_empty() {
        return Vec::new();
    }

    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let waypoint = waypoints[rng.random_range(0..waypoints.len())];
            VehiclePosition {
                route_id: route_id.to_string(),
                vehicle_id: format!("{}-sim-{}", route_id, i),
                latitude: waypoint.lat + rng.random_range(-JITTER_DEGREES..=JITTER_DEGREES),
                longitude: waypoint.lon + rng.random_range(-JITTER_DEGREES..=JITTER_DEGREES),
                timestamp: Utc::now(),
                destination: SIMULATED_DESTINATION.to_string(),
            }
        })
        .collect()
}
