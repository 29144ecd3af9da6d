//! Broadcast scheduler
//!
//! Two independent loops share the subscription and identity registries:
//! a discovery loop that keeps a group ready for every currently active line,
//! and a broadcast loop that fans radar data (or simulated fallback data) out
//! to every subscriber. Neither loop ever terminates on its own and no tick
//! failure is fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog::RouteCatalog;
use crate::config::BroadcastConfig;
use crate::models::VehiclePosition;
use crate::providers::radar::{FeedSource, Movement};
use crate::services::activity;
use crate::services::identity::VehicleIdentityRegistry;
use crate::services::simulation;
use crate::services::subscriptions::SubscriptionRegistry;

pub struct Broadcaster<F: FeedSource> {
    feed: F,
    catalog: Arc<RouteCatalog>,
    subscriptions: Arc<SubscriptionRegistry>,
    identity: Arc<VehicleIdentityRegistry>,
    config: BroadcastConfig,
}

impl<F: FeedSource> Broadcaster<F> {
    pub fn new(
        feed: F,
        catalog: Arc<RouteCatalog>,
        subscriptions: Arc<SubscriptionRegistry>,
        identity: Arc<VehicleIdentityRegistry>,
        config: BroadcastConfig,
    ) -> Self {
        // Common lines get a group before the first discovery cycle has run,
        // so early subscribers find them ready
        for line in &config.seed_lines {
            subscriptions.ensure_group(line);
        }

        Self {
            feed,
            catalog,
            subscriptions,
            identity,
            config,
        }
    }

    /// Run the discovery and broadcast loops until the process exits
    pub async fn start(self: Arc<Self>) {
        info!(
            discovery_interval_secs = self.config.discovery_interval_secs,
            broadcast_interval_secs = self.config.broadcast_interval_secs,
            "Starting broadcast scheduler"
        );

        let discovery_self = self.clone();
        let discovery_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                discovery_self.config.discovery_interval_secs,
            ));
            loop {
                interval.tick().await;
                discovery_self.discovery_tick().await;
            }
        });

        let broadcast_self = self.clone();
        let broadcast_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                broadcast_self.config.broadcast_interval_secs,
            ));
            loop {
                interval.tick().await;
                broadcast_self.broadcast_tick().await;
            }
        });

        // Both loops run forever
        let _ = tokio::join!(discovery_handle, broadcast_handle);
    }

    /// Make sure every currently active line has a subscriber group, and
    /// evict identity mappings that have not been seen for a while.
    ///
    /// Never broadcasts.
    async fn discovery_tick(&self) {
        match self.feed.poll().await {
            Ok(movements) => {
                let counts = activity::line_counts(&movements);
                for line in counts.keys() {
                    self.subscriptions.ensure_group(line);
                }
                if let Some(line) = activity::most_active(&movements) {
                    info!(
                        line = %line,
                        vehicles = counts[line.as_str()],
                        active_lines = counts.len(),
                        "Most active line in radar data"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Line discovery poll failed, keeping existing groups");
            }
        }

        self.identity
            .prune(Duration::from_secs(self.config.identity_ttl_secs));
    }

    /// Deliver one round of updates to every line that has subscribers.
    ///
    /// The feed is polled once and the snapshot partitioned across lines, so
    /// all lines in one tick observe a consistent view.
    async fn broadcast_tick(&self) {
        let lines = self.subscriptions.lines_with_subscribers();
        if lines.is_empty() {
            return;
        }

        let snapshot = match self.feed.poll().await {
            Ok(movements) => Some(movements),
            Err(e) if e.is_temporarily_unavailable() => {
                // Skip the whole tick; real data is preferred over synthetic
                // the moment the feed recovers
                info!(error = %e, "Radar feed temporarily unavailable, skipping broadcast tick");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Radar poll failed, falling back to simulation");
                None
            }
        };

        for line_id in lines {
            let positions = match &snapshot {
                Some(movements) => {
                    let matched: Vec<&Movement> = movements
                        .iter()
                        .filter(|m| activity::in_scope_line(m) == Some(line_id.as_str()))
                        .collect();

                    if matched.is_empty() {
                        debug!(line = %line_id, "No real vehicles, using simulation");
                        self.simulated_positions(&line_id)
                    } else {
                        self.real_positions(&line_id, &matched)
                    }
                }
                None => self.simulated_positions(&line_id),
            };

            self.deliver(&line_id, &positions);
        }
    }

    /// Build positions for the movements matched to one line, dropping any
    /// movement without usable coordinates.
    fn real_positions(&self, line_id: &str, matched: &[&Movement]) -> Vec<VehiclePosition> {
        matched
            .iter()
            .filter_map(|movement| position_from_movement(&self.identity, line_id, movement))
            .collect()
    }

    fn simulated_positions(&self, line_id: &str) -> Vec<VehiclePosition> {
        match self.catalog.waypoints(line_id) {
            Some(waypoints) => {
                simulation::simulate(line_id, waypoints, self.config.simulated_vehicles)
            }
            // Unknown route: nothing to simulate, not an error
            None => Vec::new(),
        }
    }

    /// Push every position to every current subscriber of one line.
    ///
    /// A failed push removes that sink only; remaining subscribers and the
    /// rest of the tick are unaffected.
    fn deliver(&self, line_id: &str, positions: &[VehiclePosition]) {
        if positions.is_empty() {
            return;
        }

        let sinks = self.subscriptions.sinks(line_id);
        let mut failed: Vec<u64> = Vec::new();

        for position in positions {
            for sink in &sinks {
                if failed.contains(&sink.id()) {
                    continue;
                }
                if sink.push(position).is_err() {
                    failed.push(sink.id());
                }
            }
        }

        for sink_id in failed {
            self.subscriptions.remove_sink(line_id, sink_id);
            debug!(line = %line_id, sink_id, "Removed failed subscriber");
        }
    }
}

/// Turn one movement already matched to a line into a position record.
///
/// Returns `None` when the movement has no usable coordinates. An absent or
/// blank direction is normalized to "Unknown destination".
pub fn position_from_movement(
    identity: &VehicleIdentityRegistry,
    line_id: &str,
    movement: &Movement,
) -> Option<VehiclePosition> {
    let location = movement.location.as_ref()?;
    let latitude = location.latitude?;
    let longitude = location.longitude?;

    let destination = match movement.direction.as_deref() {
        Some(direction) if !direction.trim().is_empty() => direction.to_string(),
        _ => "Unknown destination".to_string(),
    };

    Some(VehiclePosition {
        route_id: line_id.to_string(),
        vehicle_id: identity.resolve(movement.trip_id.as_deref(), line_id),
        latitude,
        longitude,
        timestamp: Utc::now(),
        destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastConfig;
    use crate::models::{Route, Waypoint};
    use crate::providers::radar::{LineMode, MovementLine, MovementLocation, RadarError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockFeed {
        responses: Mutex<VecDeque<Result<Vec<Movement>, RadarError>>>,
        polls: AtomicUsize,
    }

    impl MockFeed {
        fn new(responses: Vec<Result<Vec<Movement>, RadarError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                polls: AtomicUsize::new(0),
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::Relaxed)
        }
    }

    impl FeedSource for MockFeed {
        fn poll(
            &self,
        ) -> impl std::future::Future<Output = Result<Vec<Movement>, RadarError>> + Send {
            self.polls.fetch_add(1, Ordering::Relaxed);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            async move { next }
        }
    }

    fn movement(
        name: &str,
        mode: LineMode,
        coords: Option<(f64, f64)>,
        trip_id: Option<&str>,
        direction: Option<&str>,
    ) -> Movement {
        Movement {
            line: Some(MovementLine {
                name: Some(name.to_string()),
                mode: Some(mode),
            }),
            location: coords.map(|(lat, lon)| MovementLocation {
                latitude: Some(lat),
                longitude: Some(lon),
            }),
            trip_id: trip_id.map(String::from),
            direction: direction.map(String::from),
        }
    }

    fn catalog() -> Arc<RouteCatalog> {
        Arc::new(RouteCatalog::from_routes(vec![Route {
            id: "100".to_string(),
            name: "Bus 100".to_string(),
            waypoints: vec![
                Waypoint {
                    lat: 52.5251,
                    lon: 13.3694,
                },
                Waypoint {
                    lat: 52.5163,
                    lon: 13.3777,
                },
            ],
        }]))
    }

    fn broadcaster(
        feed: MockFeed,
        channel_capacity: usize,
    ) -> (Broadcaster<MockFeed>, Arc<SubscriptionRegistry>) {
        let subscriptions = Arc::new(SubscriptionRegistry::new(channel_capacity));
        let config = BroadcastConfig {
            seed_lines: Vec::new(),
            ..BroadcastConfig::default()
        };
        let broadcaster = Broadcaster::new(
            feed,
            catalog(),
            subscriptions.clone(),
            Arc::new(VehicleIdentityRegistry::new()),
            config,
        );
        (broadcaster, subscriptions)
    }

    #[tokio::test]
    async fn real_movements_are_broadcast() {
        let feed = MockFeed::new(vec![Ok(vec![movement(
            "100",
            LineMode::Bus,
            Some((52.50, 13.40)),
            Some("t1"),
            Some("Zoo"),
        )])]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        let position = subscription.try_recv().unwrap();
        assert_eq!(position.route_id, "100");
        assert_eq!(position.destination, "Zoo");
        assert_eq!(position.latitude, 52.50);
        assert_eq!(position.vehicle_id, "100-1");
        // Nothing else queued
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn vehicle_identity_is_stable_across_ticks() {
        let observation = || {
            Ok(vec![movement(
                "100",
                LineMode::Bus,
                Some((52.50, 13.40)),
                Some("t1"),
                Some("Zoo"),
            )])
        };
        let feed = MockFeed::new(vec![observation(), observation()]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;
        broadcaster.broadcast_tick().await;

        let first = subscription.try_recv().unwrap();
        let second = subscription.try_recv().unwrap();
        assert_eq!(first.vehicle_id, second.vehicle_id);
    }

    #[tokio::test]
    async fn blank_direction_becomes_unknown_destination() {
        let feed = MockFeed::new(vec![Ok(vec![movement(
            "100",
            LineMode::Bus,
            Some((52.50, 13.40)),
            Some("t1"),
            Some("   "),
        )])]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        let position = subscription.try_recv().unwrap();
        assert_eq!(position.destination, "Unknown destination");
    }

    #[tokio::test]
    async fn movements_without_coordinates_are_skipped() {
        let feed = MockFeed::new(vec![Ok(vec![
            movement("100", LineMode::Bus, None, Some("t1"), Some("Zoo")),
            movement("100", LineMode::Bus, Some((52.51, 13.41)), Some("t2"), Some("Zoo")),
        ])]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        let position = subscription.try_recv().unwrap();
        assert_eq!(position.latitude, 52.51);
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn no_matches_triggers_line_scoped_simulation() {
        // Feed only has vehicles for line 200; the subscriber is on 100
        let feed = MockFeed::new(vec![Ok(vec![movement(
            "200",
            LineMode::Bus,
            Some((52.48, 13.35)),
            Some("t5"),
            Some("Hertzallee"),
        )])]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        let first = subscription.try_recv().unwrap();
        let second = subscription.try_recv().unwrap();
        assert_eq!(first.vehicle_id, "100-sim-0");
        assert_eq!(second.vehicle_id, "100-sim-1");
        assert!(first.destination.contains("Simulated"));
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn simulation_for_unknown_route_delivers_nothing() {
        let feed = MockFeed::new(vec![Ok(Vec::new())]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("M85");

        broadcaster.broadcast_tick().await;

        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn service_unavailable_skips_the_tick() {
        let feed = MockFeed::new(vec![Err(RadarError::Http(503))]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        // No real data and no simulation either
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn other_feed_errors_fall_back_to_simulation() {
        let feed = MockFeed::new(vec![Err(RadarError::Network("connection reset".into()))]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        let mut subscription = subscriptions.subscribe("100");

        broadcaster.broadcast_tick().await;

        assert_eq!(subscription.try_recv().unwrap().vehicle_id, "100-sim-0");
        assert_eq!(subscription.try_recv().unwrap().vehicle_id, "100-sim-1");
    }

    #[tokio::test]
    async fn no_subscribers_means_no_poll() {
        let feed = MockFeed::new(vec![]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        subscriptions.ensure_group("100");

        broadcaster.broadcast_tick().await;

        assert_eq!(broadcaster.feed.poll_count(), 0);
    }

    #[tokio::test]
    async fn failed_sink_is_removed_and_others_still_receive() {
        let feed = MockFeed::new(vec![Ok(vec![movement(
            "100",
            LineMode::Bus,
            Some((52.50, 13.40)),
            Some("t1"),
            Some("Zoo"),
        )])]);
        // Capacity 1 so a pre-filled buffer makes the next push fail
        let (broadcaster, subscriptions) = broadcaster(feed, 1);
        let mut stuck = subscriptions.subscribe("100");
        let mut healthy = subscriptions.subscribe("100");

        // Fill the first subscriber's buffer
        let sinks = subscriptions.sinks("100");
        sinks[0]
            .push(&VehiclePosition {
                route_id: "100".to_string(),
                vehicle_id: "100-0".to_string(),
                latitude: 0.0,
                longitude: 0.0,
                timestamp: Utc::now(),
                destination: "filler".to_string(),
            })
            .unwrap();

        broadcaster.broadcast_tick().await;

        // The stuck subscriber was dropped from the group, the healthy one
        // got the update
        assert_eq!(subscriptions.subscriber_count("100"), 1);
        assert_eq!(healthy.try_recv().unwrap().destination, "Zoo");
        assert_eq!(stuck.try_recv().unwrap().destination, "filler");
        assert!(stuck.try_recv().is_none());
    }

    #[tokio::test]
    async fn discovery_creates_groups_for_active_lines() {
        let feed = MockFeed::new(vec![Ok(vec![
            movement("100", LineMode::Bus, Some((52.50, 13.40)), None, None),
            movement("U2", LineMode::Train, Some((52.51, 13.41)), None, None),
            movement("S41", LineMode::Train, Some((52.49, 13.39)), None, None),
        ])]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);

        broadcaster.discovery_tick().await;

        assert_eq!(subscriptions.group_count(), 2);
        // Discovery never adds subscribers
        assert!(subscriptions.lines_with_subscribers().is_empty());
    }

    #[tokio::test]
    async fn discovery_poll_failure_keeps_existing_groups() {
        let feed = MockFeed::new(vec![Err(RadarError::Network("down".into()))]);
        let (broadcaster, subscriptions) = broadcaster(feed, 8);
        subscriptions.ensure_group("100");

        broadcaster.discovery_tick().await;

        assert_eq!(subscriptions.group_count(), 1);
    }

    #[test]
    fn seed_lines_get_groups_at_construction() {
        let subscriptions = Arc::new(SubscriptionRegistry::new(8));
        let _broadcaster = Broadcaster::new(
            MockFeed::new(vec![]),
            catalog(),
            subscriptions.clone(),
            Arc::new(VehicleIdentityRegistry::new()),
            BroadcastConfig::default(),
        );
        assert_eq!(subscriptions.group_count(), 6);
        assert!(subscriptions.lines_with_subscribers().is_empty());
    }
}
