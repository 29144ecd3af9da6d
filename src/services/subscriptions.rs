//! Subscriber groups keyed by line id
//!
//! Each live stream connection owns a [`Subscription`]; the broadcast loop
//! pushes into the matching group's sinks. Groups are sharded per line id so
//! subscribe, unsubscribe and broadcast on unrelated lines never contend.
//!
//! Groups are kept once created, only emptied. A present-but-empty group
//! means "line has been seen"; an absent key means "never seen". Both read as
//! "no subscribers" during broadcast.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::models::VehiclePosition;

/// Push failed: the subscriber disconnected or cannot keep up
#[derive(Debug, Error)]
#[error("subscriber is gone or not keeping up")]
pub struct SinkClosed;

/// Sending half of one subscriber's stream.
///
/// Pushes never block; a full buffer counts as a failed delivery so one slow
/// subscriber cannot delay a broadcast tick.
#[derive(Clone)]
pub struct StreamSink {
    id: u64,
    tx: mpsc::Sender<VehiclePosition>,
}

impl StreamSink {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn push(&self, position: &VehiclePosition) -> Result<(), SinkClosed> {
        self.tx.try_send(position.clone()).map_err(|_| SinkClosed)
    }
}

#[derive(Default)]
struct SubscriberGroup {
    sinks: Vec<StreamSink>,
}

/// Concurrency-safe set of subscriber groups keyed by line id
pub struct SubscriptionRegistry {
    groups: DashMap<String, SubscriberGroup>,
    next_sink_id: AtomicU64,
    channel_capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            next_sink_id: AtomicU64::new(1),
            channel_capacity,
        }
    }

    /// Add a subscriber to a line, creating the group if absent.
    ///
    /// Dropping the returned [`Subscription`] removes exactly this subscriber
    /// from exactly this group.
    pub fn subscribe(self: &Arc<Self>, line_id: &str) -> Subscription {
        let sink_id = self.next_sink_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        self.groups
            .entry(line_id.to_string())
            .or_default()
            .sinks
            .push(StreamSink { id: sink_id, tx });

        tracing::debug!(line = %line_id, sink_id, "Subscriber added");

        Subscription {
            line_id: line_id.to_string(),
            sink_id,
            rx,
            registry: self.clone(),
        }
    }

    /// Make sure a (possibly empty) group exists for a line. Idempotent.
    pub fn ensure_group(&self, line_id: &str) {
        self.groups.entry(line_id.to_string()).or_default();
    }

    /// Lines that currently have at least one subscriber
    pub fn lines_with_subscribers(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|entry| !entry.value().sinks.is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot of a line's sinks, safe to iterate while subscribers come and
    /// go. Unknown lines read as empty.
    pub fn sinks(&self, line_id: &str) -> Vec<StreamSink> {
        self.groups
            .get(line_id)
            .map(|group| group.sinks.clone())
            .unwrap_or_default()
    }

    /// Remove one sink from a line's group; the group itself stays.
    pub fn remove_sink(&self, line_id: &str, sink_id: u64) {
        if let Some(mut group) = self.groups.get_mut(line_id) {
            group.sinks.retain(|sink| sink.id != sink_id);
        }
    }

    pub fn subscriber_count(&self, line_id: &str) -> usize {
        self.groups
            .get(line_id)
            .map(|group| group.sinks.len())
            .unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        self.groups.iter().map(|entry| entry.value().sinks.len()).sum()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Receiving half of one subscriber's stream.
///
/// Implements [`Stream`] so the transport layer can forward positions
/// directly. Dropping it unsubscribes.
pub struct Subscription {
    line_id: String,
    sink_id: u64,
    rx: mpsc::Receiver<VehiclePosition>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub fn line_id(&self) -> &str {
        &self.line_id
    }

    /// Wait for the next position pushed to this subscriber
    pub async fn recv(&mut self) -> Option<VehiclePosition> {
        self.rx.recv().await
    }

    /// Take the next buffered position without waiting
    pub fn try_recv(&mut self) -> Option<VehiclePosition> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove_sink(&self.line_id, self.sink_id);
        tracing::debug!(line = %self.line_id, sink_id = self.sink_id, "Subscriber removed");
    }
}

impl Stream for Subscription {
    type Item = VehiclePosition;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(line: &str) -> VehiclePosition {
        VehiclePosition {
            route_id: line.to_string(),
            vehicle_id: format!("{}-1", line),
            latitude: 52.52,
            longitude: 13.40,
            timestamp: Utc::now(),
            destination: "Alexanderplatz".to_string(),
        }
    }

    #[test]
    fn subscribe_creates_group_and_counts() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let _subscription = registry.subscribe("100");
        assert_eq!(registry.subscriber_count("100"), 1);
        assert_eq!(registry.lines_with_subscribers(), vec!["100".to_string()]);
    }

    #[test]
    fn empty_groups_are_invisible_to_broadcast() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        registry.ensure_group("M41");
        registry.ensure_group("M41");
        assert_eq!(registry.group_count(), 1);
        assert!(registry.lines_with_subscribers().is_empty());
        assert!(registry.sinks("M41").is_empty());
    }

    #[test]
    fn unknown_lines_read_as_no_subscribers() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        assert_eq!(registry.subscriber_count("404"), 0);
        assert!(registry.sinks("404").is_empty());
        // Must not panic
        registry.remove_sink("404", 1);
    }

    #[test]
    fn dropping_a_subscription_removes_only_that_sink() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let first = registry.subscribe("100");
        let second = registry.subscribe("100");
        assert_eq!(registry.subscriber_count("100"), 2);

        drop(first);
        assert_eq!(registry.subscriber_count("100"), 1);
        // Group survives empty
        drop(second);
        assert_eq!(registry.subscriber_count("100"), 0);
        assert_eq!(registry.group_count(), 1);
    }

    #[tokio::test]
    async fn pushed_positions_reach_the_subscriber() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let mut subscription = registry.subscribe("100");

        let sinks = registry.sinks("100");
        assert_eq!(sinks.len(), 1);
        sinks[0].push(&position("100")).unwrap();

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.route_id, "100");
    }

    #[tokio::test]
    async fn push_to_dropped_subscriber_fails() {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let subscription = registry.subscribe("100");
        let sinks = registry.sinks("100");
        drop(subscription);

        assert!(sinks[0].push(&position("100")).is_err());
    }

    #[tokio::test]
    async fn push_to_full_buffer_fails() {
        let registry = Arc::new(SubscriptionRegistry::new(1));
        let _subscription = registry.subscribe("100");
        let sinks = registry.sinks("100");

        sinks[0].push(&position("100")).unwrap();
        assert!(sinks[0].push(&position("100")).is_err());
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        use tokio_stream::StreamExt;

        let registry = Arc::new(SubscriptionRegistry::new(8));
        let mut subscription = registry.subscribe("U2");
        registry.sinks("U2")[0].push(&position("U2")).unwrap();

        let received = subscription.next().await.unwrap();
        assert_eq!(received.route_id, "U2");
    }
}
