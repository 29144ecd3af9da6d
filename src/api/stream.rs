use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use tokio_stream::{Stream, StreamExt};

use crate::services::subscriptions::SubscriptionRegistry;

#[derive(Clone)]
pub struct StreamState {
    pub subscriptions: Arc<SubscriptionRegistry>,
}

/// Live position stream for one line (Server-Sent Events).
///
/// The subscription is torn down when the client disconnects and the
/// response stream is dropped.
pub async fn stream_line(
    Path(line_id): Path<String>,
    State(state): State<StreamState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!(line = %line_id, "Stream subscriber connected");

    let subscription = state.subscriptions.subscribe(&line_id);
    let stream =
        subscription.map(|position| Event::default().event("position").json_data(&position));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn router(subscriptions: Arc<SubscriptionRegistry>) -> Router {
    let state = StreamState { subscriptions };
    Router::new()
        .route("/{line_id}", get(stream_line))
        .with_state(state)
}
