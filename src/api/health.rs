use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::RouteCatalog;
use crate::services::identity::VehicleIdentityRegistry;
use crate::services::subscriptions::SubscriptionRegistry;

#[derive(Clone)]
pub struct HealthState {
    pub catalog: Arc<RouteCatalog>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub identity: Arc<VehicleIdentityRegistry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of routes with known geometry
    pub route_count: usize,
    /// Number of line groups seen so far
    pub line_group_count: usize,
    /// Number of lines with at least one live subscriber
    pub active_line_count: usize,
    /// Total live subscribers across all lines
    pub subscriber_count: usize,
    /// Number of trip ids currently mapped to stable vehicle ids
    pub tracked_vehicle_count: usize,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        route_count: state.catalog.len(),
        line_group_count: state.subscriptions.group_count(),
        active_line_count: state.subscriptions.lines_with_subscribers().len(),
        subscriber_count: state.subscriptions.total_subscribers(),
        tracked_vehicle_count: state.identity.len(),
    })
}

pub fn router(
    catalog: Arc<RouteCatalog>,
    subscriptions: Arc<SubscriptionRegistry>,
    identity: Arc<VehicleIdentityRegistry>,
) -> Router {
    let state = HealthState {
        catalog,
        subscriptions,
        identity,
    };
    Router::new().route("/", get(health_check)).with_state(state)
}
