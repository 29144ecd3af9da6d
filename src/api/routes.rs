use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::RouteCatalog;
use crate::models::{Route, VehiclePosition};
use crate::providers::radar::RadarClient;
use crate::services::activity;
use crate::services::broadcaster::position_from_movement;
use crate::services::identity::VehicleIdentityRegistry;

#[derive(Clone)]
pub struct RoutesState {
    pub catalog: Arc<RouteCatalog>,
    pub radar: RadarClient,
    pub identity: Arc<VehicleIdentityRegistry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteListResponse {
    pub routes: Vec<Route>,
}

/// One line ranked by current vehicle count
#[derive(Debug, Serialize, ToSchema)]
pub struct LineActivity {
    pub id: String,
    pub name: String,
    pub vehicle_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopLinesResponse {
    pub lines: Vec<LineActivity>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineVehiclesResponse {
    pub line_id: String,
    pub vehicles: Vec<VehiclePosition>,
}

/// List all routes with known geometry
#[utoipa::path(
    get,
    path = "/api/routes",
    responses(
        (status = 200, description = "Routes with waypoint geometry", body = RouteListResponse)
    ),
    tag = "routes"
)]
pub async fn list_routes(State(state): State<RoutesState>) -> Json<RouteListResponse> {
    Json(RouteListResponse {
        routes: state.catalog.all().cloned().collect(),
    })
}

/// The three currently most active lines in the radar data
#[utoipa::path(
    get,
    path = "/api/routes/top-lines",
    responses(
        (status = 200, description = "Most active lines, descending by vehicle count", body = TopLinesResponse)
    ),
    tag = "routes"
)]
pub async fn top_lines(State(state): State<RoutesState>) -> Json<TopLinesResponse> {
    let lines = match state.radar.fetch_movements().await {
        Ok(movements) => activity::top_n(&movements, 3)
            .into_iter()
            .map(|(id, vehicle_count)| LineActivity {
                name: format!("Line {} (Berlin Transport)", id),
                id,
                vehicle_count,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Radar poll failed, returning fallback lines");
            fallback_lines()
        }
    };

    Json(TopLinesResponse { lines })
}

/// Common lines offered when the radar feed cannot be reached
fn fallback_lines() -> Vec<LineActivity> {
    ["255", "100", "200"]
        .into_iter()
        .map(|id| LineActivity {
            id: id.to_string(),
            name: format!("Line {} (Fallback)", id),
            vehicle_count: 0,
        })
        .collect()
}

/// Current real vehicles for one line
#[utoipa::path(
    get,
    path = "/api/routes/{line_id}/vehicles",
    params(
        ("line_id" = String, Path, description = "Line to query, e.g. 100 or U2")
    ),
    responses(
        (status = 200, description = "Vehicles currently observed on the line; empty when the feed is unreachable", body = LineVehiclesResponse)
    ),
    tag = "routes"
)]
pub async fn line_vehicles(
    Path(line_id): Path<String>,
    State(state): State<RoutesState>,
) -> Json<LineVehiclesResponse> {
    let vehicles = match state.radar.fetch_movements().await {
        Ok(movements) => movements
            .iter()
            .filter(|m| activity::in_scope_line(m) == Some(line_id.as_str()))
            .filter_map(|m| position_from_movement(&state.identity, &line_id, m))
            .collect(),
        Err(e) => {
            tracing::warn!(line = %line_id, error = %e, "Radar poll failed, returning no vehicles");
            Vec::new()
        }
    };

    Json(LineVehiclesResponse { line_id, vehicles })
}

pub fn router(
    catalog: Arc<RouteCatalog>,
    radar: RadarClient,
    identity: Arc<VehicleIdentityRegistry>,
) -> Router {
    let state = RoutesState {
        catalog,
        radar,
        identity,
    };
    Router::new()
        .route("/", get(list_routes))
        .route("/top-lines", get(top_lines))
        .route("/{line_id}/vehicles", get(line_vehicles))
        .with_state(state)
}
