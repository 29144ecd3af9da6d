pub mod health;
pub mod routes;
pub mod stream;

use std::sync::Arc;

use axum::Router;

use crate::catalog::RouteCatalog;
use crate::providers::radar::RadarClient;
use crate::services::identity::VehicleIdentityRegistry;
use crate::services::subscriptions::SubscriptionRegistry;

pub fn router(
    catalog: Arc<RouteCatalog>,
    radar: RadarClient,
    subscriptions: Arc<SubscriptionRegistry>,
    identity: Arc<VehicleIdentityRegistry>,
) -> Router {
    Router::new()
        .nest(
            "/routes",
            routes::router(catalog.clone(), radar, identity.clone()),
        )
        .nest("/stream", stream::router(subscriptions.clone()))
        .nest("/health", health::router(catalog, subscriptions, identity))
}
