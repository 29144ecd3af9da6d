pub mod api;
mod catalog;
mod config;
mod models;
mod providers;
mod services;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use catalog::RouteCatalog;
use config::Config;
use providers::radar::RadarClient;
use services::broadcaster::Broadcaster;
use services::identity::VehicleIdentityRegistry;
use services::subscriptions::SubscriptionRegistry;

#[derive(OpenApi)]
#[openapi(
    info(title = "Live Vehicle Radar API", version = "0.1.0"),
    paths(
        api::routes::list_routes,
        api::routes::top_lines,
        api::routes::line_vehicles,
        api::health::health_check,
    ),
    components(schemas(
        models::Route,
        models::Waypoint,
        models::VehiclePosition,
        api::routes::RouteListResponse,
        api::routes::LineActivity,
        api::routes::TopLinesResponse,
        api::routes::LineVehiclesResponse,
        api::health::HealthResponse,
    )),
    tags(
        (name = "routes", description = "Route geometry and line activity"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        bind_addr = %config.bind_addr,
        routes_file = %config.routes_file,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Load route geometry for the simulation fallback
    let catalog =
        Arc::new(RouteCatalog::load(&config.routes_file).expect("Failed to load routes file"));
    tracing::info!(routes = catalog.len(), "Loaded route catalog");

    // Shared state
    let radar = RadarClient::new(&config.radar).expect("Failed to build radar client");
    let subscriptions = Arc::new(SubscriptionRegistry::new(config.broadcast.channel_capacity));
    let identity = Arc::new(VehicleIdentityRegistry::new());

    // Start the broadcast scheduler in the background
    let broadcaster = Arc::new(Broadcaster::new(
        radar.clone(),
        catalog.clone(),
        subscriptions.clone(),
        identity.clone(),
        config.broadcast.clone(),
    ));
    tokio::spawn(async move {
        broadcaster.start().await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest(
            "/api",
            api::router(catalog, radar, subscriptions, identity),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Live Vehicle Radar API"
}
