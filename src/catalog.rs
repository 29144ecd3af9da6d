use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::models::{Route, Waypoint};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read routes file: {0}")]
    ReadError(String),
    #[error("Failed to parse routes file: {0}")]
    ParseError(String),
}

/// Read-only mapping from route id to its waypoint geometry.
///
/// Loaded once at startup; only consumed as simulation fallback input and for
/// the route listing endpoint.
pub struct RouteCatalog {
    routes: HashMap<String, Route>,
    /// Preserves file order for listings
    order: Vec<String>,
}

impl RouteCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CatalogError::ReadError(e.to_string()))?;

        let routes: Vec<Route> =
            serde_json::from_str(&content).map_err(|e| CatalogError::ParseError(e.to_string()))?;

        Ok(Self::from_routes(routes))
    }

    pub fn from_routes(routes: Vec<Route>) -> Self {
        let order: Vec<String> = routes.iter().map(|r| r.id.clone()).collect();
        let routes = routes.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self { routes, order }
    }

    /// Waypoints for a route, or `None` when the route is unknown
    pub fn waypoints(&self, route_id: &str) -> Option<&[Waypoint]> {
        self.routes.get(route_id).map(|r| r.waypoints.as_slice())
    }

    /// All routes in file order
    pub fn all(&self) -> impl Iterator<Item = &Route> {
        self.order.iter().filter_map(|id| self.routes.get(id))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
