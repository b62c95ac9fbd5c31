//! Route definitions for the fuel-station stock server

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - tanks, calibration, initial state, ledger
        .nest("/tanks", tank_routes())
        // Protected routes - movement-level operations
        .nest("/movements", movement_routes())
        // Protected routes - stock-wide queries
        .nest("/stock", stock_routes())
        // Protected routes - delivery checks
        .nest("/deliveries", delivery_routes())
}

/// Tank routes (protected)
fn tank_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tanks).post(handlers::create_tank))
        .route(
            "/:tank_id",
            get(handlers::get_tank).put(handlers::update_tank),
        )
        .route("/:tank_id/calibration/volume", get(handlers::volume_at))
        .route("/:tank_id/calibration/height", get(handlers::height_at))
        .route(
            "/:tank_id/initial-state",
            get(handlers::get_initial_state)
                .post(handlers::create_initial_state)
                .put(handlers::correct_initial_state)
                .delete(handlers::delete_initial_state),
        )
        .route(
            "/:tank_id/initial-state/mutability",
            get(handlers::get_mutability),
        )
        .route(
            "/:tank_id/movements",
            get(handlers::list_movements).post(handlers::append_movement),
        )
        .route("/:tank_id/stock", get(handlers::current_stock))
        .route("/:tank_id/stock/at", get(handlers::stock_at))
        .route(
            "/:tank_id/inventory-counts",
            post(handlers::record_inventory_count),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Movement routes (protected)
fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/cancel", post(handlers::cancel_movements))
        .route("/:movement_id/compensate", post(handlers::compensate_movement))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Stock query routes (protected)
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(handlers::low_stock_alerts))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Delivery routes (protected)
fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/:delivery_id/variance", get(handlers::delivery_variance))
        .route_layer(middleware::from_fn(auth_middleware))
}
