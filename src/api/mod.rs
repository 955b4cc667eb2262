//! HTTP surface for the dispatch engine, grounded on the teacher's
//! `api_server.rs` router assembly (CORS + tracing middleware over a typed
//! `AppState`).

pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Services;

pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/barcodes/scan", post(handlers::scan))
        .route("/journey/scan", post(handlers::universal_scan))
        .route("/barcodes/order/:order_id/history", get(handlers::order_history))
        .route("/dispatch/assign-shipper", post(handlers::assign_shipper))
        .route("/dispatch/legs/:leg_id", put(handlers::update_leg))
        .route("/dispatch/legs/:leg_id", delete(handlers::delete_leg))
        .route("/dispatch/transfer/assign-shipper", post(handlers::assign_transfer))
        .route("/dispatch/delivery/assign-shipper", post(handlers::assign_delivery))
        .route("/dispatch/orders/:order_id/legs", get(handlers::order_legs))
        .route("/dispatch/summary", get(handlers::dispatch_summary))
        .route("/ai/optimize", post(handlers::ai_optimize))
        .route("/ai/report-incident", post(handlers::report_incident))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(services)
}
