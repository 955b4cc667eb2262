//! HTTP handlers for the dispatch engine's external surface, following
//! the teacher's `State<AppState>` + typed `Json` response shape in
//! `api/handlers.rs`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::identity::User;
use crate::incident::IncidentOutcome;
use crate::models::{ActorRole, JourneyLeg, JourneyLegView, LegStatus, Order};
use crate::scan::{ScanAction, ScanOutcome, ScanRequest};
use crate::services::Services;

pub type AppState = Arc<Services>;

async fn authenticate(services: &Services, headers: &HeaderMap) -> EngineResult<User> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    services.identity.validate_token(token).await
}

/// `GET /health`: `200` only if the database answers a trivial
/// query.
pub async fn health(State(services): State<AppState>) -> impl axum::response::IntoResponse {
    match services.journeys.summary().await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "error", "message": err.to_string() })),
        ),
    }
}

// ---------------------------------------------------------------------
// Scan / Journey
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub code_value: String,
    pub action: Option<ScanAction>,
    pub warehouse_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[allow(dead_code)]
    pub note: Option<String>,
}

async fn update_courier_location(services: &Services, actor: &User, lat: Option<f64>, lng: Option<f64>) {
    if let (ActorRole::Courier, Some(lat), Some(lng)) = (actor.role, lat, lng) {
        if let Err(err) = services.couriers.set_location(&actor.user_id, lat, lng).await {
            tracing::warn!(error = %err, courier_id = %actor.user_id, "failed to record courier location");
        }
    }
}

/// `POST /barcodes/scan`: explicit action requested by the caller.
pub async fn scan(
    State(services): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ScanBody>,
) -> Result<Json<ScanOutcome>, EngineError> {
    let actor = authenticate(&services, &headers).await?;
    update_courier_location(&services, &actor, body.lat, body.lng).await;
    let outcome = services
        .scans
        .scan(ScanRequest {
            code_value: body.code_value,
            action: body.action,
            warehouse_id: body.warehouse_id,
            actor_id: actor.user_id,
            actor_role: actor.role,
        })
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct UniversalScanBody {
    pub code_value: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// `POST /journey/scan`: infers the action from order/leg state and
/// actor role.
pub async fn universal_scan(
    State(services): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UniversalScanBody>,
) -> Result<Json<ScanOutcome>, EngineError> {
    let actor = authenticate(&services, &headers).await?;
    update_courier_location(&services, &actor, body.lat, body.lng).await;
    let outcome = services
        .scans
        .universal_scan(ScanRequest {
            code_value: body.code_value,
            action: None,
            warehouse_id: None,
            actor_id: actor.user_id,
            actor_role: actor.role,
        })
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub order_id: String,
    pub events: Vec<JourneyLeg>,
}

/// `GET /barcodes/order/{order_id}/history`: the order's legs in
/// chronological (sequence) order, each carrying its own
/// `started_at`/`completed_at` timestamps — the closest equivalent to a scan
/// log this engine persists; there is no separate scan-event table.
pub async fn order_history(
    State(services): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<HistoryResponse>, EngineError> {
    let events = services.journeys.list_legs(&order_id).await?;
    Ok(Json(HistoryResponse { order_id, events }))
}

// ---------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssignShipperBody {
    pub order_id: String,
    pub shipper_id: String,
    pub destination_hub_id: String,
    pub destination_satellite_id: Option<String>,
}

pub async fn assign_shipper(
    State(services): State<AppState>,
    Json(body): Json<AssignShipperBody>,
) -> Result<Json<Vec<JourneyLeg>>, EngineError> {
    let exit_satellite_id = body
        .destination_satellite_id
        .unwrap_or_else(|| body.destination_hub_id.clone());
    let legs = services
        .dispatcher
        .manual_assign(
            &body.order_id,
            &body.shipper_id,
            &body.destination_hub_id,
            &exit_satellite_id,
            None,
        )
        .await?;
    Ok(Json(legs))
}

fn de_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Partial leg patch: a field absent from the JSON body leaves that
/// column untouched; a field present with value `null` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct LegPatchBody {
    #[serde(default, deserialize_with = "de_double_option")]
    pub assigned_courier_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_double_option")]
    pub origin_warehouse_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_double_option")]
    pub destination_warehouse_id: Option<Option<String>>,
    pub status: Option<LegStatus>,
}

pub async fn update_leg(
    State(services): State<AppState>,
    Path(leg_id): Path<String>,
    Json(body): Json<LegPatchBody>,
) -> Result<Json<JourneyLeg>, EngineError> {
    let update = crate::dispatch::LegUpdate {
        assigned_courier_id: body.assigned_courier_id,
        origin_warehouse_id: body.origin_warehouse_id,
        destination_warehouse_id: body.destination_warehouse_id,
        status: body.status,
    };
    let leg = services.dispatcher.update_leg(&leg_id, update).await?;
    Ok(Json(leg))
}

#[derive(Debug, Deserialize)]
pub struct ShipperAssignQuery {
    pub order_id: String,
    pub shipper_id: String,
}

pub async fn assign_transfer(
    State(services): State<AppState>,
    Query(params): Query<ShipperAssignQuery>,
) -> Result<Json<JourneyLeg>, EngineError> {
    let leg = services
        .dispatcher
        .assign_transfer(&params.order_id, &params.shipper_id)
        .await?;
    Ok(Json(leg))
}

pub async fn assign_delivery(
    State(services): State<AppState>,
    Query(params): Query<ShipperAssignQuery>,
) -> Result<Json<JourneyLeg>, EngineError> {
    let leg = services
        .dispatcher
        .assign_delivery(&params.order_id, &params.shipper_id)
        .await?;
    Ok(Json(leg))
}

pub async fn delete_leg(
    State(services): State<AppState>,
    Path(leg_id): Path<String>,
) -> Result<StatusCode, EngineError> {
    services.dispatcher.delete_leg(&leg_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct OrderLegsResponse {
    pub order: Order,
    pub legs: Vec<JourneyLegView>,
}

pub async fn order_legs(
    State(services): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderLegsResponse>, EngineError> {
    let (order, legs) = services.dispatcher.orders_legs_view(&order_id).await?;
    Ok(Json(OrderLegsResponse { order, legs }))
}

pub async fn dispatch_summary(
    State(services): State<AppState>,
) -> Result<Json<crate::dispatch::DispatchSummary>, EngineError> {
    Ok(Json(services.dispatcher.summary().await?))
}

// ---------------------------------------------------------------------
// AI Optimizer
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct OptimizeBody {
    pub target_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub status: &'static str,
    pub summary: String,
    pub processed_count: usize,
    pub details: Vec<serde_json::Value>,
}

/// `POST /ai/optimize`: runs the deterministic in-process tick for one
/// area (`target_id`) or every `ACTIVE` area.
pub async fn ai_optimize(
    State(services): State<AppState>,
    Json(body): Json<OptimizeBody>,
) -> Result<Json<OptimizeResponse>, EngineError> {
    let report = match body.target_id {
        Some(area_id) => services.agent.run_tick_for_area(&area_id).await?,
        None => services.agent.run_tick().await?,
    };

    let matched: usize = report.phase_one.iter().map(|p| p.matched).sum();
    let legs_assigned: usize = report.phase_two.iter().map(|p| p.legs_assigned).sum();
    let couriers_moved: usize = report.rebalance.iter().map(|r| r.couriers_moved).sum();
    let processed_count = matched + legs_assigned + couriers_moved;

    let details = report
        .phase_one
        .iter()
        .map(|p| serde_json::json!(p))
        .chain(report.phase_two.iter().map(|p| serde_json::json!(p)))
        .chain(report.rebalance.iter().map(|r| serde_json::json!(r)))
        .collect();

    Ok(Json(OptimizeResponse {
        status: "ok",
        summary: format!(
            "matched {matched} first-mile legs, assigned {legs_assigned} middle-mile legs, moved {couriers_moved} couriers"
        ),
        processed_count,
        details,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IncidentBody {
    pub shipper_id: String,
    pub message: String,
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn report_incident(
    State(services): State<AppState>,
    Json(body): Json<IncidentBody>,
) -> Result<Json<IncidentOutcome>, EngineError> {
    let outcome = services
        .incidents
        .report_incident(&body.shipper_id, &body.message, body.latitude, body.longitude)
        .await?;
    Ok(Json(outcome))
}
