//! Canonical data model for the dispatch engine.
//!
//! Field types are kept close to the spec's semantic types; enums carry
//! their own wire-stable string names via `serde(rename_all = ...)` rather
//! than the teacher's hand-rolled `From<&str>` (see DESIGN.md).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub area_id: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
    pub status: AreaStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseType {
    Hub,
    Satellite,
    LocalDepot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseStatus {
    Active,
    Inactive,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub warehouse_id: String,
    #[serde(rename = "type")]
    pub kind: WarehouseType,
    pub lat: f64,
    pub lon: f64,
    pub area_id: String,
    pub capacity_limit: i64,
    pub current_load: i64,
    pub status: WarehouseStatus,
}

impl Warehouse {
    pub fn has_coords(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, WarehouseStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmeStatus {
    Pending,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sme {
    pub sme_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub area_id: String,
    pub status: SmeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vehicle {
    Motorbike,
    Car,
    Truck,
    Bicycle,
}

impl Vehicle {
    /// Vehicle mode as the routing provider expects it: unknown modes
    /// fall back to `car`; here every variant maps explicitly.
    pub fn routing_mode(&self) -> &'static str {
        match self {
            Vehicle::Motorbike | Vehicle::Bicycle => "bike",
            Vehicle::Car => "car",
            Vehicle::Truck => "truck",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierStatus {
    Offline,
    Online,
    Delivering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub courier_id: String,
    pub vehicle: Vehicle,
    pub status: CourierStatus,
    pub area_id: String,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
    pub rating: f64,
    pub home_warehouse_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    InTransit,
    AtWarehouse,
    Delivering,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub order_code: String,
    pub sme_id: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub receiver_lat: Option<f64>,
    pub receiver_lon: Option<f64>,
    pub weight: f64,
    pub status: OrderStatus,
    pub barcode_id: String,
    pub area_id: String,
    pub total_distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barcode {
    pub barcode_id: String,
    pub code_value: String,
}

impl Barcode {
    /// `ORD{8 hex}{6-digit epoch suffix}`, grounded on the original
    /// `BarcodeService.generate_barcode_value` format.
    pub fn generate_code_value(order_id: &str, now: NaiveDateTime) -> String {
        let short_id: String = order_id
            .chars()
            .filter(|c| *c != '-')
            .take(8)
            .collect::<String>()
            .to_uppercase();
        let epoch = now.and_utc().timestamp();
        let suffix = format!("{epoch:06}");
        let suffix = &suffix[suffix.len().saturating_sub(6)..];
        format!("ORD{short_id}{suffix}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegType {
    Pickup,
    Transfer,
    Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyLeg {
    pub leg_id: String,
    pub order_id: String,
    pub sequence: i32,
    pub leg_type: LegType,
    pub status: LegStatus,
    pub origin_sme_id: Option<String>,
    pub origin_warehouse_id: Option<String>,
    pub destination_warehouse_id: Option<String>,
    pub destination_is_receiver: bool,
    pub assigned_courier_id: Option<String>,
    pub estimated_distance_km: Option<f64>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl JourneyLeg {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, LegStatus::Completed | LegStatus::Cancelled)
    }
}

/// Role abstraction the scan state machine is defined over (§9 Open
/// Questions resolves the concrete identity roles to these two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Courier,
    WarehouseStaff,
}

/// Enriched read-model row returned by `JourneyView`: a leg plus the
/// display name of its assigned courier, for UI use only.
#[derive(Debug, Clone, Serialize)]
pub struct JourneyLegView {
    #[serde(flatten)]
    pub leg: JourneyLeg,
    pub assigned_courier_name: Option<String>,
}
