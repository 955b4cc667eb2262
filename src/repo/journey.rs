//! C1 Journey Model: typed constructors, validators, and persistence for
//! orders, barcodes, and journey legs. Only C3–C7 call the write methods
//! here; this module owns the invariants in §3 and rejects anything that
//! would violate them.

use chrono::Utc;
use uuid::Uuid;

use crate::db::DbConn;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Barcode, JourneyLeg, JourneyLegView, LegStatus, LegType, Order, OrderStatus,
};

/// A fully-built leg ready to persist, produced by the planner (C3) before
/// `order_id`/`leg_id` are known.
#[derive(Debug, Clone)]
pub struct NewLeg {
    pub sequence: i32,
    pub leg_type: LegType,
    pub origin_sme_id: Option<String>,
    pub origin_warehouse_id: Option<String>,
    pub destination_warehouse_id: Option<String>,
    pub destination_is_receiver: bool,
    pub assigned_courier_id: Option<String>,
    pub estimated_distance_km: Option<f64>,
}

pub struct NewOrder {
    pub sme_id: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub receiver_lat: Option<f64>,
    pub receiver_lon: Option<f64>,
    pub weight: f64,
    pub area_id: String,
}

/// Partial patch for `PUT /dispatch/legs/{leg_id}`.
#[derive(Debug, Default)]
pub struct LegPatch {
    pub assigned_courier_id: Option<Option<String>>,
    pub origin_warehouse_id: Option<Option<String>>,
    pub destination_warehouse_id: Option<Option<String>>,
    pub status: Option<LegStatus>,
    pub estimated_distance_km: Option<Option<f64>>,
}

#[derive(Clone)]
pub struct JourneyRepo {
    db: DbConn,
}

/// Validates the §3 cross-cutting invariants for a candidate leg sequence.
/// Pure, so the planner can call it before persisting.
pub fn validate_leg_sequence(legs: &[NewLeg]) -> EngineResult<()> {
    if legs.len() < 2 || legs.len() > 3 {
        return Err(EngineError::InvalidState(format!(
            "journey must have 2 or 3 legs, got {}",
            legs.len()
        )));
    }
    for (i, leg) in legs.iter().enumerate() {
        if leg.sequence != (i as i32) + 1 {
            return Err(EngineError::InvalidState(
                "leg sequence must be contiguous starting at 1".into(),
            ));
        }
        let has_origin = leg.origin_sme_id.is_some() as i32 + leg.origin_warehouse_id.is_some() as i32;
        if has_origin > 1 {
            return Err(EngineError::InvalidState(
                "leg endpoint invariant: at most one origin source".into(),
            ));
        }
        let has_dest = leg.destination_warehouse_id.is_some() as i32 + leg.destination_is_receiver as i32;
        if has_dest != 1 {
            return Err(EngineError::InvalidState(
                "leg endpoint invariant: exactly one destination kind".into(),
            ));
        }
    }
    match legs.len() {
        2 => {
            if legs[0].leg_type != LegType::Pickup || legs[1].leg_type != LegType::Delivery {
                return Err(EngineError::InvalidState(
                    "2-leg journey must be [PICKUP, DELIVERY]".into(),
                ));
            }
        }
        3 => {
            if legs[0].leg_type != LegType::Pickup
                || legs[1].leg_type != LegType::Transfer
                || legs[2].leg_type != LegType::Delivery
            {
                return Err(EngineError::InvalidState(
                    "3-leg journey must be [PICKUP, TRANSFER, DELIVERY]".into(),
                ));
            }
        }
        _ => unreachable!(),
    }
    if legs.first().unwrap().origin_sme_id.is_none() {
        return Err(EngineError::InvalidState(
            "first leg's origin must be the SME".into(),
        ));
    }
    if !legs.last().unwrap().destination_is_receiver {
        return Err(EngineError::InvalidState(
            "last leg's destination must be the receiver".into(),
        ));
    }
    for pair in legs.windows(2) {
        if let (Some(dst), Some(origin)) = (&pair[0].destination_warehouse_id, &pair[1].origin_warehouse_id) {
            if dst != origin {
                return Err(EngineError::InvalidState(
                    "adjacent legs must chain: leg[i].destination_warehouse_id == leg[i+1].origin_warehouse_id".into(),
                ));
            }
        }
    }
    Ok(())
}

impl JourneyRepo {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create_order(&self, new: NewOrder) -> EngineResult<Order> {
        let order_id = Uuid::new_v4().to_string();
        let barcode_id = Uuid::new_v4().to_string();
        let code_value = Barcode::generate_code_value(&order_id, Utc::now().naive_utc());
        let order_code = code_value.clone();

        self.db
            .query("CREATE barcode SET barcode_id = $barcode_id, code_value = $code_value")
            .bind(("barcode_id", barcode_id.clone()))
            .bind(("code_value", code_value))
            .await?;

        let mut res = self
            .db
            .query(
                "CREATE orders SET \
                    order_id = $order_id, order_code = $order_code, sme_id = $sme_id, \
                    receiver_name = $receiver_name, receiver_phone = $receiver_phone, \
                    receiver_address = $receiver_address, receiver_lat = $receiver_lat, \
                    receiver_lon = $receiver_lon, weight = $weight, status = $status, \
                    barcode_id = $barcode_id, area_id = $area_id, total_distance_km = NONE",
            )
            .bind(("order_id", order_id))
            .bind(("order_code", order_code))
            .bind(("sme_id", new.sme_id))
            .bind(("receiver_name", new.receiver_name))
            .bind(("receiver_phone", new.receiver_phone))
            .bind(("receiver_address", new.receiver_address))
            .bind(("receiver_lat", new.receiver_lat))
            .bind(("receiver_lon", new.receiver_lon))
            .bind(("weight", new.weight))
            .bind(("status", OrderStatus::Pending))
            .bind(("barcode_id", barcode_id))
            .bind(("area_id", new.area_id))
            .await?;
        let rows: Vec<Order> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::UpstreamError("order create returned no row".into()))
    }

    pub async fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        let mut res = self
            .db
            .query("SELECT * FROM orders WHERE order_id = $id LIMIT 1")
            .bind(("id", order_id.to_string()))
            .await?;
        let rows: Vec<Order> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))
    }

    pub async fn get_order_by_barcode_code(&self, code_value: &str) -> EngineResult<(Order, Barcode)> {
        let mut res = self
            .db
            .query("SELECT * FROM barcode WHERE code_value = $code LIMIT 1")
            .bind(("code", code_value.to_string()))
            .await?;
        let barcodes: Vec<Barcode> = res.take(0)?;
        let barcode = barcodes
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("barcode {code_value}")))?;

        let mut res = self
            .db
            .query("SELECT * FROM orders WHERE barcode_id = $bid LIMIT 1")
            .bind(("bid", barcode.barcode_id.clone()))
            .await?;
        let orders: Vec<Order> = res.take(0)?;
        let order = orders
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("order for barcode {code_value}")))?;
        Ok((order, barcode))
    }

    pub async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> EngineResult<()> {
        self.db
            .query("UPDATE orders SET status = $status WHERE order_id = $id")
            .bind(("status", status))
            .bind(("id", order_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn set_order_total_distance(
        &self,
        order_id: &str,
        total_distance_km: Option<f64>,
    ) -> EngineResult<()> {
        self.db
            .query("UPDATE orders SET total_distance_km = $total WHERE order_id = $id")
            .bind(("total", total_distance_km))
            .bind(("id", order_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn delete_order(&self, order_id: &str) -> EngineResult<()> {
        let order = self.get_order(order_id).await?;
        self.db
            .query("DELETE order_journey_legs WHERE order_id = $id")
            .bind(("id", order_id.to_string()))
            .await?;
        self.db
            .query("DELETE barcode WHERE barcode_id = $bid")
            .bind(("bid", order.barcode_id))
            .await?;
        self.db
            .query("DELETE orders WHERE order_id = $id")
            .bind(("id", order_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn list_legs(&self, order_id: &str) -> EngineResult<Vec<JourneyLeg>> {
        let mut res = self
            .db
            .query("SELECT * FROM order_journey_legs WHERE order_id = $id ORDER BY sequence ASC")
            .bind(("id", order_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn get_leg(&self, leg_id: &str) -> EngineResult<JourneyLeg> {
        let mut res = self
            .db
            .query("SELECT * FROM order_journey_legs WHERE leg_id = $id LIMIT 1")
            .bind(("id", leg_id.to_string()))
            .await?;
        let rows: Vec<JourneyLeg> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("leg {leg_id}")))
    }

    /// First leg matching `(order, leg_type, status)`, used by the scan
    /// state machine and role-scoped assignment.
    pub async fn find_leg(
        &self,
        order_id: &str,
        leg_type: LegType,
        status: LegStatus,
    ) -> EngineResult<Option<JourneyLeg>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM order_journey_legs \
                 WHERE order_id = $order_id AND leg_type = $leg_type AND status = $status \
                 ORDER BY sequence ASC LIMIT 1",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("leg_type", leg_type))
            .bind(("status", status))
            .await?;
        let rows: Vec<JourneyLeg> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// The pending transfer leg departing `warehouse_id` for this specific
    /// order, used by `WAREHOUSE_OUT`. Order-scoped so that a second order
    /// with its own pending transfer leg at the same hub never shadows this
    /// order's leg.
    pub async fn find_pending_transfer_from_warehouse_for_order(
        &self,
        order_id: &str,
        warehouse_id: &str,
    ) -> EngineResult<Option<JourneyLeg>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM order_journey_legs \
                 WHERE order_id = $order_id AND origin_warehouse_id = $wid \
                 AND leg_type = $leg_type AND status = $status \
                 ORDER BY sequence ASC LIMIT 1",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("wid", warehouse_id.to_string()))
            .bind(("leg_type", LegType::Transfer))
            .bind(("status", LegStatus::Pending))
            .await?;
        let rows: Vec<JourneyLeg> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// All pending transfer legs departing `warehouse_id`, across every
    /// order, used by Phase 2 consolidation to batch a hub's whole ready
    /// queue rather than a single arbitrary leg.
    pub async fn list_pending_transfers_from_warehouse(
        &self,
        warehouse_id: &str,
    ) -> EngineResult<Vec<JourneyLeg>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM order_journey_legs \
                 WHERE origin_warehouse_id = $wid AND leg_type = $leg_type AND status = $status \
                 ORDER BY sequence ASC",
            )
            .bind(("wid", warehouse_id.to_string()))
            .bind(("leg_type", LegType::Transfer))
            .bind(("status", LegStatus::Pending))
            .await?;
        Ok(res.take(0)?)
    }

    /// The earliest non-`COMPLETED` leg for an order, used by the
    /// universal-scan variant.
    pub async fn earliest_open_leg(&self, order_id: &str) -> EngineResult<Option<JourneyLeg>> {
        let legs = self.list_legs(order_id).await?;
        Ok(legs
            .into_iter()
            .find(|l| !matches!(l.status, LegStatus::Completed)))
    }

    /// Non-terminal legs assigned to a courier, used to decide whether the
    /// courier drops back to `ONLINE` and by the incident
    /// handler.
    pub async fn list_non_terminal_legs_for_courier(
        &self,
        courier_id: &str,
    ) -> EngineResult<Vec<JourneyLeg>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM order_journey_legs \
                 WHERE assigned_courier_id = $cid AND status IN ['PENDING', 'IN_PROGRESS']",
            )
            .bind(("cid", courier_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    /// Persists a validated set of planned legs for an order. The caller
    /// (planner/dispatcher) is responsible for order status transitions.
    pub async fn create_legs(&self, order_id: &str, legs: Vec<NewLeg>) -> EngineResult<Vec<JourneyLeg>> {
        validate_leg_sequence(&legs)?;
        let existing = self.list_legs(order_id).await?;
        if !existing.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "order {order_id} already has legs"
            )));
        }
        let mut created = Vec::with_capacity(legs.len());
        for leg in legs {
            let leg_id = Uuid::new_v4().to_string();
            let mut res = self
                .db
                .query(
                    "CREATE order_journey_legs SET \
                        leg_id = $leg_id, order_id = $order_id, sequence = $sequence, \
                        leg_type = $leg_type, status = $status, origin_sme_id = $origin_sme_id, \
                        origin_warehouse_id = $origin_warehouse_id, \
                        destination_warehouse_id = $destination_warehouse_id, \
                        destination_is_receiver = $destination_is_receiver, \
                        assigned_courier_id = $assigned_courier_id, \
                        estimated_distance_km = $estimated_distance_km, \
                        started_at = NONE, completed_at = NONE",
                )
                .bind(("leg_id", leg_id))
                .bind(("order_id", order_id.to_string()))
                .bind(("sequence", leg.sequence))
                .bind(("leg_type", leg.leg_type))
                .bind(("status", LegStatus::Pending))
                .bind(("origin_sme_id", leg.origin_sme_id))
                .bind(("origin_warehouse_id", leg.origin_warehouse_id))
                .bind(("destination_warehouse_id", leg.destination_warehouse_id))
                .bind(("destination_is_receiver", leg.destination_is_receiver))
                .bind(("assigned_courier_id", leg.assigned_courier_id))
                .bind(("estimated_distance_km", leg.estimated_distance_km))
                .await?;
            let rows: Vec<JourneyLeg> = res.take(0)?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| EngineError::UpstreamError("leg create returned no row".into()))?;
            created.push(row);
        }
        Ok(created)
    }

    pub async fn delete_leg(&self, leg_id: &str) -> EngineResult<()> {
        let leg = self.get_leg(leg_id).await?;
        if matches!(leg.status, LegStatus::InProgress | LegStatus::Completed) {
            return Err(EngineError::InvalidState(format!(
                "leg {leg_id} is {:?}, cannot delete",
                leg.status
            )));
        }
        self.db
            .query("DELETE order_journey_legs WHERE leg_id = $id")
            .bind(("id", leg_id.to_string()))
            .await?;
        Ok(())
    }

    /// Applies a patch to a `PENDING` leg. Completion
    /// ordering and `COMPLETED`-leg immutability are enforced by the caller
    /// transitioning status through [`Self::transition_leg`] instead.
    pub async fn patch_leg(&self, leg_id: &str, patch: LegPatch) -> EngineResult<JourneyLeg> {
        let leg = self.get_leg(leg_id).await?;
        if matches!(leg.status, LegStatus::Completed) {
            return Err(EngineError::InvalidState(format!(
                "leg {leg_id} is COMPLETED, cannot update"
            )));
        }
        if let Some(LegStatus::InProgress) = patch.status {
            let courier = patch
                .assigned_courier_id
                .clone()
                .flatten()
                .or_else(|| leg.assigned_courier_id.clone());
            if courier.is_none() {
                return Err(EngineError::InvalidState(
                    "cannot start a leg without an assigned courier".into(),
                ));
            }
        }

        let mut query = String::from("UPDATE order_journey_legs SET ");
        let mut clauses = Vec::new();
        if patch.assigned_courier_id.is_some() {
            clauses.push("assigned_courier_id = $assigned_courier_id");
        }
        if patch.origin_warehouse_id.is_some() {
            clauses.push("origin_warehouse_id = $origin_warehouse_id");
        }
        if patch.destination_warehouse_id.is_some() {
            clauses.push("destination_warehouse_id = $destination_warehouse_id");
        }
        if patch.status.is_some() {
            clauses.push("status = $status");
        }
        if patch.estimated_distance_km.is_some() {
            clauses.push("estimated_distance_km = $estimated_distance_km");
        }
        if clauses.is_empty() {
            return Ok(leg);
        }
        query.push_str(&clauses.join(", "));
        query.push_str(" WHERE leg_id = $leg_id");

        let mut q = self.db.query(query).bind(("leg_id", leg_id.to_string()));
        if let Some(v) = patch.assigned_courier_id {
            q = q.bind(("assigned_courier_id", v));
        }
        if let Some(v) = patch.origin_warehouse_id {
            q = q.bind(("origin_warehouse_id", v));
        }
        if let Some(v) = patch.destination_warehouse_id {
            q = q.bind(("destination_warehouse_id", v));
        }
        if let Some(v) = patch.status {
            q = q.bind(("status", v));
        }
        if let Some(v) = patch.estimated_distance_km {
            q = q.bind(("estimated_distance_km", v));
        }
        q.await?;
        self.get_leg(leg_id).await
    }

    /// Transitions a leg's status, enforcing the completion-ordering
    /// invariant (§3: "a leg may be COMPLETED only if all legs with smaller
    /// sequence on the same order are COMPLETED") and stamping
    /// `started_at`/`completed_at`.
    pub async fn transition_leg(&self, leg_id: &str, new_status: LegStatus) -> EngineResult<JourneyLeg> {
        let leg = self.get_leg(leg_id).await?;
        if matches!(new_status, LegStatus::Completed) {
            let siblings = self.list_legs(&leg.order_id).await?;
            let out_of_order = siblings
                .iter()
                .any(|l| l.sequence < leg.sequence && !matches!(l.status, LegStatus::Completed));
            if out_of_order {
                return Err(EngineError::InvalidState(format!(
                    "leg {leg_id} cannot complete before earlier legs on order {}",
                    leg.order_id
                )));
            }
        }
        let now = Utc::now().naive_utc();
        let (started_at_clause, completed_at_clause) = match new_status {
            LegStatus::InProgress => (", started_at = $now", ""),
            LegStatus::Completed => ("", ", completed_at = $now"),
            _ => ("", ""),
        };
        let query = format!(
            "UPDATE order_journey_legs SET status = $status{started_at_clause}{completed_at_clause} WHERE leg_id = $id"
        );
        self.db
            .query(query)
            .bind(("status", new_status))
            .bind(("now", now))
            .bind(("id", leg_id.to_string()))
            .await?;
        self.get_leg(leg_id).await
    }

    /// `get_pending_orders`: pending orders in an area whose
    /// receiver coordinates are present and that have no legs yet.
    pub async fn list_pending_orders_with_coords(&self, area_id: &str) -> EngineResult<Vec<Order>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM orders \
                 WHERE area_id = $area_id AND status = $status \
                 AND receiver_lat IS NOT NONE AND receiver_lon IS NOT NONE",
            )
            .bind(("area_id", area_id.to_string()))
            .bind(("status", OrderStatus::Pending))
            .await?;
        let orders: Vec<Order> = res.take(0)?;
        let mut with_no_legs = Vec::with_capacity(orders.len());
        for order in orders {
            if self.list_legs(&order.order_id).await?.is_empty() {
                with_no_legs.push(order);
            }
        }
        Ok(with_no_legs)
    }

    /// Counts completed PICKUP legs per destination hub, the sole input to
    /// the periodic warehouse-load sync (§5, §9 Open Questions: incremental
    /// per-scan updates are dropped in favor of this absolute recompute).
    pub async fn count_completed_pickups_by_warehouse(&self) -> EngineResult<Vec<(String, i64)>> {
        #[derive(serde::Deserialize)]
        struct Row {
            destination_warehouse_id: String,
            count: i64,
        }
        let mut res = self
            .db
            .query(
                "SELECT destination_warehouse_id, count() AS count FROM order_journey_legs \
                 WHERE leg_type = $leg_type AND status = $status AND destination_warehouse_id IS NOT NONE \
                 GROUP BY destination_warehouse_id",
            )
            .bind(("leg_type", LegType::Pickup))
            .bind(("status", LegStatus::Completed))
            .await?;
        let rows: Vec<Row> = res.take(0)?;
        Ok(rows.into_iter().map(|r| (r.destination_warehouse_id, r.count)).collect())
    }

    /// Aggregate counts by status for `GET /dispatch/summary`.
    pub async fn summary(&self) -> EngineResult<Vec<(OrderStatus, i64)>> {
        #[derive(serde::Deserialize)]
        struct Row {
            status: OrderStatus,
            count: i64,
        }
        let mut res = self
            .db
            .query("SELECT status, count() AS count FROM orders GROUP BY status")
            .await?;
        let rows: Vec<Row> = res.take(0)?;
        Ok(rows.into_iter().map(|r| (r.status, r.count)).collect())
    }

    /// `JourneyView(order_id)`: legs ordered by sequence, enriched
    /// with the assigned courier's display name. Courier display names are
    /// owned by the out-of-scope identity service; in absence of a
    /// profile store this engine surfaces the courier id itself.
    pub async fn journey_view(&self, order_id: &str) -> EngineResult<(Order, Vec<JourneyLegView>)> {
        let order = self.get_order(order_id).await?;
        let legs = self.list_legs(order_id).await?;
        let views = legs
            .into_iter()
            .map(|leg| {
                let assigned_courier_name = leg.assigned_courier_id.clone();
                JourneyLegView {
                    leg,
                    assigned_courier_name,
                }
            })
            .collect();
        Ok((order, views))
    }
}
