//! Dispatcher: manual and batch courier assignment, leg patching, and
//! role-scoped transfer/delivery assignment.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::lock::LockTable;
use crate::models::{Courier, CourierStatus, LegStatus, LegType, Order, OrderStatus, Vehicle};
use crate::planner::{self, PlannedEndpoints};
use crate::repo::journey::{JourneyRepo, LegPatch, NewLeg};
use crate::repo::{CourierRepo, SmeRepo, WarehouseRepo};
use crate::routing::{distance_or_warn, LatLon, RoutingGateway};

/// Hard vehicle-leg compatibility constraint.
pub fn vehicle_allowed_for_leg(leg_type: LegType, vehicle: Vehicle) -> bool {
    match leg_type {
        LegType::Pickup | LegType::Delivery => {
            matches!(vehicle, Vehicle::Motorbike | Vehicle::Car | Vehicle::Bicycle)
        }
        LegType::Transfer => matches!(vehicle, Vehicle::Truck | Vehicle::Car),
    }
}

fn require_vehicle_allowed(leg_type: LegType, vehicle: Vehicle) -> EngineResult<()> {
    if vehicle_allowed_for_leg(leg_type, vehicle) {
        Ok(())
    } else {
        Err(EngineError::ValidationError(format!(
            "{vehicle:?} is not an allowed vehicle for {leg_type:?} legs"
        )))
    }
}

#[derive(Debug, Default, Clone)]
pub struct LegUpdate {
    pub assigned_courier_id: Option<Option<String>>,
    pub origin_warehouse_id: Option<Option<String>>,
    pub destination_warehouse_id: Option<Option<String>>,
    pub status: Option<LegStatus>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchSummary {
    pub by_status: Vec<(OrderStatus, i64)>,
    pub total_orders: i64,
}

pub struct Dispatcher {
    journeys: JourneyRepo,
    warehouses: WarehouseRepo,
    couriers: CourierRepo,
    sme: SmeRepo,
    gateway: std::sync::Arc<RoutingGateway>,
    locks: LockTable,
}

impl Dispatcher {
    pub fn new(
        journeys: JourneyRepo,
        warehouses: WarehouseRepo,
        couriers: CourierRepo,
        sme: SmeRepo,
        gateway: std::sync::Arc<RoutingGateway>,
        locks: LockTable,
    ) -> Self {
        Self {
            journeys,
            warehouses,
            couriers,
            sme,
            gateway,
            locks,
        }
    }

    fn sme_point(sme: &crate::models::Sme) -> EngineResult<LatLon> {
        match (sme.lat, sme.lon) {
            (Some(lat), Some(lon)) => Ok(LatLon { lat, lon }),
            _ => Err(EngineError::ValidationError(
                "SME has no coordinates".into(),
            )),
        }
    }

    fn receiver_point(order: &Order) -> EngineResult<LatLon> {
        match (order.receiver_lat, order.receiver_lon) {
            (Some(lat), Some(lon)) => Ok(LatLon { lat, lon }),
            _ => Err(EngineError::ValidationError(
                "order has no receiver coordinates".into(),
            )),
        }
    }

    async fn require_online_courier(&self, courier_id: &str) -> EngineResult<Courier> {
        let courier = self.couriers.get(courier_id).await?;
        if !matches!(courier.status, CourierStatus::Online) {
            return Err(EngineError::InvalidState(format!(
                "courier {courier_id} is not ONLINE"
            )));
        }
        Ok(courier)
    }

    /// Manual assignment: builds the journey template for explicitly
    /// chosen hub/satellite and assigns the pickup (and optionally
    /// delivery) courier in one logical operation.
    pub async fn manual_assign(
        &self,
        order_id: &str,
        pickup_courier_id: &str,
        entry_hub_id: &str,
        exit_satellite_id: &str,
        delivery_courier_id: Option<&str>,
    ) -> EngineResult<Vec<crate::models::JourneyLeg>> {
        let _lock = self.locks.lock(order_id).await;

        let order = self.journeys.get_order(order_id).await?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::InTransit) {
            return Err(EngineError::InvalidState(format!(
                "order {order_id} is {:?}, cannot assign",
                order.status
            )));
        }
        if !self.journeys.list_legs(order_id).await?.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "order {order_id} already has legs"
            )));
        }

        let entry_hub = self.warehouses.get(entry_hub_id).await?;
        let exit_satellite = self.warehouses.get(exit_satellite_id).await?;
        if !entry_hub.has_coords() || !exit_satellite.has_coords() {
            return Err(EngineError::ValidationError(
                "hub and satellite must both have coordinates".into(),
            ));
        }

        let pickup_courier = self.require_online_courier(pickup_courier_id).await?;
        require_vehicle_allowed(LegType::Pickup, pickup_courier.vehicle)?;

        let delivery_courier = match delivery_courier_id {
            Some(id) => {
                let courier = self.couriers.get(id).await?;
                require_vehicle_allowed(LegType::Delivery, courier.vehicle)?;
                Some(courier)
            }
            None => None,
        };

        let sme = self.sme.get(&order.sme_id).await?;
        let sme_point = Self::sme_point(&sme)?;
        let receiver_point = Self::receiver_point(&order)?;

        let endpoints = PlannedEndpoints {
            entry_hub,
            exit_satellite,
        };
        let (mut legs, total) =
            planner::plan_legs(&self.gateway, &order.sme_id, sme_point, receiver_point, &endpoints).await?;

        legs[0].assigned_courier_id = Some(pickup_courier_id.to_string());
        if let Some(courier) = &delivery_courier {
            let last = legs.len() - 1;
            legs[last].assigned_courier_id = Some(courier.courier_id.clone());
        }

        let created = self.journeys.create_legs(order_id, legs).await?;
        self.journeys.set_order_total_distance(order_id, total).await?;
        self.journeys
            .set_order_status(order_id, OrderStatus::InTransit)
            .await?;
        self.couriers
            .set_status(pickup_courier_id, CourierStatus::Delivering)
            .await?;
        if let Some(courier) = delivery_courier {
            self.couriers
                .set_status(&courier.courier_id, CourierStatus::Delivering)
                .await?;
        }
        Ok(created)
    }

    /// Batch/AI assignment: `(order_id, courier_id)` pairs, each
    /// auto-planned via the leg planner's endpoint selection. A failure on one pair does
    /// not abort the others; per-pair results are returned in input order.
    pub async fn batch_assign(
        &self,
        pairs: Vec<(String, String)>,
        hubs: &[crate::models::Warehouse],
        satellites: &[crate::models::Warehouse],
    ) -> Vec<(String, EngineResult<Vec<crate::models::JourneyLeg>>)> {
        let mut endpoint_cache: HashMap<String, (crate::models::Warehouse, crate::models::Warehouse)> =
            HashMap::new();
        let mut results = Vec::with_capacity(pairs.len());

        for (order_id, courier_id) in pairs {
            let outcome = self
                .batch_assign_one(&order_id, &courier_id, hubs, satellites, &mut endpoint_cache)
                .await;
            results.push((order_id, outcome));
        }
        results
    }

    async fn batch_assign_one(
        &self,
        order_id: &str,
        courier_id: &str,
        hubs: &[crate::models::Warehouse],
        satellites: &[crate::models::Warehouse],
        endpoint_cache: &mut HashMap<String, (crate::models::Warehouse, crate::models::Warehouse)>,
    ) -> EngineResult<Vec<crate::models::JourneyLeg>> {
        let _lock = self.locks.lock(order_id).await;

        let order = self.journeys.get_order(order_id).await?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::InTransit) {
            return Err(EngineError::InvalidState(format!(
                "order {order_id} is {:?}, cannot assign",
                order.status
            )));
        }
        if !self.journeys.list_legs(order_id).await?.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "order {order_id} already has legs"
            )));
        }

        let pickup_courier = self.require_online_courier(courier_id).await?;
        require_vehicle_allowed(LegType::Pickup, pickup_courier.vehicle)?;

        let sme = self.sme.get(&order.sme_id).await?;
        let sme_point = Self::sme_point(&sme)?;
        let receiver_point = Self::receiver_point(&order)?;

        let cache_key = format!(
            "{:.5},{:.5}|{:.5},{:.5}",
            sme_point.lat, sme_point.lon, receiver_point.lat, receiver_point.lon
        );
        let (entry_hub, exit_satellite) = match endpoint_cache.get(&cache_key) {
            Some(pair) => pair.clone(),
            None => {
                let endpoints =
                    planner::select_endpoints(&self.gateway, sme_point, receiver_point, hubs, satellites)
                        .await?;
                let pair = (endpoints.entry_hub, endpoints.exit_satellite);
                endpoint_cache.insert(cache_key, pair.clone());
                pair
            }
        };

        let endpoints = PlannedEndpoints {
            entry_hub,
            exit_satellite,
        };
        let (mut legs, total) =
            planner::plan_legs(&self.gateway, &order.sme_id, sme_point, receiver_point, &endpoints).await?;
        legs[0].assigned_courier_id = Some(courier_id.to_string());

        let created = self.journeys.create_legs(order_id, legs).await?;
        self.journeys.set_order_total_distance(order_id, total).await?;
        self.journeys
            .set_order_status(order_id, OrderStatus::InTransit)
            .await?;
        self.couriers
            .set_status(courier_id, CourierStatus::Delivering)
            .await?;
        Ok(created)
    }

    /// `PUT /dispatch/legs/{leg_id}`.
    pub async fn update_leg(&self, leg_id: &str, update: LegUpdate) -> EngineResult<crate::models::JourneyLeg> {
        let leg = self.journeys.get_leg(leg_id).await?;
        let _lock = self.locks.lock(&leg.order_id).await;
        if matches!(leg.status, LegStatus::Completed) {
            return Err(EngineError::InvalidState(format!(
                "leg {leg_id} is COMPLETED, cannot update"
            )));
        }

        let resolved_courier_id = update
            .assigned_courier_id
            .clone()
            .unwrap_or_else(|| leg.assigned_courier_id.clone());
        if let Some(courier_id) = &resolved_courier_id {
            let courier = self.couriers.get(courier_id).await?;
            require_vehicle_allowed(leg.leg_type, courier.vehicle)?;
        }

        let endpoints_changed =
            update.origin_warehouse_id.is_some() || update.destination_warehouse_id.is_some();
        let estimated_distance_km = if endpoints_changed {
            Some(self.recompute_leg_distance(&leg, &update, resolved_courier_id.as_deref()).await?)
        } else {
            None
        };

        let patch = LegPatch {
            assigned_courier_id: update.assigned_courier_id.clone(),
            origin_warehouse_id: update.origin_warehouse_id.clone(),
            destination_warehouse_id: update.destination_warehouse_id.clone(),
            status: update.status,
            estimated_distance_km,
        };
        let updated = self.journeys.patch_leg(leg_id, patch).await?;

        if let Some(Some(courier_id)) = &update.assigned_courier_id {
            self.couriers
                .set_status(courier_id, CourierStatus::Delivering)
                .await?;
        }

        Ok(updated)
    }

    async fn recompute_leg_distance(
        &self,
        leg: &crate::models::JourneyLeg,
        update: &LegUpdate,
        courier_id: Option<&str>,
    ) -> EngineResult<Option<f64>> {
        let order = self.journeys.get_order(&leg.order_id).await?;

        let origin_warehouse_id = update
            .origin_warehouse_id
            .clone()
            .unwrap_or_else(|| leg.origin_warehouse_id.clone());
        let origin_point = if let Some(warehouse_id) = origin_warehouse_id {
            let warehouse = self.warehouses.get(&warehouse_id).await?;
            LatLon {
                lat: warehouse.lat,
                lon: warehouse.lon,
            }
        } else {
            let sme = self.sme.get(&order.sme_id).await?;
            Self::sme_point(&sme)?
        };

        let destination_warehouse_id = update
            .destination_warehouse_id
            .clone()
            .unwrap_or_else(|| leg.destination_warehouse_id.clone());
        let destination_point = if let Some(warehouse_id) = destination_warehouse_id {
            let warehouse = self.warehouses.get(&warehouse_id).await?;
            LatLon {
                lat: warehouse.lat,
                lon: warehouse.lon,
            }
        } else {
            Self::receiver_point(&order)?
        };

        let vehicle = match courier_id {
            Some(id) => self.couriers.get(id).await?.vehicle,
            None => Vehicle::Motorbike,
        };

        Ok(distance_or_warn(&self.gateway, origin_point, destination_point, vehicle).await)
    }

    /// `TRANSFER` role-scoped assignment; requires vehicle ∈ {TRUCK, CAR}.
    pub async fn assign_transfer(&self, order_id: &str, courier_id: &str) -> EngineResult<crate::models::JourneyLeg> {
        let _lock_guard = self.locks.lock(order_id).await;
        let leg = self
            .journeys
            .find_leg(order_id, LegType::Transfer, LegStatus::Pending)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pending TRANSFER leg for order {order_id}")))?;
        drop(_lock_guard);
        self.update_leg(
            &leg.leg_id,
            LegUpdate {
                assigned_courier_id: Some(Some(courier_id.to_string())),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn assign_delivery(&self, order_id: &str, courier_id: &str) -> EngineResult<crate::models::JourneyLeg> {
        let _lock_guard = self.locks.lock(order_id).await;
        let leg = self
            .journeys
            .find_leg(order_id, LegType::Delivery, LegStatus::Pending)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pending DELIVERY leg for order {order_id}")))?;
        drop(_lock_guard);
        self.update_leg(
            &leg.leg_id,
            LegUpdate {
                assigned_courier_id: Some(Some(courier_id.to_string())),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_leg(&self, leg_id: &str) -> EngineResult<()> {
        let leg = self.journeys.get_leg(leg_id).await?;
        let _lock = self.locks.lock(&leg.order_id).await;
        self.journeys.delete_leg(leg_id).await
    }

    pub async fn orders_legs_view(
        &self,
        order_id: &str,
    ) -> EngineResult<(Order, Vec<crate::models::JourneyLegView>)> {
        self.journeys.journey_view(order_id).await
    }

    pub async fn summary(&self) -> EngineResult<DispatchSummary> {
        let by_status = self.journeys.summary().await?;
        let total_orders = by_status.iter().map(|(_, count)| count).sum();
        Ok(DispatchSummary {
            by_status,
            total_orders,
        })
    }
}
