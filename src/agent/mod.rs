//! Optimization agent: the scheduled control loop and its tools.
//!
//! [`OptimizationAgent`] implements each phase as a pure-ish method the
//! in-process ticker ([`OptimizationAgent::run_tick`]) calls directly, and
//! that [`tools`] re-exposes as named JSON tools for the external tool-loop
//! driver — grounded on the stateless, per-call dispatch in
//! `bin/mcp_server.rs`.

pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::EngineResult;
use crate::incident::{IncidentHandler, IncidentOutcome};
use crate::models::{
    AreaStatus, Courier, CourierStatus, JourneyLeg, LegStatus, LegType, Order, Vehicle,
    WarehouseType,
};
use crate::repo::{AreaRepo, CourierRepo, JourneyRepo, WarehouseRepo};
use crate::routing::{haversine, LatLon, RoutingGateway};

const FIRST_MILE_MAX_KM: f64 = 15.0;
const REBALANCE_MAX_TRANSFERS: usize = 5;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseOneReport {
    pub area_id: String,
    pub matched: usize,
    pub skipped: Vec<(String, String)>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseTwoReport {
    pub area_id: String,
    pub trucks_used: usize,
    pub legs_assigned: usize,
    pub note: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RebalanceReport {
    pub area_id: String,
    pub couriers_moved: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TickReport {
    pub phase_one: Vec<PhaseOneReport>,
    pub phase_two: Vec<PhaseTwoReport>,
    pub rebalance: Vec<RebalanceReport>,
}

/// Road distance from `from` to each of `destinations`, routed through the
/// same `RoutingGateway::distance_matrix` path `planner::nearest_warehouse`
/// uses for hub/satellite selection, falling back to haversine per-element
/// only if the provider call itself fails outright.
async fn area_distances(gateway: &RoutingGateway, from: LatLon, destinations: &[LatLon]) -> Vec<f64> {
    match gateway.distance_matrix(from, destinations, Vehicle::Motorbike).await {
        Ok(rows) => rows
            .into_iter()
            .zip(destinations.iter())
            .map(|(d, dest)| d.unwrap_or_else(|| haversine(from.lat, from.lon, dest.lat, dest.lon)))
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "area distance matrix unavailable, falling back to haversine");
            destinations
                .iter()
                .map(|dest| haversine(from.lat, from.lon, dest.lat, dest.lon))
                .collect()
        }
    }
}

pub struct OptimizationAgent {
    pub(crate) areas: AreaRepo,
    pub(crate) warehouses: WarehouseRepo,
    pub(crate) couriers: CourierRepo,
    pub(crate) journeys: JourneyRepo,
    pub(crate) gateway: Arc<RoutingGateway>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) incidents: Arc<IncidentHandler>,
}

impl OptimizationAgent {
    pub fn new(
        areas: AreaRepo,
        warehouses: WarehouseRepo,
        couriers: CourierRepo,
        journeys: JourneyRepo,
        gateway: Arc<RoutingGateway>,
        dispatcher: Arc<Dispatcher>,
        incidents: Arc<IncidentHandler>,
    ) -> Self {
        Self {
            areas,
            warehouses,
            couriers,
            journeys,
            gateway,
            dispatcher,
            incidents,
        }
    }

    /// Runs one full tick: phase 1 + phase 2 + rebalance for every `ACTIVE`
    /// area. This is the in-process driver behind the periodic task;
    /// the external tool-loop in [`tools`] exposes the same phases as
    /// individually callable tools for a host LM runtime.
    pub async fn run_tick(&self) -> EngineResult<TickReport> {
        let areas = self.areas.list_active().await?;
        let mut report = TickReport {
            phase_one: Vec::new(),
            phase_two: Vec::new(),
            rebalance: Vec::new(),
        };

        for area in &areas {
            if !matches!(area.status, AreaStatus::Active) {
                continue;
            }
            self.process_area(&area.area_id, &mut report).await?;
        }

        Ok(report)
    }

    /// `POST /ai/optimize` with an explicit `target_id`: runs the same
    /// phases for a single area instead of every `ACTIVE` one.
    pub async fn run_tick_for_area(&self, area_id: &str) -> EngineResult<TickReport> {
        let mut report = TickReport {
            phase_one: Vec::new(),
            phase_two: Vec::new(),
            rebalance: Vec::new(),
        };
        self.process_area(area_id, &mut report).await?;
        Ok(report)
    }

    async fn process_area(&self, area_id: &str, report: &mut TickReport) -> EngineResult<()> {
        if self.should_rebalance(area_id).await? {
            let rebalance = self.rebalance_couriers(area_id, 50.0).await?;
            report.rebalance.push(rebalance);
        }
        let phase_one = self.phase_one_first_mile(area_id).await?;
        report.phase_one.push(phase_one);

        let phase_two = self.phase_two_middle_mile(area_id).await?;
        report.phase_two.push(phase_two);
        Ok(())
    }

    async fn should_rebalance(&self, area_id: &str) -> EngineResult<bool> {
        let pending = self.get_pending_orders(area_id).await?;
        let couriers = self.get_available_couriers(area_id).await?;
        Ok(pending.len() > couriers.len())
    }

    /// `get_pending_orders` tool.
    pub async fn get_pending_orders(&self, area_id: &str) -> EngineResult<Vec<Order>> {
        let pending = self.journeys.list_pending_orders_with_coords(area_id).await?;
        Ok(pending)
    }

    /// `get_available_shippers` tool: online motorbike couriers in the
    /// area, falling back to area centroid when GPS is unknown.
    pub async fn get_available_couriers(&self, area_id: &str) -> EngineResult<Vec<Courier>> {
        self.couriers.list_online_in_area(area_id, Vehicle::Motorbike).await
    }

    fn courier_point(&self, courier: &Courier, area_centroid: (f64, f64)) -> (f64, f64) {
        match (courier.current_lat, courier.current_lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => area_centroid,
        }
    }

    /// `find_nearest_shippers` tool: candidate couriers within 15km of an
    /// order's receiver, sorted ascending by distance (coarse haversine
    /// filter, no external API calls).
    pub fn find_nearest_couriers(
        &self,
        order: &Order,
        couriers: &[Courier],
        area_centroid: (f64, f64),
    ) -> Vec<(Courier, f64)> {
        let (Some(rlat), Some(rlon)) = (order.receiver_lat, order.receiver_lon) else {
            return Vec::new();
        };
        let mut scored: Vec<(Courier, f64)> = couriers
            .iter()
            .map(|c| {
                let (clat, clon) = self.courier_point(c, area_centroid);
                (c.clone(), haversine(rlat, rlon, clat, clon))
            })
            .filter(|(_, d)| *d <= FIRST_MILE_MAX_KM)
            .collect();
        scored.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Phase 1: greedy one-to-one matching by smallest distance,
    /// invoking the dispatcher's batch assignment.
    pub async fn phase_one_first_mile(&self, area_id: &str) -> EngineResult<PhaseOneReport> {
        let orders = self.get_pending_orders(area_id).await?;
        if orders.is_empty() {
            return Ok(PhaseOneReport {
                area_id: area_id.to_string(),
                matched: 0,
                skipped: Vec::new(),
                note: Some("SKIP_PHASE_1: no pending orders with coordinates".to_string()),
            });
        }

        let couriers = self.get_available_couriers(area_id).await?;
        if couriers.is_empty() {
            return Ok(PhaseOneReport {
                area_id: area_id.to_string(),
                matched: 0,
                skipped: Vec::new(),
                note: Some("SKIP_PHASE_1: no available couriers".to_string()),
            });
        }

        let area = self.areas.get(area_id).await?;
        let centroid = (area.center_lat, area.center_lon);

        let mut used: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut pairs = Vec::new();
        let mut skipped = Vec::new();
        for order in &orders {
            let nearest = self.find_nearest_couriers(order, &couriers, centroid);
            match nearest.into_iter().find(|(c, _)| !used.contains(&c.courier_id)) {
                Some((courier, _)) => {
                    used.insert(courier.courier_id.clone());
                    pairs.push((order.order_id.clone(), courier.courier_id.clone()));
                }
                None => skipped.push((order.order_id.clone(), "no courier within range".to_string())),
            }
        }

        let (hubs, satellites) = self.warehouse_candidates().await?;
        let results = self.dispatcher.batch_assign(pairs, &hubs, &satellites).await;
        let mut matched = 0;
        for (order_id, outcome) in results {
            match outcome {
                Ok(_) => matched += 1,
                Err(err) => skipped.push((order_id, err.to_string())),
            }
        }

        Ok(PhaseOneReport {
            area_id: area_id.to_string(),
            matched,
            skipped,
            note: None,
        })
    }

    async fn warehouse_candidates(
        &self,
    ) -> EngineResult<(Vec<crate::models::Warehouse>, Vec<crate::models::Warehouse>)> {
        let hubs = self.warehouses.list_active_by_type(WarehouseType::Hub).await?;
        let satellites = self
            .warehouses
            .list_active_by_type(WarehouseType::Satellite)
            .await?;
        Ok((hubs, satellites))
    }

    /// `get_area_transfer_queue` tool: pending transfer legs
    /// whose origin hub is in `area_id` and whose preceding pickup leg has
    /// completed.
    pub async fn get_area_transfer_queue(&self, area_id: &str) -> EngineResult<Vec<JourneyLeg>> {
        let hubs = self.warehouses.list_in_area(area_id).await?;
        let hub_ids: std::collections::HashSet<String> = hubs
            .into_iter()
            .filter(|w| matches!(w.kind, WarehouseType::Hub))
            .map(|w| w.warehouse_id)
            .collect();
        let mut queue = Vec::new();
        for hub_id in &hub_ids {
            queue.extend(self.get_hub_transfer_queue(hub_id).await?);
        }
        Ok(queue)
    }

    /// `get_hub_transfer_queue` tool: every ready transfer leg departing a
    /// specific hub whose preceding pickup leg has landed, not just the
    /// first one, so a hub with several parcels ready to move is never
    /// starved down to one truck assignment per tick.
    pub async fn get_hub_transfer_queue(&self, hub_id: &str) -> EngineResult<Vec<JourneyLeg>> {
        let candidates = self.journeys.list_pending_transfers_from_warehouse(hub_id).await?;
        let mut ready = Vec::new();
        for leg in candidates {
            let siblings = self.journeys.list_legs(&leg.order_id).await?;
            let pickup_completed = siblings
                .iter()
                .any(|l| l.leg_type == LegType::Pickup && matches!(l.status, LegStatus::Completed));
            if pickup_completed {
                ready.push(leg);
            }
        }
        Ok(ready)
    }

    /// `get_trucks_in_area` tool.
    pub async fn get_trucks_in_area(&self, area_id: &str) -> EngineResult<Vec<Courier>> {
        self.couriers.list_in_area(area_id, Vehicle::Truck).await
    }

    /// `assign_batch_to_truck` tool: attaches a truck courier to a batch of
    /// transfer legs.
    pub async fn assign_batch_to_truck(
        &self,
        truck_courier_id: &str,
        leg_ids: &[String],
    ) -> EngineResult<usize> {
        let mut assigned = 0;
        for leg_id in leg_ids {
            self.dispatcher
                .update_leg(
                    leg_id,
                    crate::dispatch::LegUpdate {
                        assigned_courier_id: Some(Some(truck_courier_id.to_string())),
                        ..Default::default()
                    },
                )
                .await?;
            assigned += 1;
        }
        Ok(assigned)
    }

    /// `optimize_hub_routing` tool: groups a hub's ready transfer legs by
    /// destination satellite, a planning-only clustering that does not
    /// mutate state.
    pub async fn optimize_hub_routing(&self, hub_id: &str) -> EngineResult<HashMap<String, Vec<String>>> {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for leg in self.get_hub_transfer_queue(hub_id).await? {
            if let Some(destination) = leg.destination_warehouse_id {
                groups.entry(destination).or_default().push(leg.leg_id);
            }
        }
        Ok(groups)
    }

    /// Phase 2: for each truck courier in the area, assign a batch
    /// of ready transfer legs clustered by destination satellite.
    pub async fn phase_two_middle_mile(&self, area_id: &str) -> EngineResult<PhaseTwoReport> {
        let queue = self.get_area_transfer_queue(area_id).await?;
        if queue.is_empty() {
            return Ok(PhaseTwoReport {
                area_id: area_id.to_string(),
                trucks_used: 0,
                legs_assigned: 0,
                note: Some("area transfer queue is empty".to_string()),
            });
        }

        let trucks = self.get_trucks_in_area(area_id).await?;
        if trucks.is_empty() {
            return Ok(PhaseTwoReport {
                area_id: area_id.to_string(),
                trucks_used: 0,
                legs_assigned: 0,
                note: Some("no truck couriers assigned to area".to_string()),
            });
        }

        let mut by_destination: HashMap<String, Vec<String>> = HashMap::new();
        for leg in &queue {
            if let Some(destination) = &leg.destination_warehouse_id {
                by_destination
                    .entry(destination.clone())
                    .or_default()
                    .push(leg.leg_id.clone());
            }
        }

        let mut trucks_used = 0;
        let mut legs_assigned = 0;
        for (truck, batch) in trucks.iter().zip(by_destination.values()) {
            let assigned = self.assign_batch_to_truck(&truck.courier_id, batch).await?;
            if assigned > 0 {
                trucks_used += 1;
                legs_assigned += assigned;
            }
        }

        Ok(PhaseTwoReport {
            area_id: area_id.to_string(),
            trucks_used,
            legs_assigned,
            note: None,
        })
    }

    /// `rebalance_shippers` tool: moves up to 5 idle online
    /// motorbike couriers from nearby areas into an overloaded one.
    pub async fn rebalance_couriers(&self, overloaded_area_id: &str, max_km: f64) -> EngineResult<RebalanceReport> {
        let area = self.areas.get(overloaded_area_id).await?;
        let candidates = self.areas.list_active_except(overloaded_area_id).await?;
        let from = LatLon { lat: area.center_lat, lon: area.center_lon };
        let points: Vec<LatLon> = candidates
            .iter()
            .map(|a| LatLon { lat: a.center_lat, lon: a.center_lon })
            .collect();
        let distances = area_distances(&self.gateway, from, &points).await;
        let neighbors: Vec<_> = candidates
            .into_iter()
            .zip(distances)
            .filter(|(_, km)| *km <= max_km)
            .map(|(a, _)| a)
            .collect();

        let mut moved = 0;
        'outer: for neighbor in &neighbors {
            let idle = self
                .couriers
                .list_online_in_area(&neighbor.area_id, Vehicle::Motorbike)
                .await?;
            for courier in idle {
                if moved >= REBALANCE_MAX_TRANSFERS {
                    break 'outer;
                }
                self.couriers.set_area(&courier.courier_id, overloaded_area_id).await?;
                moved += 1;
            }
        }

        Ok(RebalanceReport {
            area_id: overloaded_area_id.to_string(),
            couriers_moved: moved,
        })
    }

    /// `report_incident` tool, re-exposed through the agent so the
    /// tool-loop can invoke it as a hard-stop action.
    pub async fn report_incident(
        &self,
        courier_id: &str,
        description: &str,
        lat: f64,
        lon: f64,
    ) -> EngineResult<IncidentOutcome> {
        self.incidents.report_incident(courier_id, description, lat, lon).await
    }
}
