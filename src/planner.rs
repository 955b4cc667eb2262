//! Leg planner: turns an order's pickup/delivery coordinates into a
//! 2-or-3-leg journey template. Pure with respect to persistence —
//! callers (the dispatcher, the optimization agent) persist the result via
//! [`crate::repo::JourneyRepo::create_legs`] alongside their own order/
//! courier state changes, keeping one logical operation in one transaction.

use crate::error::{EngineError, EngineResult};
use crate::models::{LegType, Vehicle, Warehouse};
use crate::repo::journey::NewLeg;
use crate::routing::{LatLon, RoutingGateway};

/// The chosen entry hub / exit satellite pair, and whether they coincide
///.
pub struct PlannedEndpoints {
    pub entry_hub: Warehouse,
    pub exit_satellite: Warehouse,
}

/// Picks the warehouse in `candidates` minimizing road distance from
/// `from`, tie-breaking by lowest `warehouse_id` lexicographically. Skips
/// (and logs) candidates the distance matrix could not resolve, picking the
/// best observed candidate among those with an OK element.
async fn nearest_warehouse(
    gateway: &RoutingGateway,
    from: LatLon,
    candidates: &[Warehouse],
    vehicle: Vehicle,
) -> EngineResult<Warehouse> {
    if candidates.is_empty() {
        return Err(EngineError::CapacityExhausted(
            "no active warehouses with coordinates available".into(),
        ));
    }
    let points: Vec<LatLon> = candidates
        .iter()
        .map(|w| LatLon { lat: w.lat, lon: w.lon })
        .collect();
    let distances = gateway.distance_matrix(from, &points, vehicle).await?;

    let mut best: Option<(&Warehouse, f64)> = None;
    for (candidate, distance) in candidates.iter().zip(distances.into_iter()) {
        let Some(distance) = distance else {
            tracing::warn!(warehouse_id = %candidate.warehouse_id, "skipping candidate with no distance observation");
            continue;
        };
        best = Some(match best {
            None => (candidate, distance),
            Some((best_candidate, best_distance)) => {
                if distance < best_distance
                    || (distance == best_distance && candidate.warehouse_id < best_candidate.warehouse_id)
                {
                    (candidate, distance)
                } else {
                    (best_candidate, best_distance)
                }
            }
        });
    }
    best.map(|(w, _)| w.clone()).ok_or_else(|| {
        EngineError::CapacityExhausted("distance matrix returned no usable observations".into())
    })
}

/// Selects the entry hub (nearest to the SME) and exit satellite (nearest
/// to the receiver) from the given candidate pools.
pub async fn select_endpoints(
    gateway: &RoutingGateway,
    sme_point: LatLon,
    receiver_point: LatLon,
    hubs: &[Warehouse],
    satellites: &[Warehouse],
) -> EngineResult<PlannedEndpoints> {
    let entry_hub = nearest_warehouse(gateway, sme_point, hubs, Vehicle::Truck).await?;
    let exit_satellite = nearest_warehouse(gateway, receiver_point, satellites, Vehicle::Truck).await?;
    Ok(PlannedEndpoints {
        entry_hub,
        exit_satellite,
    })
}

/// Builds the 2-or-3-leg template for an order given its already-selected
/// endpoints, populating `estimated_distance_km` per leg.
/// Returns the legs plus their distance sum for `order.total_distance_km`.
pub async fn plan_legs(
    gateway: &RoutingGateway,
    sme_id: &str,
    sme_point: LatLon,
    receiver_point: LatLon,
    endpoints: &PlannedEndpoints,
) -> EngineResult<(Vec<NewLeg>, Option<f64>)> {
    let hub_point = LatLon {
        lat: endpoints.entry_hub.lat,
        lon: endpoints.entry_hub.lon,
    };
    let satellite_point = LatLon {
        lat: endpoints.exit_satellite.lat,
        lon: endpoints.exit_satellite.lon,
    };

    let pickup_distance = distance_or_none(gateway, sme_point, hub_point, Vehicle::Motorbike).await;

    if endpoints.entry_hub.warehouse_id == endpoints.exit_satellite.warehouse_id {
        let delivery_distance =
            distance_or_none(gateway, hub_point, receiver_point, Vehicle::Motorbike).await;
        let total = sum_distances(&[pickup_distance, delivery_distance]);
        let legs = vec![
            NewLeg {
                sequence: 1,
                leg_type: LegType::Pickup,
                origin_sme_id: Some(sme_id.to_string()),
                origin_warehouse_id: None,
                destination_warehouse_id: Some(endpoints.entry_hub.warehouse_id.clone()),
                destination_is_receiver: false,
                assigned_courier_id: None,
                estimated_distance_km: pickup_distance,
            },
            NewLeg {
                sequence: 2,
                leg_type: LegType::Delivery,
                origin_sme_id: None,
                origin_warehouse_id: Some(endpoints.entry_hub.warehouse_id.clone()),
                destination_warehouse_id: None,
                destination_is_receiver: true,
                assigned_courier_id: None,
                estimated_distance_km: delivery_distance,
            },
        ];
        Ok((legs, total))
    } else {
        let transfer_distance = distance_or_none(gateway, hub_point, satellite_point, Vehicle::Truck).await;
        let delivery_distance =
            distance_or_none(gateway, satellite_point, receiver_point, Vehicle::Motorbike).await;
        let total = sum_distances(&[pickup_distance, transfer_distance, delivery_distance]);
        let legs = vec![
            NewLeg {
                sequence: 1,
                leg_type: LegType::Pickup,
                origin_sme_id: Some(sme_id.to_string()),
                origin_warehouse_id: None,
                destination_warehouse_id: Some(endpoints.entry_hub.warehouse_id.clone()),
                destination_is_receiver: false,
                assigned_courier_id: None,
                estimated_distance_km: pickup_distance,
            },
            NewLeg {
                sequence: 2,
                leg_type: LegType::Transfer,
                origin_sme_id: None,
                origin_warehouse_id: Some(endpoints.entry_hub.warehouse_id.clone()),
                destination_warehouse_id: Some(endpoints.exit_satellite.warehouse_id.clone()),
                destination_is_receiver: false,
                assigned_courier_id: None,
                estimated_distance_km: transfer_distance,
            },
            NewLeg {
                sequence: 3,
                leg_type: LegType::Delivery,
                origin_sme_id: None,
                origin_warehouse_id: Some(endpoints.exit_satellite.warehouse_id.clone()),
                destination_warehouse_id: None,
                destination_is_receiver: true,
                assigned_courier_id: None,
                estimated_distance_km: delivery_distance,
            },
        ];
        Ok((legs, total))
    }
}

use crate::routing::distance_or_warn as distance_or_none;

fn sum_distances(parts: &[Option<f64>]) -> Option<f64> {
    let mut total = 0.0;
    let mut any = false;
    for part in parts {
        if let Some(km) = part {
            total += km;
            any = true;
        }
    }
    any.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WarehouseStatus;
    use crate::routing::FakeRoutingProvider;
    use std::sync::Arc;

    fn warehouse(id: &str, lat: f64, lon: f64) -> Warehouse {
        Warehouse {
            warehouse_id: id.to_string(),
            kind: crate::models::WarehouseType::Hub,
            lat,
            lon,
            area_id: "area-1".to_string(),
            capacity_limit: 100,
            current_load: 0,
            status: WarehouseStatus::Active,
        }
    }

    #[tokio::test]
    async fn two_legs_when_hub_equals_satellite() {
        let gateway = RoutingGateway::new(Arc::new(FakeRoutingProvider::default()));
        let hub = warehouse("hub-1", 40.75, -73.98);
        let endpoints = PlannedEndpoints {
            entry_hub: hub.clone(),
            exit_satellite: hub,
        };
        let (legs, total) = plan_legs(
            &gateway,
            "sme-1",
            LatLon { lat: 40.70, lon: -73.99 },
            LatLon { lat: 40.80, lon: -73.95 },
            &endpoints,
        )
        .await
        .unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].leg_type, LegType::Pickup);
        assert_eq!(legs[1].leg_type, LegType::Delivery);
        assert!(total.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn three_legs_when_hub_differs_from_satellite() {
        let gateway = RoutingGateway::new(Arc::new(FakeRoutingProvider::default()));
        let endpoints = PlannedEndpoints {
            entry_hub: warehouse("hub-1", 40.75, -73.98),
            exit_satellite: warehouse("sat-1", 40.80, -73.95),
        };
        let (legs, _total) = plan_legs(
            &gateway,
            "sme-1",
            LatLon { lat: 40.70, lon: -73.99 },
            LatLon { lat: 40.85, lon: -73.90 },
            &endpoints,
        )
        .await
        .unwrap();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[1].leg_type, LegType::Transfer);
        assert_eq!(
            legs[0].destination_warehouse_id.as_deref(),
            legs[1].origin_warehouse_id.as_deref()
        );
    }

    #[tokio::test]
    async fn nearest_warehouse_ties_break_on_id() {
        let gateway = RoutingGateway::new(Arc::new(FakeRoutingProvider::default()));
        let a = warehouse("hub-b", 0.0, 1.0);
        let b = warehouse("hub-a", 0.0, -1.0);
        let chosen = nearest_warehouse(
            &gateway,
            LatLon { lat: 0.0, lon: 0.0 },
            &[a, b],
            Vehicle::Truck,
        )
        .await
        .unwrap();
        assert_eq!(chosen.warehouse_id, "hub-a");
    }

    #[tokio::test]
    async fn no_capacity_when_no_candidates() {
        let gateway = RoutingGateway::new(Arc::new(FakeRoutingProvider::default()));
        let err = nearest_warehouse(&gateway, LatLon { lat: 0.0, lon: 0.0 }, &[], Vehicle::Truck)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityExhausted(_)));
    }
}
