//! Incident handler: emergency reassignment of a courier's in-flight
//! legs to the nearest available rescuer.

use crate::error::EngineResult;
use crate::lock::LockTable;
use crate::models::{Courier, CourierStatus, Vehicle};
use crate::repo::journey::{JourneyRepo, LegPatch};
use crate::repo::CourierRepo;
use crate::routing::haversine;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentOutcome {
    NoRescueNeeded,
    Reassigned {
        rescuer_courier_id: String,
        reassigned_leg_ids: Vec<String>,
    },
    CriticalNoRescuerAvailable {
        stranded_leg_ids: Vec<String>,
    },
}

pub struct IncidentHandler {
    journeys: JourneyRepo,
    couriers: CourierRepo,
    locks: LockTable,
}

impl IncidentHandler {
    pub fn new(journeys: JourneyRepo, couriers: CourierRepo, locks: LockTable) -> Self {
        Self {
            journeys,
            couriers,
            locks,
        }
    }

    /// Reports a courier incident at `(current_lat, current_lon)` and
    /// attempts to reassign their in-flight legs to a nearby rescuer.
    pub async fn report_incident(
        &self,
        courier_id: &str,
        description: &str,
        current_lat: f64,
        current_lon: f64,
    ) -> EngineResult<IncidentOutcome> {
        let courier = self.couriers.get(courier_id).await?;
        let affected = self.journeys.list_non_terminal_legs_for_courier(courier_id).await?;

        if affected.is_empty() {
            self.couriers
                .set_status(courier_id, CourierStatus::Offline)
                .await?;
            return Ok(IncidentOutcome::NoRescueNeeded);
        }

        let candidates = self
            .couriers
            .list_online_in_area(&courier.area_id, Vehicle::Motorbike)
            .await?;
        let rescuer = nearest_other_online_courier(&candidates, courier_id, current_lat, current_lon);

        let Some(rescuer) = rescuer else {
            return Ok(IncidentOutcome::CriticalNoRescuerAvailable {
                stranded_leg_ids: affected.iter().map(|l| l.leg_id.clone()).collect(),
            });
        };

        let mut reassigned = Vec::with_capacity(affected.len());
        for leg in &affected {
            let _lock = self.locks.lock(&leg.order_id).await;
            self.journeys
                .patch_leg(
                    &leg.leg_id,
                    LegPatch {
                        assigned_courier_id: Some(Some(rescuer.courier_id.clone())),
                        ..Default::default()
                    },
                )
                .await?;
            reassigned.push(leg.leg_id.clone());
            tracing::warn!(
                leg_id = %leg.leg_id,
                from_courier = %courier_id,
                to_courier = %rescuer.courier_id,
                note = %format!("EMERGENCY TRANSFER: from {courier_id} ({description})"),
                "leg reassigned due to incident"
            );
        }

        self.couriers
            .set_status(courier_id, CourierStatus::Offline)
            .await?;

        Ok(IncidentOutcome::Reassigned {
            rescuer_courier_id: rescuer.courier_id,
            reassigned_leg_ids: reassigned,
        })
    }
}

/// Nearest other `ONLINE` motorbike courier by haversine distance from
/// `(lat, lon)`, excluding `exclude_courier_id`. Shared logic between the
/// incident handler and Phase 1 first-mile matching.
pub fn nearest_other_online_courier(
    candidates: &[Courier],
    exclude_courier_id: &str,
    lat: f64,
    lon: f64,
) -> Option<Courier> {
    candidates
        .iter()
        .filter(|c| c.courier_id != exclude_courier_id)
        .filter(|c| matches!(c.status, CourierStatus::Online))
        .filter_map(|c| {
            let (clat, clon) = (c.current_lat?, c.current_lon?);
            Some((c.clone(), haversine(lat, lon, clat, clon)))
        })
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourierStatus, Vehicle};

    fn courier(id: &str, status: CourierStatus, lat: f64, lon: f64) -> Courier {
        Courier {
            courier_id: id.to_string(),
            vehicle: Vehicle::Motorbike,
            status,
            area_id: "area-1".to_string(),
            current_lat: Some(lat),
            current_lon: Some(lon),
            rating: 4.5,
            home_warehouse_id: None,
        }
    }

    #[test]
    fn picks_nearest_online_excluding_self() {
        let candidates = vec![
            courier("c1", CourierStatus::Online, 0.0, 0.0),
            courier("c2", CourierStatus::Online, 0.0, 0.5),
            courier("c3", CourierStatus::Offline, 0.0, 0.01),
        ];
        let rescuer = nearest_other_online_courier(&candidates, "c3", 0.0, 0.0).unwrap();
        assert_eq!(rescuer.courier_id, "c1");
    }

    #[test]
    fn returns_none_when_no_online_candidates() {
        let candidates = vec![courier("c1", CourierStatus::Offline, 0.0, 0.0)];
        assert!(nearest_other_online_courier(&candidates, "c2", 0.0, 0.0).is_none());
    }
}
