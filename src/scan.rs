//! Scan state machine: the central workflow advancing legs (and orders)
//! through barcode scans.

use crate::error::{EngineError, EngineResult};
use crate::lock::LockTable;
use crate::models::{ActorRole, CourierStatus, JourneyLeg, LegStatus, LegType, Order, OrderStatus, Vehicle};
use crate::notification::{NotificationKind, NotificationSink};
use crate::repo::journey::JourneyRepo;
use crate::repo::CourierRepo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanAction {
    PickupConfirm,
    WarehouseIn,
    WarehouseOut,
    DeliveryStart,
    DeliveryComplete,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub code_value: String,
    pub action: Option<ScanAction>,
    pub warehouse_id: Option<String>,
    pub actor_id: String,
    pub actor_role: ActorRole,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanOutcome {
    pub success: bool,
    pub message: String,
    pub order_id: String,
    pub order_code: String,
    pub action: ScanAction,
    pub current_warehouse: Option<String>,
}

pub struct ScanStateMachine {
    journeys: JourneyRepo,
    couriers: CourierRepo,
    notifications: std::sync::Arc<dyn NotificationSink>,
    locks: LockTable,
}

impl ScanStateMachine {
    pub fn new(
        journeys: JourneyRepo,
        couriers: CourierRepo,
        notifications: std::sync::Arc<dyn NotificationSink>,
        locks: LockTable,
    ) -> Self {
        Self {
            journeys,
            couriers,
            notifications,
            locks,
        }
    }

    async fn resolve_order(&self, code_value: &str) -> EngineResult<Order> {
        let (order, _barcode) = self
            .journeys
            .get_order_by_barcode_code(code_value)
            .await
            .map_err(|_| EngineError::NotFound(format!("barcode {code_value}")))?;
        Ok(order)
    }

    /// `POST /barcodes/scan`: explicit action requested by the caller.
    pub async fn scan(&self, req: ScanRequest) -> EngineResult<ScanOutcome> {
        let action = req
            .action
            .ok_or_else(|| EngineError::ValidationError("action is required".into()))?;
        let order = self.resolve_order(&req.code_value).await?;
        let _lock = self.locks.lock(&order.order_id).await;
        self.dispatch_action(order, action, &req).await
    }

    /// `POST /journey/scan`: infers the action from order+leg state and
    /// actor role.
    pub async fn universal_scan(&self, req: ScanRequest) -> EngineResult<ScanOutcome> {
        let order = self.resolve_order(&req.code_value).await?;
        let _lock = self.locks.lock(&order.order_id).await;

        let leg = self
            .journeys
            .earliest_open_leg(&order.order_id)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidState(format!("order {} has no open legs", order.order_id))
            })?;

        let courier_vehicle = if req.actor_role == ActorRole::Courier {
            self.couriers.get(&req.actor_id).await.ok().map(|c| c.vehicle)
        } else {
            None
        };
        let action = infer_action(&leg, &req, courier_vehicle)?;
        self.dispatch_action(order, action, &req).await
    }

}

/// Chooses the role-appropriate transition for the earliest open leg.
/// "staff scans cannot START a PICKUP or DELIVERY leg, couriers cannot
/// START a TRANSFER leg unless their vehicle is truck".
fn infer_action(
    leg: &JourneyLeg,
    req: &ScanRequest,
    courier_vehicle: Option<Vehicle>,
) -> EngineResult<ScanAction> {
    match (leg.status, leg.leg_type, req.actor_role) {
            (LegStatus::Pending, LegType::Pickup, ActorRole::Courier) => Ok(ScanAction::PickupConfirm),
            (LegStatus::Pending, LegType::Pickup, ActorRole::WarehouseStaff) => Err(
                EngineError::NotAssigned("warehouse staff cannot start a PICKUP leg".into()),
            ),
            (LegStatus::Pending, LegType::Transfer, ActorRole::WarehouseStaff) => Ok(ScanAction::WarehouseOut),
            (LegStatus::Pending, LegType::Transfer, ActorRole::Courier) => {
                if courier_vehicle == Some(Vehicle::Truck) {
                    Ok(ScanAction::WarehouseOut)
                } else {
                    Err(EngineError::NotAssigned(
                        "couriers cannot start a TRANSFER leg unless their vehicle is TRUCK".into(),
                    ))
                }
            }
            (LegStatus::Pending, LegType::Delivery, ActorRole::Courier) => Ok(ScanAction::DeliveryStart),
            (LegStatus::Pending, LegType::Delivery, ActorRole::WarehouseStaff) => Err(
                EngineError::NotAssigned("warehouse staff cannot start a DELIVERY leg".into()),
            ),
            (LegStatus::InProgress, LegType::Pickup, ActorRole::WarehouseStaff) => {
                Ok(ScanAction::WarehouseIn)
            }
            (LegStatus::InProgress, LegType::Transfer, ActorRole::WarehouseStaff) => {
                Ok(ScanAction::WarehouseIn)
            }
            (LegStatus::InProgress, LegType::Delivery, ActorRole::Courier) => {
                Ok(ScanAction::DeliveryComplete)
            }
            (status, leg_type, role) => Err(EngineError::InvalidState(format!(
                "no inferable action for leg in status {status:?}, type {leg_type:?}, actor role {role:?}"
            ))),
    }
}

impl ScanStateMachine {
    async fn dispatch_action(
        &self,
        order: Order,
        action: ScanAction,
        req: &ScanRequest,
    ) -> EngineResult<ScanOutcome> {
        match action {
            ScanAction::PickupConfirm => self.pickup_confirm(order, req).await,
            ScanAction::WarehouseIn => self.warehouse_in(order, req).await,
            ScanAction::WarehouseOut => self.warehouse_out(order, req).await,
            ScanAction::DeliveryStart => self.delivery_start(order, req).await,
            ScanAction::DeliveryComplete => self.delivery_complete(order, req).await,
        }
    }

    async fn pickup_confirm(&self, order: Order, req: &ScanRequest) -> EngineResult<ScanOutcome> {
        let leg = match self
            .journeys
            .find_leg(&order.order_id, LegType::Pickup, LegStatus::Pending)
            .await?
        {
            Some(leg) => leg,
            None => {
                let already_started = self
                    .journeys
                    .find_leg(&order.order_id, LegType::Pickup, LegStatus::InProgress)
                    .await?;
                return match already_started {
                    Some(leg) if leg.assigned_courier_id.as_deref() == Some(req.actor_id.as_str()) => {
                        Ok(self.idempotent_outcome(&order, ScanAction::PickupConfirm, None))
                    }
                    _ => Err(EngineError::InvalidState("no PENDING pickup leg".into())),
                };
            }
        };

        if leg.assigned_courier_id.as_deref() != Some(req.actor_id.as_str()) {
            return Err(EngineError::NotAssigned(format!(
                "courier {} is not assigned to this pickup leg",
                req.actor_id
            )));
        }

        self.journeys
            .transition_leg(&leg.leg_id, LegStatus::InProgress)
            .await?;
        self.journeys
            .set_order_status(&order.order_id, OrderStatus::InTransit)
            .await?;

        Ok(ScanOutcome {
            success: true,
            message: "pickup confirmed".into(),
            order_id: order.order_id,
            order_code: order.order_code,
            action: ScanAction::PickupConfirm,
            current_warehouse: None,
        })
    }

    async fn warehouse_in(&self, order: Order, req: &ScanRequest) -> EngineResult<ScanOutcome> {
        let warehouse_id = req
            .warehouse_id
            .clone()
            .ok_or_else(|| EngineError::ValidationError("warehouse_id is required".into()))?;

        let legs = self.journeys.list_legs(&order.order_id).await?;
        let in_progress = legs.iter().find(|l| matches!(l.status, LegStatus::InProgress));

        let message = match in_progress {
            Some(leg) if leg.destination_warehouse_id.as_deref() == Some(warehouse_id.as_str()) => {
                self.journeys
                    .transition_leg(&leg.leg_id, LegStatus::Completed)
                    .await?;
                "leg completed at warehouse".to_string()
            }
            Some(leg) => {
                tracing::warn!(
                    order_id = %order.order_id,
                    leg_id = %leg.leg_id,
                    expected_warehouse_id = ?leg.destination_warehouse_id,
                    scanned_warehouse_id = %warehouse_id,
                    "WAREHOUSE_IN at unexpected warehouse; accepting unplanned drop"
                );
                self.journeys
                    .transition_leg(&leg.leg_id, LegStatus::Completed)
                    .await?;
                "unplanned drop accepted".to_string()
            }
            None => {
                return Err(EngineError::InvalidState(format!(
                    "no IN_PROGRESS leg ending at warehouse {warehouse_id}"
                )));
            }
        };

        self.journeys
            .set_order_status(&order.order_id, OrderStatus::AtWarehouse)
            .await?;

        Ok(ScanOutcome {
            success: true,
            message,
            order_id: order.order_id,
            order_code: order.order_code,
            action: ScanAction::WarehouseIn,
            current_warehouse: Some(warehouse_id),
        })
    }

    async fn warehouse_out(&self, order: Order, req: &ScanRequest) -> EngineResult<ScanOutcome> {
        let warehouse_id = req
            .warehouse_id
            .clone()
            .ok_or_else(|| EngineError::ValidationError("warehouse_id is required".into()))?;

        let leg = match self
            .journeys
            .find_pending_transfer_from_warehouse_for_order(&order.order_id, &warehouse_id)
            .await?
        {
            Some(leg) => leg,
            None => {
                let legs = self.journeys.list_legs(&order.order_id).await?;
                let already_departed = legs.iter().any(|l| {
                    l.leg_type == LegType::Transfer
                        && l.origin_warehouse_id.as_deref() == Some(warehouse_id.as_str())
                        && !matches!(l.status, LegStatus::Pending)
                });
                if already_departed {
                    return Ok(self.idempotent_outcome(&order, ScanAction::WarehouseOut, Some(warehouse_id)));
                }
                return Err(EngineError::InvalidState(format!(
                    "no PENDING transfer leg departing warehouse {warehouse_id} for this order"
                )));
            }
        };

        self.journeys
            .transition_leg(&leg.leg_id, LegStatus::InProgress)
            .await?;
        self.journeys
            .set_order_status(&order.order_id, OrderStatus::InTransit)
            .await?;

        Ok(ScanOutcome {
            success: true,
            message: "transfer leg departed warehouse".into(),
            order_id: order.order_id,
            order_code: order.order_code,
            action: ScanAction::WarehouseOut,
            current_warehouse: Some(warehouse_id),
        })
    }

    async fn delivery_start(&self, order: Order, req: &ScanRequest) -> EngineResult<ScanOutcome> {
        let leg = self
            .journeys
            .find_leg(&order.order_id, LegType::Delivery, LegStatus::Pending)
            .await?
            .ok_or_else(|| EngineError::InvalidState("no PENDING delivery leg".into()))?;

        if let Some(existing) = &leg.assigned_courier_id {
            if existing != &req.actor_id {
                return Err(EngineError::NotAssigned(format!(
                    "delivery leg already assigned to courier {existing}"
                )));
            }
        } else {
            self.couriers
                .set_status(&req.actor_id, CourierStatus::Delivering)
                .await?;
        }

        self.journeys
            .patch_leg(
                &leg.leg_id,
                crate::repo::journey::LegPatch {
                    assigned_courier_id: Some(Some(req.actor_id.clone())),
                    ..Default::default()
                },
            )
            .await?;
        self.journeys
            .transition_leg(&leg.leg_id, LegStatus::InProgress)
            .await?;
        self.journeys
            .set_order_status(&order.order_id, OrderStatus::Delivering)
            .await?;

        Ok(ScanOutcome {
            success: true,
            message: "delivery started".into(),
            order_id: order.order_id,
            order_code: order.order_code,
            action: ScanAction::DeliveryStart,
            current_warehouse: None,
        })
    }

    async fn delivery_complete(&self, order: Order, req: &ScanRequest) -> EngineResult<ScanOutcome> {
        let leg = match self
            .journeys
            .find_leg(&order.order_id, LegType::Delivery, LegStatus::InProgress)
            .await?
        {
            Some(leg) => leg,
            None => {
                let already_done = self
                    .journeys
                    .find_leg(&order.order_id, LegType::Delivery, LegStatus::Completed)
                    .await?;
                return match already_done {
                    Some(leg) if leg.assigned_courier_id.as_deref() == Some(req.actor_id.as_str()) => {
                        Ok(self.idempotent_outcome(&order, ScanAction::DeliveryComplete, None))
                    }
                    _ => Err(EngineError::InvalidState("no IN_PROGRESS delivery leg".into())),
                };
            }
        };

        if leg.assigned_courier_id.as_deref() != Some(req.actor_id.as_str()) {
            return Err(EngineError::NotAssigned(format!(
                "courier {} is not assigned to this delivery leg",
                req.actor_id
            )));
        }

        self.journeys
            .transition_leg(&leg.leg_id, LegStatus::Completed)
            .await?;
        self.journeys
            .set_order_status(&order.order_id, OrderStatus::Completed)
            .await?;

        let remaining = self
            .journeys
            .list_non_terminal_legs_for_courier(&req.actor_id)
            .await?;
        if remaining.is_empty() {
            self.couriers
                .set_status(&req.actor_id, CourierStatus::Online)
                .await?;
        }

        self.notifications
            .push(
                &order.sme_id,
                "Order delivered",
                &format!("Order {} has been delivered", order.order_code),
                NotificationKind::OrderDelivered,
            )
            .await;

        Ok(ScanOutcome {
            success: true,
            message: "delivery completed".into(),
            order_id: order.order_id,
            order_code: order.order_code,
            action: ScanAction::DeliveryComplete,
            current_warehouse: None,
        })
    }

    /// Duplicate-scan tolerance: a repeated `(barcode, action, actor)`
    /// whose target transition already happened returns success without a
    /// second mutation.
    fn idempotent_outcome(&self, order: &Order, action: ScanAction, warehouse: Option<String>) -> ScanOutcome {
        ScanOutcome {
            success: true,
            message: "scan already applied".into(),
            order_id: order.order_id.clone(),
            order_code: order.order_code.clone(),
            action,
            current_warehouse: warehouse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pickup_leg(status: LegStatus) -> JourneyLeg {
        JourneyLeg {
            leg_id: "leg-1".into(),
            order_id: "order-1".into(),
            sequence: 1,
            leg_type: LegType::Pickup,
            status,
            origin_sme_id: Some("sme-1".into()),
            origin_warehouse_id: None,
            destination_warehouse_id: Some("hub-1".into()),
            destination_is_receiver: false,
            assigned_courier_id: Some("courier-1".into()),
            estimated_distance_km: None,
            started_at: None,
            completed_at: None,
        }
    }

    fn req(actor_role: ActorRole) -> ScanRequest {
        ScanRequest {
            code_value: "ORD1".into(),
            action: None,
            warehouse_id: None,
            actor_id: "staff-1".into(),
            actor_role,
        }
    }

    #[test]
    fn infer_action_rejects_staff_starting_pickup() {
        let leg = pickup_leg(LegStatus::Pending);
        let err = infer_action(&leg, &req(ActorRole::WarehouseStaff), None).unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    #[test]
    fn infer_action_allows_courier_starting_pickup() {
        let leg = pickup_leg(LegStatus::Pending);
        let action = infer_action(&leg, &req(ActorRole::Courier), Some(Vehicle::Motorbike)).unwrap();
        assert_eq!(action, ScanAction::PickupConfirm);
    }

    #[test]
    fn infer_action_finishes_in_progress_pickup_as_staff() {
        let leg = pickup_leg(LegStatus::InProgress);
        let action = infer_action(&leg, &req(ActorRole::WarehouseStaff), None).unwrap();
        assert_eq!(action, ScanAction::WarehouseIn);
    }

    fn transfer_leg(status: LegStatus) -> JourneyLeg {
        JourneyLeg {
            leg_id: "leg-2".into(),
            order_id: "order-1".into(),
            sequence: 2,
            leg_type: LegType::Transfer,
            status,
            origin_sme_id: None,
            origin_warehouse_id: Some("hub-1".into()),
            destination_warehouse_id: Some("satellite-1".into()),
            destination_is_receiver: false,
            assigned_courier_id: None,
            estimated_distance_km: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn infer_action_rejects_motorbike_courier_starting_transfer() {
        let leg = transfer_leg(LegStatus::Pending);
        let err = infer_action(&leg, &req(ActorRole::Courier), Some(Vehicle::Motorbike)).unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    #[test]
    fn infer_action_allows_truck_courier_starting_transfer() {
        let leg = transfer_leg(LegStatus::Pending);
        let action = infer_action(&leg, &req(ActorRole::Courier), Some(Vehicle::Truck)).unwrap();
        assert_eq!(action, ScanAction::WarehouseOut);
    }

    #[test]
    fn infer_action_allows_staff_starting_transfer() {
        let leg = transfer_leg(LegStatus::Pending);
        let action = infer_action(&leg, &req(ActorRole::WarehouseStaff), None).unwrap();
        assert_eq!(action, ScanAction::WarehouseOut);
    }

    #[test]
    fn infer_action_rejects_mismatched_leg_state() {
        let leg = transfer_leg(LegStatus::Completed);
        let err = infer_action(&leg, &req(ActorRole::WarehouseStaff), None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
}
