//! End-to-end scenarios against an embedded, temp-directory database and the
//! haversine-only fake routing provider — no network, no shared state
//! between tests.

use std::sync::Arc;

use last_mile_dispatch::config::Config;
use last_mile_dispatch::db;
use last_mile_dispatch::identity::{StaticIdentityService, User};
use last_mile_dispatch::incident::IncidentOutcome;
use last_mile_dispatch::models::{
    Area, AreaStatus, ActorRole, Courier, CourierStatus, LegStatus, LegType, OrderStatus, Sme,
    SmeStatus, Vehicle, Warehouse, WarehouseStatus, WarehouseType,
};
use last_mile_dispatch::notification::LoggingNotificationSink;
use last_mile_dispatch::repo::journey::NewOrder;
use last_mile_dispatch::scan::{ScanAction, ScanRequest};
use last_mile_dispatch::services::Services;

async fn build_services() -> (tempfile::TempDir, Services) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("dispatch.db");
    let conn = db::connect(db_path.to_str().unwrap()).await.expect("db connect");
    db::init_schema(&conn).await.expect("init schema");

    let config = Config {
        db_path: db_path.to_string_lossy().to_string(),
        http_port: 0,
        routing_provider_base_url: None,
        routing_provider_api_key: None,
        routing_provider_timeout_secs: 10,
        db_timeout_secs: 5,
        handler_timeout_secs: 30,
        agent_tick_interval_secs: 600,
        lm_endpoint: None,
        lm_model: None,
    };

    let identity = Arc::new(StaticIdentityService {
        user: User {
            user_id: "staff-demo".to_string(),
            role: ActorRole::WarehouseStaff,
            sme_id: None,
        },
    });
    let notifications = Arc::new(LoggingNotificationSink);

    let services = Services::build(conn, config, identity, notifications);
    (dir, services)
}

async fn seed_area(services: &Services, area_id: &str, lat: f64, lon: f64) {
    services
        .areas
        .create(Area {
            area_id: area_id.to_string(),
            center_lat: lat,
            center_lon: lon,
            radius_km: 15.0,
            status: AreaStatus::Active,
        })
        .await
        .expect("create area");
}

async fn seed_warehouse(services: &Services, id: &str, kind: WarehouseType, area_id: &str, lat: f64, lon: f64) {
    services
        .warehouses
        .create(Warehouse {
            warehouse_id: id.to_string(),
            kind,
            lat,
            lon,
            area_id: area_id.to_string(),
            capacity_limit: 500,
            current_load: 0,
            status: WarehouseStatus::Active,
        })
        .await
        .expect("create warehouse");
}

async fn seed_sme(services: &Services, id: &str, area_id: &str, lat: f64, lon: f64) {
    services
        .sme
        .create(Sme {
            sme_id: id.to_string(),
            lat: Some(lat),
            lon: Some(lon),
            area_id: area_id.to_string(),
            status: SmeStatus::Active,
        })
        .await
        .expect("create sme");
}

async fn seed_courier(services: &Services, id: &str, vehicle: Vehicle, area_id: &str, lat: f64, lon: f64) {
    services
        .couriers
        .create(Courier {
            courier_id: id.to_string(),
            vehicle,
            status: CourierStatus::Online,
            area_id: area_id.to_string(),
            current_lat: Some(lat),
            current_lon: Some(lon),
            rating: 4.7,
            home_warehouse_id: None,
        })
        .await
        .expect("create courier");
}

/// S1 — happy path: distinct hub and satellite yield a 3-leg journey, all
/// PENDING, distances populated, order IN_TRANSIT, courier DELIVERING.
#[tokio::test]
async fn happy_path_three_leg_journey() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "hub-1", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_warehouse(&services, "sat-1", WarehouseType::Satellite, "area-1", 10.79, 106.72).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000001".to_string(),
            receiver_address: "1 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 2.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    let legs = services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "hub-1", "sat-1", None)
        .await
        .expect("manual assign");

    assert_eq!(legs.len(), 3);
    assert_eq!(legs[0].leg_type, LegType::Pickup);
    assert_eq!(legs[1].leg_type, LegType::Transfer);
    assert_eq!(legs[2].leg_type, LegType::Delivery);
    for leg in &legs {
        assert_eq!(leg.status, LegStatus::Pending);
        let km = leg.estimated_distance_km.expect("distance populated");
        assert!(km > 0.0 && km <= 2000.0);
    }

    let reloaded_order = services.journeys.get_order(&order.order_id).await.unwrap();
    assert_eq!(reloaded_order.status, OrderStatus::InTransit);

    let courier = services.couriers.get("m1").await.unwrap();
    assert_eq!(courier.status, CourierStatus::Delivering);
}

/// S2 — hub == satellite collapses the template to 2 legs: PICKUP, DELIVERY.
#[tokio::test]
async fn two_leg_journey_when_hub_equals_satellite() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "wh-combo", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000002".to_string(),
            receiver_address: "2 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    let legs = services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "wh-combo", "wh-combo", None)
        .await
        .expect("manual assign");

    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].sequence, 1);
    assert_eq!(legs[0].leg_type, LegType::Pickup);
    assert_eq!(legs[1].sequence, 2);
    assert_eq!(legs[1].leg_type, LegType::Delivery);
}

/// S3 — scanning WAREHOUSE_IN before PICKUP ever started is rejected: there
/// is no IN_PROGRESS leg for this order to complete.
#[tokio::test]
async fn warehouse_in_before_pickup_is_rejected() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "hub-1", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_warehouse(&services, "sat-1", WarehouseType::Satellite, "area-1", 10.79, 106.72).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000003".to_string(),
            receiver_address: "3 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    let (_order, barcode) = services
        .journeys
        .get_order_by_barcode_code(&order.order_code)
        .await
        .expect("barcode lookup should use order_code as code_value");

    services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "hub-1", "sat-1", None)
        .await
        .expect("manual assign");

    let outcome = services
        .scans
        .scan(ScanRequest {
            code_value: barcode.code_value.clone(),
            action: Some(ScanAction::WarehouseIn),
            warehouse_id: Some("sat-1".to_string()),
            actor_id: "staff-1".to_string(),
            actor_role: ActorRole::WarehouseStaff,
        })
        .await;

    let err = outcome.expect_err("WAREHOUSE_IN before pickup must be rejected");
    assert!(matches!(
        err,
        last_mile_dispatch::error::EngineError::InvalidState(_)
    ));
}

/// S4 — incident rerouting: the stranded courier's non-terminal leg moves to
/// the nearest other ONLINE motorbike courier; the stranded courier goes
/// OFFLINE, the rescuer's own status is untouched.
#[tokio::test]
async fn incident_reassigns_to_nearest_online_courier() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "hub-1", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_warehouse(&services, "sat-1", WarehouseType::Satellite, "area-1", 10.79, 106.72).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;

    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;
    // ~300m away
    seed_courier(&services, "m2", Vehicle::Motorbike, "area-1", 10.7737, 106.701).await;
    // ~2km away
    seed_courier(&services, "m3", Vehicle::Motorbike, "area-1", 10.789, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000004".to_string(),
            receiver_address: "4 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "hub-1", "sat-1", None)
        .await
        .expect("manual assign");

    let outcome = services
        .incidents
        .report_incident("m1", "flat tire", 10.771, 106.701)
        .await
        .expect("report incident");

    match outcome {
        IncidentOutcome::Reassigned {
            rescuer_courier_id,
            reassigned_leg_ids,
        } => {
            assert_eq!(rescuer_courier_id, "m2");
            assert_eq!(reassigned_leg_ids.len(), 1);
        }
        other => panic!("expected Reassigned, got {other:?}"),
    }

    let m1 = services.couriers.get("m1").await.unwrap();
    assert_eq!(m1.status, CourierStatus::Offline);
    let m2 = services.couriers.get("m2").await.unwrap();
    assert_eq!(m2.status, CourierStatus::Online);

    let legs = services.journeys.list_legs(&order.order_id).await.unwrap();
    let pickup = legs.iter().find(|l| l.leg_type == LegType::Pickup).unwrap();
    assert_eq!(pickup.assigned_courier_id.as_deref(), Some("m2"));
}

/// S5 — rebalance moves idle couriers from a nearby area into an overloaded
/// one, capped at 5 per tick.
#[tokio::test]
async fn rebalance_moves_couriers_from_neighboring_area() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-a", 10.77, 106.70).await;
    // ~5km from area-a's centroid, within the 10km rebalance radius.
    seed_area(&services, "area-b", 10.81, 106.70).await;

    seed_courier(&services, "m-a1", Vehicle::Motorbike, "area-a", 10.771, 106.701).await;
    for i in 0..4 {
        seed_courier(
            &services,
            &format!("m-b{i}"),
            Vehicle::Motorbike,
            "area-b",
            10.811 + i as f64 * 0.001,
            106.701,
        )
        .await;
    }

    let report = services
        .agent
        .rebalance_couriers("area-a", 10.0)
        .await
        .expect("rebalance");

    assert_eq!(report.area_id, "area-a");
    assert_eq!(report.couriers_moved, 4);

    for i in 0..4 {
        let courier = services.couriers.get(&format!("m-b{i}")).await.unwrap();
        assert_eq!(courier.area_id, "area-a");
    }
    let untouched = services.couriers.get("m-a1").await.unwrap();
    assert_eq!(untouched.area_id, "area-a");
}

/// S6 — sending DELIVERY_COMPLETE twice is safe: the second scan reports
/// success without re-running the side effects of the first.
#[tokio::test]
async fn duplicate_delivery_complete_scan_is_idempotent() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "wh-combo", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000006".to_string(),
            receiver_address: "6 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    let (_order, barcode) = services
        .journeys
        .get_order_by_barcode_code(&order.order_code)
        .await
        .unwrap();

    services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "wh-combo", "wh-combo", Some("m1"))
        .await
        .expect("manual assign");

    let pickup_req = ScanRequest {
        code_value: barcode.code_value.clone(),
        action: Some(ScanAction::PickupConfirm),
        warehouse_id: None,
        actor_id: "m1".to_string(),
        actor_role: ActorRole::Courier,
    };
    services.scans.scan(pickup_req).await.expect("pickup confirm");

    // Completion ordering requires the PICKUP leg closed out before DELIVERY
    // can complete, so the warehouse staff scans it in first.
    let warehouse_in_req = ScanRequest {
        code_value: barcode.code_value.clone(),
        action: Some(ScanAction::WarehouseIn),
        warehouse_id: Some("wh-combo".to_string()),
        actor_id: "staff-1".to_string(),
        actor_role: ActorRole::WarehouseStaff,
    };
    services
        .scans
        .scan(warehouse_in_req)
        .await
        .expect("warehouse in");

    let delivery_start_req = ScanRequest {
        code_value: barcode.code_value.clone(),
        action: Some(ScanAction::DeliveryStart),
        warehouse_id: None,
        actor_id: "m1".to_string(),
        actor_role: ActorRole::Courier,
    };
    services
        .scans
        .scan(delivery_start_req)
        .await
        .expect("delivery start");

    let complete_req = || ScanRequest {
        code_value: barcode.code_value.clone(),
        action: Some(ScanAction::DeliveryComplete),
        warehouse_id: None,
        actor_id: "m1".to_string(),
        actor_role: ActorRole::Courier,
    };

    let first = services.scans.scan(complete_req()).await.expect("first completion");
    assert!(first.success);

    let second = services
        .scans
        .scan(complete_req())
        .await
        .expect("second completion must also succeed");
    assert!(second.success);

    let reloaded_order = services.journeys.get_order(&order.order_id).await.unwrap();
    assert_eq!(reloaded_order.status, OrderStatus::Completed);

    let legs = services.journeys.list_legs(&order.order_id).await.unwrap();
    let delivery = legs.iter().find(|l| l.leg_type == LegType::Delivery).unwrap();
    assert_eq!(delivery.status, LegStatus::Completed);
}

/// Round-trip law: deleting an order removes every one of its legs and its
/// barcode.
#[tokio::test]
async fn deleting_order_removes_legs_and_barcode() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "hub-1", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_warehouse(&services, "sat-1", WarehouseType::Satellite, "area-1", 10.79, 106.72).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000007".to_string(),
            receiver_address: "7 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    let legs = services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "hub-1", "sat-1", None)
        .await
        .expect("manual assign");
    assert_eq!(legs.len(), 3);

    services.journeys.delete_order(&order.order_id).await.expect("delete order");

    let remaining_legs = services.journeys.list_legs(&order.order_id).await.unwrap();
    assert!(remaining_legs.is_empty());

    let lookup_err = services.journeys.get_order(&order.order_id).await.unwrap_err();
    assert!(matches!(lookup_err, last_mile_dispatch::error::EngineError::NotFound(_)));
}

/// Vehicle/leg compatibility is enforced at assignment time: a motorbike
/// courier cannot be assigned the TRANSFER leg of a 3-leg journey.
#[tokio::test]
async fn assign_transfer_rejects_incompatible_vehicle() {
    let (_dir, services) = build_services().await;

    seed_area(&services, "area-1", 10.77, 106.70).await;
    seed_warehouse(&services, "hub-1", WarehouseType::Hub, "area-1", 10.78, 106.71).await;
    seed_warehouse(&services, "sat-1", WarehouseType::Satellite, "area-1", 10.79, 106.72).await;
    seed_sme(&services, "sme-1", "area-1", 10.77, 106.70).await;
    seed_courier(&services, "m1", Vehicle::Motorbike, "area-1", 10.771, 106.701).await;
    seed_courier(&services, "m2", Vehicle::Motorbike, "area-1", 10.775, 106.702).await;

    let order = services
        .journeys
        .create_order(NewOrder {
            sme_id: "sme-1".to_string(),
            receiver_name: "Jane Receiver".to_string(),
            receiver_phone: "+84900000008".to_string(),
            receiver_address: "8 Test Street".to_string(),
            receiver_lat: Some(10.80),
            receiver_lon: Some(106.73),
            weight: 1.0,
            area_id: "area-1".to_string(),
        })
        .await
        .expect("create order");

    services
        .dispatcher
        .manual_assign(&order.order_id, "m1", "hub-1", "sat-1", None)
        .await
        .expect("manual assign");

    let err = services
        .dispatcher
        .assign_transfer(&order.order_id, "m2")
        .await
        .expect_err("motorbike should not be assignable to a TRANSFER leg");
    assert!(matches!(
        err,
        last_mile_dispatch::error::EngineError::ValidationError(_)
    ));
}
