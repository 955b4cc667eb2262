//! Populates a fresh database with a small demo network: one area, its
//! hub/satellite/local-depot warehouses, a handful of couriers, one SME,
//! and a few pending orders — enough for `/ai/optimize` to do real work
//! against on a first run.

use anyhow::Result;
use clap::Parser;
use last_mile_dispatch::config::Config;
use last_mile_dispatch::db;
use last_mile_dispatch::models::{
    Area, AreaStatus, Courier, CourierStatus, Sme, SmeStatus, Vehicle, Warehouse, WarehouseStatus,
    WarehouseType,
};
use last_mile_dispatch::repo::journey::NewOrder;
use last_mile_dispatch::repo::{AreaRepo, CourierRepo, JourneyRepo, SmeRepo, WarehouseRepo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Demo/seed data loader, in the shape of the teacher's `generate_synthetic`
/// CLI: a handful of `#[arg(long)]` flags with defaults, no subcommands.
#[derive(Parser, Debug)]
#[command(name = "seed_demo")]
#[command(about = "Populate a fresh database with a small demo dispatch network")]
struct Args {
    /// Number of motorbike couriers to seed, in addition to one truck.
    #[arg(long, default_value = "4")]
    couriers: u32,

    /// Number of pending orders to seed.
    #[arg(long, default_value = "5")]
    orders: u32,

    /// Random seed for receiver-coordinate jitter (reproducible runs).
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let config = Config::from_env();
    let db = db::connect(&config.db_path).await?;
    db::init_schema(&db).await?;

    let areas = AreaRepo::new(db.clone());
    let warehouses = WarehouseRepo::new(db.clone());
    let sme_repo = SmeRepo::new(db.clone());
    let couriers = CourierRepo::new(db.clone());
    let journeys = JourneyRepo::new(db.clone());

    let area_id = "area-downtown".to_string();
    areas
        .create(Area {
            area_id: area_id.clone(),
            center_lat: 10.7769,
            center_lon: 106.7009,
            radius_km: 12.0,
            status: AreaStatus::Active,
        })
        .await?;
    tracing::info!(area_id, "seeded area");

    let hub_id = "wh-hub-1".to_string();
    warehouses
        .create(Warehouse {
            warehouse_id: hub_id.clone(),
            kind: WarehouseType::Hub,
            lat: 10.7800,
            lon: 106.7050,
            area_id: area_id.clone(),
            capacity_limit: 500,
            current_load: 0,
            status: WarehouseStatus::Active,
        })
        .await?;

    let satellite_id = "wh-satellite-1".to_string();
    warehouses
        .create(Warehouse {
            warehouse_id: satellite_id.clone(),
            kind: WarehouseType::Satellite,
            lat: 10.7700,
            lon: 106.6950,
            area_id: area_id.clone(),
            capacity_limit: 200,
            current_load: 0,
            status: WarehouseStatus::Active,
        })
        .await?;

    let depot_id = "wh-depot-1".to_string();
    warehouses
        .create(Warehouse {
            warehouse_id: depot_id.clone(),
            kind: WarehouseType::LocalDepot,
            lat: 10.7750,
            lon: 106.6990,
            area_id: area_id.clone(),
            capacity_limit: 100,
            current_load: 0,
            status: WarehouseStatus::Active,
        })
        .await?;
    tracing::info!(hub_id, satellite_id, depot_id, "seeded warehouses");

    let sme_id = "sme-demo-shop".to_string();
    sme_repo
        .create(Sme {
            sme_id: sme_id.clone(),
            lat: Some(10.7760),
            lon: Some(106.6980),
            area_id: area_id.clone(),
            status: SmeStatus::Active,
        })
        .await?;

    for i in 0..args.couriers {
        let courier_id = format!("courier-{i}");
        let jitter_lat: f64 = rng.gen_range(-0.003..0.003);
        let jitter_lon: f64 = rng.gen_range(-0.003..0.003);
        couriers
            .create(Courier {
                courier_id: courier_id.clone(),
                vehicle: Vehicle::Motorbike,
                status: CourierStatus::Online,
                area_id: area_id.clone(),
                current_lat: Some(10.7780 + jitter_lat),
                current_lon: Some(106.7000 + jitter_lon),
                rating: rng.gen_range(3.5..5.0),
                home_warehouse_id: Some(hub_id.clone()),
            })
            .await?;
    }
    couriers
        .create(Courier {
            courier_id: "courier-truck-1".to_string(),
            vehicle: Vehicle::Truck,
            status: CourierStatus::Online,
            area_id: area_id.clone(),
            current_lat: Some(10.7800),
            current_lon: Some(106.7050),
            rating: 4.8,
            home_warehouse_id: Some(hub_id.clone()),
        })
        .await?;
    tracing::info!(couriers = args.couriers, "seeded motorbike couriers plus 1 truck");

    for i in 0..args.orders {
        let jitter_lat: f64 = rng.gen_range(0.0..0.015);
        let jitter_lon: f64 = rng.gen_range(0.0..0.015);
        let order = journeys
            .create_order(NewOrder {
                sme_id: sme_id.clone(),
                receiver_name: format!("Receiver {i}"),
                receiver_phone: format!("+8490000{i:04}"),
                receiver_address: format!("{i} Demo Street, District {i}"),
                receiver_lat: Some(10.7850 + jitter_lat),
                receiver_lon: Some(106.7100 + jitter_lon),
                weight: 1.5 + i as f64,
                area_id: area_id.clone(),
            })
            .await?;
        tracing::info!(order_id = order.order_id, order_code = order.order_code, "seeded order");
    }

    tracing::info!(run_id = %Uuid::new_v4(), "demo seed complete");
    Ok(())
}
