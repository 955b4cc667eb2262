//! Database connection and schema, following the teacher's embedded
//! SurrealDB-over-RocksDB setup in `db.rs`.

use anyhow::Result;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;

pub type DbConn = Surreal<Db>;

/// Initializes a database connection with the RocksDB backend.
pub async fn connect(path: &str) -> Result<DbConn> {
    let db = Surreal::new::<RocksDb>(path).await?;
    db.use_ns("dispatch").use_db("core").await?;
    Ok(db)
}

/// Defines the core tables. Entities are stored by semantic id and joined in
/// application code rather than via SurrealDB record links.
pub async fn init_schema(db: &DbConn) -> Result<()> {
    db.query(
        r#"
        DEFINE TABLE areas SCHEMALESS;
        DEFINE INDEX idx_area_id ON areas FIELDS area_id UNIQUE;

        DEFINE TABLE warehouses SCHEMALESS;
        DEFINE INDEX idx_warehouse_id ON warehouses FIELDS warehouse_id UNIQUE;
        DEFINE INDEX idx_warehouse_area ON warehouses FIELDS area_id;

        DEFINE TABLE sme SCHEMALESS;
        DEFINE INDEX idx_sme_id ON sme FIELDS sme_id UNIQUE;

        DEFINE TABLE couriers SCHEMALESS;
        DEFINE INDEX idx_courier_id ON couriers FIELDS courier_id UNIQUE;
        DEFINE INDEX idx_courier_area ON couriers FIELDS area_id;

        DEFINE TABLE barcode SCHEMALESS;
        DEFINE INDEX idx_barcode_id ON barcode FIELDS barcode_id UNIQUE;
        DEFINE INDEX idx_barcode_code_value ON barcode FIELDS code_value UNIQUE;

        DEFINE TABLE orders SCHEMALESS;
        DEFINE INDEX idx_order_id ON orders FIELDS order_id UNIQUE;
        DEFINE INDEX idx_order_code ON orders FIELDS order_code UNIQUE;
        DEFINE INDEX idx_order_barcode ON orders FIELDS barcode_id UNIQUE;
        DEFINE INDEX idx_order_status ON orders FIELDS status;
        DEFINE INDEX idx_order_area ON orders FIELDS area_id;

        DEFINE TABLE order_journey_legs SCHEMALESS;
        DEFINE INDEX idx_leg_id ON order_journey_legs FIELDS leg_id UNIQUE;
        DEFINE INDEX idx_leg_order ON order_journey_legs FIELDS order_id;
        DEFINE INDEX idx_leg_courier ON order_journey_legs FIELDS assigned_courier_id;
        "#,
    )
    .await?;

    Ok(())
}
