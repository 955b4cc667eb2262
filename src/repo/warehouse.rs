use crate::db::DbConn;
use crate::error::{EngineError, EngineResult};
use crate::models::{Warehouse, WarehouseStatus, WarehouseType};

#[derive(Clone)]
pub struct WarehouseRepo {
    db: DbConn,
}

impl WarehouseRepo {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn get(&self, warehouse_id: &str) -> EngineResult<Warehouse> {
        let mut res = self
            .db
            .query("SELECT * FROM warehouses WHERE warehouse_id = $id LIMIT 1")
            .bind(("id", warehouse_id.to_string()))
            .await?;
        let rows: Vec<Warehouse> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("warehouse {warehouse_id}")))
    }

    /// Active warehouses of `kind` that have coordinates — the candidate
    /// pool for entry-hub / exit-satellite selection.
    pub async fn list_active_by_type(&self, kind: WarehouseType) -> EngineResult<Vec<Warehouse>> {
        let mut res = self
            .db
            .query("SELECT * FROM warehouses WHERE type = $kind AND status = $status")
            .bind(("kind", kind))
            .bind(("status", WarehouseStatus::Active))
            .await?;
        let rows: Vec<Warehouse> = res.take(0)?;
        Ok(rows.into_iter().filter(Warehouse::has_coords).collect())
    }

    /// Inserts a new warehouse row, used by demo/seed data loading only.
    pub async fn create(&self, warehouse: Warehouse) -> EngineResult<Warehouse> {
        let mut res = self
            .db
            .query(
                "CREATE warehouses SET \
                    warehouse_id = $warehouse_id, type = $kind, lat = $lat, lon = $lon, \
                    area_id = $area_id, capacity_limit = $capacity_limit, \
                    current_load = $current_load, status = $status",
            )
            .bind(("warehouse_id", warehouse.warehouse_id))
            .bind(("kind", warehouse.kind))
            .bind(("lat", warehouse.lat))
            .bind(("lon", warehouse.lon))
            .bind(("area_id", warehouse.area_id))
            .bind(("capacity_limit", warehouse.capacity_limit))
            .bind(("current_load", warehouse.current_load))
            .bind(("status", warehouse.status))
            .await?;
        let rows: Vec<Warehouse> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::UpstreamError("warehouse create returned no row".into()))
    }

    pub async fn list_in_area(&self, area_id: &str) -> EngineResult<Vec<Warehouse>> {
        let mut res = self
            .db
            .query("SELECT * FROM warehouses WHERE area_id = $area_id")
            .bind(("area_id", area_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    /// The periodic warehouse-load sync: recomputes from scratch rather than
    /// updating incrementally, and is the sole writer of `current_load`.
    /// `counts` maps `warehouse_id -> count(completed PICKUP legs landing here)`.
    pub async fn sync_current_load(&self, counts: &[(String, i64)]) -> EngineResult<()> {
        for (warehouse_id, load) in counts {
            self.db
                .query("UPDATE warehouses SET current_load = $load WHERE warehouse_id = $id")
                .bind(("load", *load))
                .bind(("id", warehouse_id.clone()))
                .await?;
        }
        Ok(())
    }
}
