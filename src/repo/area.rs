use crate::db::DbConn;
use crate::error::{EngineError, EngineResult};
use crate::models::{Area, AreaStatus};

#[derive(Clone)]
pub struct AreaRepo {
    db: DbConn,
}

impl AreaRepo {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn get(&self, area_id: &str) -> EngineResult<Area> {
        let mut res = self
            .db
            .query("SELECT * FROM areas WHERE area_id = $id LIMIT 1")
            .bind(("id", area_id.to_string()))
            .await?;
        let rows: Vec<Area> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("area {area_id}")))
    }

    pub async fn list_active(&self) -> EngineResult<Vec<Area>> {
        let mut res = self
            .db
            .query("SELECT * FROM areas WHERE status = $status")
            .bind(("status", AreaStatus::Active))
            .await?;
        Ok(res.take(0)?)
    }

    /// Inserts a new area row, used by demo/seed data loading only.
    pub async fn create(&self, area: Area) -> EngineResult<Area> {
        let mut res = self
            .db
            .query(
                "CREATE areas SET \
                    area_id = $area_id, center_lat = $center_lat, center_lon = $center_lon, \
                    radius_km = $radius_km, status = $status",
            )
            .bind(("area_id", area.area_id))
            .bind(("center_lat", area.center_lat))
            .bind(("center_lon", area.center_lon))
            .bind(("radius_km", area.radius_km))
            .bind(("status", area.status))
            .await?;
        let rows: Vec<Area> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::UpstreamError("area create returned no row".into()))
    }

    /// All active areas other than `exclude_area_id`, used by the rebalance
    /// tool as the candidate pool. Proximity filtering against `max_km` is
    /// the agent's job (it goes through `RoutingGateway::distance_matrix`,
    /// not a straight-line cut made here in the repo layer).
    pub async fn list_active_except(&self, exclude_area_id: &str) -> EngineResult<Vec<Area>> {
        let areas = self.list_active().await?;
        Ok(areas
            .into_iter()
            .filter(|a| a.area_id != exclude_area_id)
            .collect())
    }
}
