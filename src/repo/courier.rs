use crate::db::DbConn;
use crate::error::{EngineError, EngineResult};
use crate::models::{Courier, CourierStatus, Vehicle};

#[derive(Clone)]
pub struct CourierRepo {
    db: DbConn,
}

impl CourierRepo {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn get(&self, courier_id: &str) -> EngineResult<Courier> {
        let mut res = self
            .db
            .query("SELECT * FROM couriers WHERE courier_id = $id LIMIT 1")
            .bind(("id", courier_id.to_string()))
            .await?;
        let rows: Vec<Courier> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("courier {courier_id}")))
    }

    /// Inserts a new courier row, used by demo/seed data loading only.
    pub async fn create(&self, courier: Courier) -> EngineResult<Courier> {
        let mut res = self
            .db
            .query(
                "CREATE couriers SET \
                    courier_id = $courier_id, vehicle = $vehicle, status = $status, \
                    area_id = $area_id, current_lat = $current_lat, current_lon = $current_lon, \
                    rating = $rating, home_warehouse_id = $home_warehouse_id",
            )
            .bind(("courier_id", courier.courier_id))
            .bind(("vehicle", courier.vehicle))
            .bind(("status", courier.status))
            .bind(("area_id", courier.area_id))
            .bind(("current_lat", courier.current_lat))
            .bind(("current_lon", courier.current_lon))
            .bind(("rating", courier.rating))
            .bind(("home_warehouse_id", courier.home_warehouse_id))
            .await?;
        let rows: Vec<Courier> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::UpstreamError("courier create returned no row".into()))
    }

    pub async fn list_online_in_area(
        &self,
        area_id: &str,
        vehicle: Vehicle,
    ) -> EngineResult<Vec<Courier>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM couriers WHERE area_id = $area_id AND vehicle = $vehicle AND status = $status",
            )
            .bind(("area_id", area_id.to_string()))
            .bind(("vehicle", vehicle))
            .bind(("status", CourierStatus::Online))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn list_in_area(&self, area_id: &str, vehicle: Vehicle) -> EngineResult<Vec<Courier>> {
        let mut res = self
            .db
            .query("SELECT * FROM couriers WHERE area_id = $area_id AND vehicle = $vehicle")
            .bind(("area_id", area_id.to_string()))
            .bind(("vehicle", vehicle))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn set_status(&self, courier_id: &str, status: CourierStatus) -> EngineResult<()> {
        self.db
            .query("UPDATE couriers SET status = $status WHERE courier_id = $id")
            .bind(("status", status))
            .bind(("id", courier_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn set_area(&self, courier_id: &str, area_id: &str) -> EngineResult<()> {
        self.db
            .query("UPDATE couriers SET area_id = $area_id WHERE courier_id = $id")
            .bind(("area_id", area_id.to_string()))
            .bind(("id", courier_id.to_string()))
            .await?;
        Ok(())
    }

    /// Records a courier's last-known GPS fix, consumed opportunistically by
    /// scan endpoints and Phase 1 nearest-courier matching.
    pub async fn set_location(&self, courier_id: &str, lat: f64, lon: f64) -> EngineResult<()> {
        self.db
            .query("UPDATE couriers SET current_lat = $lat, current_lon = $lon WHERE courier_id = $id")
            .bind(("lat", lat))
            .bind(("lon", lon))
            .bind(("id", courier_id.to_string()))
            .await?;
        Ok(())
    }
}
