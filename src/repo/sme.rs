use crate::db::DbConn;
use crate::error::{EngineError, EngineResult};
use crate::models::Sme;

#[derive(Clone)]
pub struct SmeRepo {
    db: DbConn,
}

impl SmeRepo {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn get(&self, sme_id: &str) -> EngineResult<Sme> {
        let mut res = self
            .db
            .query("SELECT * FROM sme WHERE sme_id = $id LIMIT 1")
            .bind(("id", sme_id.to_string()))
            .await?;
        let rows: Vec<Sme> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("SME {sme_id}")))
    }

    /// Inserts a new SME row, used by demo/seed data loading only.
    pub async fn create(&self, sme: Sme) -> EngineResult<Sme> {
        let mut res = self
            .db
            .query(
                "CREATE sme SET \
                    sme_id = $sme_id, lat = $lat, lon = $lon, area_id = $area_id, status = $status",
            )
            .bind(("sme_id", sme.sme_id))
            .bind(("lat", sme.lat))
            .bind(("lon", sme.lon))
            .bind(("area_id", sme.area_id))
            .bind(("status", sme.status))
            .await?;
        let rows: Vec<Sme> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| EngineError::UpstreamError("SME create returned no row".into()))
    }
}
