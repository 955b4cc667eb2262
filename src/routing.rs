//! Routing gateway: great-circle distance, geocoding, and distance-matrix
//! lookups behind a provider trait, grounded on the teacher's `RoutingClient`
//! in `api/service.rs` and the cached-lanes pattern in `bin/mcp_server.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::Vehicle;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two lat/lon pairs, in kilometers.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// A point the routing provider can compute distances between.
#[derive(Debug, Clone, Copy)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Abstraction over the external routing/geocoding provider.
/// Production traffic goes through [`HttpRoutingProvider`]; tests use
/// [`FakeRoutingProvider`].
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Road (or mode-appropriate) distance in kilometers between two points.
    /// Falls back to great-circle distance when the provider has no route.
    async fn distance_km(&self, from: LatLon, to: LatLon, vehicle: Vehicle) -> EngineResult<f64>;

    /// Batch distance lookup: `origin` to each of `destinations`, in order.
    /// A `None` entry means the provider could not route that leg and the
    /// caller should fall back to [`haversine`].
    async fn distance_matrix(
        &self,
        origin: LatLon,
        destinations: &[LatLon],
        vehicle: Vehicle,
    ) -> EngineResult<Vec<Option<f64>>>;

    /// Forward-geocode a free-text address into coordinates.
    async fn geocode(&self, address: &str) -> EngineResult<LatLon>;
}

/// reqwest-backed provider talking to an external routing/geocoding HTTP API.
pub struct HttpRoutingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct DistanceResponseRow {
    distance_km: Option<f64>,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    lat: f64,
    lon: f64,
}

impl HttpRoutingProvider {
    pub fn from_config(config: &Config) -> EngineResult<Option<Self>> {
        let Some(base_url) = config.routing_provider_base_url.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.routing_provider_timeout_secs,
            ))
            .build()
            .map_err(|e| EngineError::UpstreamError(format!("routing client init: {e}")))?;
        Ok(Some(Self {
            client,
            base_url,
            api_key: config.routing_provider_api_key.clone(),
        }))
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.client.post(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl RoutingProvider for HttpRoutingProvider {
    async fn distance_km(&self, from: LatLon, to: LatLon, vehicle: Vehicle) -> EngineResult<f64> {
        let rows = self
            .distance_matrix(from, std::slice::from_ref(&to), vehicle)
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_else(|| haversine(from.lat, from.lon, to.lat, to.lon)))
    }

    async fn distance_matrix(
        &self,
        origin: LatLon,
        destinations: &[LatLon],
        vehicle: Vehicle,
    ) -> EngineResult<Vec<Option<f64>>> {
        let body = serde_json::json!({
            "origin": {"lat": origin.lat, "lon": origin.lon},
            "destinations": destinations.iter().map(|d| serde_json::json!({"lat": d.lat, "lon": d.lon})).collect::<Vec<_>>(),
            "mode": vehicle.routing_mode(),
        });
        let resp = self
            .request("distance-matrix")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::UpstreamError(format!("routing provider: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::UpstreamError(format!(
                "routing provider returned {}",
                resp.status()
            )));
        }
        let rows: Vec<DistanceResponseRow> = resp
            .json()
            .await
            .map_err(|e| EngineError::UpstreamError(format!("routing provider body: {e}")))?;
        Ok(rows.into_iter().map(|r| r.distance_km).collect())
    }

    async fn geocode(&self, address: &str) -> EngineResult<LatLon> {
        let resp = self
            .request("geocode")
            .json(&serde_json::json!({ "address": address }))
            .send()
            .await
            .map_err(|e| EngineError::UpstreamError(format!("geocode provider: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::UpstreamError(format!(
                "geocode provider returned {}",
                resp.status()
            )));
        }
        let body: GeocodeResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::UpstreamError(format!("geocode provider body: {e}")))?;
        Ok(LatLon {
            lat: body.lat,
            lon: body.lon,
        })
    }
}

/// Deterministic stand-in for tests: always falls back to great-circle
/// distance and a fixed geocode table.
#[derive(Default)]
pub struct FakeRoutingProvider {
    pub geocodes: HashMap<String, LatLon>,
}

#[async_trait]
impl RoutingProvider for FakeRoutingProvider {
    async fn distance_km(&self, from: LatLon, to: LatLon, _vehicle: Vehicle) -> EngineResult<f64> {
        Ok(haversine(from.lat, from.lon, to.lat, to.lon))
    }

    async fn distance_matrix(
        &self,
        origin: LatLon,
        destinations: &[LatLon],
        _vehicle: Vehicle,
    ) -> EngineResult<Vec<Option<f64>>> {
        Ok(destinations
            .iter()
            .map(|d| Some(haversine(origin.lat, origin.lon, d.lat, d.lon)))
            .collect())
    }

    async fn geocode(&self, address: &str) -> EngineResult<LatLon> {
        self.geocodes
            .get(address)
            .copied()
            .ok_or_else(|| EngineError::NotFound(format!("address {address}")))
    }
}

/// Wraps a [`RoutingProvider`] with a process-lifetime geocode cache, the
/// same shape as the teacher's `cached_lanes: Arc<RwLock<Option<Vec<_>>>>>`
/// in `bin/mcp_server.rs`.
pub struct RoutingGateway {
    provider: Arc<dyn RoutingProvider>,
    geocode_cache: RwLock<HashMap<String, LatLon>>,
}

impl RoutingGateway {
    pub fn new(provider: Arc<dyn RoutingProvider>) -> Self {
        Self {
            provider,
            geocode_cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn distance_km(&self, from: LatLon, to: LatLon, vehicle: Vehicle) -> EngineResult<f64> {
        self.provider.distance_km(from, to, vehicle).await
    }

    pub async fn distance_matrix(
        &self,
        origin: LatLon,
        destinations: &[LatLon],
        vehicle: Vehicle,
    ) -> EngineResult<Vec<Option<f64>>> {
        let rows = self
            .provider
            .distance_matrix(origin, destinations, vehicle)
            .await?;
        Ok(rows
            .into_iter()
            .zip(destinations.iter())
            .map(|(d, dest)| Some(d.unwrap_or_else(|| haversine(origin.lat, origin.lon, dest.lat, dest.lon))))
            .collect())
    }

    pub async fn geocode(&self, address: &str) -> EngineResult<LatLon> {
        if let Some(hit) = self.geocode_cache.read().await.get(address) {
            return Ok(*hit);
        }
        let resolved = self.provider.geocode(address).await?;
        self.geocode_cache
            .write()
            .await
            .insert(address.to_string(), resolved);
        Ok(resolved)
    }
}

/// Attempts a distance lookup, logging and returning `None` on failure
/// instead of silently falling back to [`haversine`]: leg-distance computation
/// never substitutes an estimate for a real provider failure without saying so.
pub async fn distance_or_warn(
    gateway: &RoutingGateway,
    from: LatLon,
    to: LatLon,
    vehicle: Vehicle,
) -> Option<f64> {
    match gateway.distance_km(from, to, vehicle).await {
        Ok(km) => Some(km),
        Err(err) => {
            tracing::warn!(error = %err, "leg distance unavailable, recording null");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_distance() {
        assert!(haversine(40.7, -74.0, 40.7, -74.0) < 1e-9);
    }

    #[test]
    fn haversine_known_distance() {
        // Manhattan (Midtown) to JFK, roughly 24km.
        let d = haversine(40.7549, -73.9840, 40.6413, -73.7781);
        assert!(d > 20.0 && d < 30.0, "got {d}");
    }

    #[tokio::test]
    async fn fake_provider_falls_back_to_haversine() {
        let provider = FakeRoutingProvider::default();
        let gateway = RoutingGateway::new(Arc::new(provider));
        let d = gateway
            .distance_km(
                LatLon { lat: 0.0, lon: 0.0 },
                LatLon { lat: 0.0, lon: 1.0 },
                Vehicle::Car,
            )
            .await
            .unwrap();
        assert!(d > 100.0 && d < 112.0);
    }
}
