//! Position acquisition, reverse geocoding and great-circle distance.
//!
//! Lookups are best-effort: providers degrade through their sources and the
//! helpers here bound every lookup with a timeout so a stuck provider cannot
//! stall a dispatch or a monitor tick.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{GeocodeError, LocationError};
use super::model::Position;
use super::platform::PermissionGate;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Source of position fixes.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Most recent known fix. `Ok(None)` means the source has no fix.
    async fn last_known(&self) -> Result<Option<Position>, LocationError>;
}

/// Address lookup for a coordinate pair.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn resolve(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError>;
}

/// Serves a constant fix, or none.
pub struct FixedLocationProvider {
    position: Option<Position>,
}

impl FixedLocationProvider {
    pub fn new(position: Option<Position>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn last_known(&self) -> Result<Option<Position>, LocationError> {
        Ok(self.position)
    }
}

/// Tries each source in priority order (e.g. GPS, then network) and returns
/// the first valid fix. Failing sources are logged and skipped.
pub struct FallbackLocationProvider {
    sources: Vec<(String, Arc<dyn LocationProvider>)>,
}

impl FallbackLocationProvider {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, source: Arc<dyn LocationProvider>) -> Self {
        self.sources.push((name.into(), source));
        self
    }
}

impl Default for FallbackLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for FallbackLocationProvider {
    async fn last_known(&self) -> Result<Option<Position>, LocationError> {
        for (name, source) in &self.sources {
            match source.last_known().await {
                Ok(Some(position)) if position.is_valid() => {
                    log::debug!("Position from {} source", name);
                    return Ok(Some(position));
                }
                Ok(_) => log::debug!("No fix from {} source", name),
                Err(e) => log::warn!("Location source {} failed: {}", name, e),
            }
        }
        Ok(None)
    }
}

/// Acquire a valid fix, honoring the location permission and a timeout.
pub async fn locate(
    provider: &dyn LocationProvider,
    permissions: &dyn PermissionGate,
    timeout: Duration,
) -> Result<Position, LocationError> {
    if !permissions.is_location_allowed() {
        return Err(LocationError::PermissionDenied);
    }

    match tokio::time::timeout(timeout, provider.last_known()).await {
        Ok(Ok(Some(position))) if position.is_valid() => Ok(position),
        Ok(Ok(_)) => Err(LocationError::Unavailable),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LocationError::Timeout(timeout)),
    }
}

/// Reverse geocode with a timeout. Empty results count as not found.
pub async fn resolve_address(
    geocoder: &dyn ReverseGeocoder,
    position: &Position,
    timeout: Duration,
) -> Result<String, GeocodeError> {
    let lookup = geocoder.resolve(position.latitude, position.longitude);
    let address = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| GeocodeError::Timeout(timeout))??;

    let address = address.trim();
    if address.is_empty() {
        return Err(GeocodeError::NotFound {
            latitude: position.latitude,
            longitude: position.longitude,
        });
    }
    Ok(address.to_string())
}

/// Great-circle distance in meters (haversine).
pub fn distance_meters(from: &Position, to: &Position) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let d_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let d_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
