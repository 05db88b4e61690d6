//! Device location sensor boundary.
//!
//! A sensor answers one position request at a time with either a [`Fix`] or a
//! [`SensorError`]. The acquirer owns timeouts and fallback; sensors only report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::types::{Coordinate, LocationError};
use super::BoxFuture;

/// A single device position reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Accuracy radius in meters.
    pub accuracy_m: f64,
    pub taken_at: DateTime<Utc>,
}

impl Fix {
    pub fn new(coordinate: Coordinate, accuracy_m: f64) -> Self {
        Self {
            coordinate,
            accuracy_m,
            taken_at: Utc::now(),
        }
    }
}

/// Error codes a sensor may report, numbered like the platform codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum SensorError {
    #[error("permission denied")]
    PermissionDenied = 1,
    #[error("position unavailable")]
    PositionUnavailable = 2,
    #[error("timeout")]
    Timeout = 3,
}

impl SensorError {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Timeouts and unavailability may succeed with a coarser request.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::PermissionDenied)
    }
}

impl From<SensorError> for LocationError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::PermissionDenied => LocationError::PermissionDenied,
            SensorError::PositionUnavailable => LocationError::SensorUnavailable,
            SensorError::Timeout => LocationError::SensorTimeout,
        }
    }
}

/// Options passed to the sensor with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: u64,
    pub maximum_age: u64,
}

/// A source of device position readings.
pub trait PositionSensor: Send + Sync + 'static {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> BoxFuture<'_, Result<Fix, SensorError>>;
}

// ─── IP-based sensor ────────────────────────────────────────────

/// Rough accuracy of an IP geolocation, in meters.
const IP_ACCURACY_M: f64 = 5_000.0;

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Sensor for hosts without GNSS hardware.
///
/// High-accuracy requests report `PositionUnavailable`; low-accuracy
/// requests are answered by IP geolocation.
pub struct NetworkSensor {
    endpoint: String,
    user_agent: String,
}

impl NetworkSensor {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
        }
    }
}

impl PositionSensor for NetworkSensor {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> BoxFuture<'_, Result<Fix, SensorError>> {
        let endpoint = self.endpoint.clone();
        let user_agent = self.user_agent.clone();
        Box::pin(async move {
            if options.enable_high_accuracy {
                return Err(SensorError::PositionUnavailable);
            }
            let timeout = Duration::from_millis(options.timeout);
            tokio::task::spawn_blocking(move || ip_geolocate(&endpoint, &user_agent, timeout))
                .await
                .map_err(|_| SensorError::PositionUnavailable)?
        })
    }
}

fn ip_geolocate(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Fix, SensorError> {
    let response = ureq::get(endpoint)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| {
            tracing::warn!(error = %e, "IP geolocation request failed");
            match e {
                ureq::Error::Transport(t) if t.kind() == ureq::ErrorKind::Io => {
                    SensorError::Timeout
                }
                _ => SensorError::PositionUnavailable,
            }
        })?;

    let r: IpApiResult = response
        .into_json()
        .map_err(|_| SensorError::PositionUnavailable)?;

    let coordinate = match (r.latitude, r.longitude) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
        _ => None,
    }
    .ok_or(SensorError::PositionUnavailable)?;

    Ok(Fix::new(coordinate, IP_ACCURACY_M))
}
