//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// The "no location available" placeholder.
    pub const ORIGIN: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };

    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }

    /// Parse a pair of decimal strings (surrounding whitespace allowed).
    pub fn parse(lat: &str, lng: &str) -> Option<Self> {
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        Self::new(lat, lng)
    }

    pub fn is_origin(&self) -> bool {
        *self == Self::ORIGIN
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Which strategy produced a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    ExplicitText,
    Link,
    Geocode,
    DeviceHighAccuracy,
    DeviceLowAccuracy,
    ManualFallback,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitText => write!(f, "Text"),
            Self::Link => write!(f, "Link"),
            Self::Geocode => write!(f, "Geocoder"),
            Self::DeviceHighAccuracy => write!(f, "GPS"),
            Self::DeviceLowAccuracy => write!(f, "Network"),
            Self::ManualFallback => write!(f, "Manual"),
        }
    }
}

/// A coordinate with a display label and its provenance.
///
/// Only built by a resolution step; replaced, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    pub label: String,
    pub source: LocationSource,
}

impl ResolvedLocation {
    pub fn new(coordinate: Coordinate, label: impl Into<String>, source: LocationSource) -> Self {
        Self {
            coordinate,
            label: label.into(),
            source,
        }
    }

    /// The last-resort placeholder used when every strategy failed.
    pub fn sentinel() -> Self {
        Self::new(Coordinate::ORIGIN, String::new(), LocationSource::ManualFallback)
    }

    /// A device fix, labeled with its own coordinates.
    pub fn from_device(coordinate: Coordinate, source: LocationSource) -> Self {
        Self::new(coordinate, coordinate.to_string(), source)
    }
}

/// The record shape written to the site store: coordinate into `lat`/`lng`,
/// label into `address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDraft {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl SiteDraft {
    pub fn new(coordinate: Coordinate, address: impl Into<String>) -> Self {
        Self {
            lat: coordinate.lat,
            lng: coordinate.lng,
            address: address.into(),
        }
    }

    /// True when the user still has to place the site by hand.
    pub fn needs_manual_position(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

impl From<&ResolvedLocation> for SiteDraft {
    fn from(loc: &ResolvedLocation) -> Self {
        Self::new(loc.coordinate, loc.label.clone())
    }
}

/// User-facing notifications. Consumers decide how to show and dismiss them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Searching,
    PermissionDenied,
    LocationUnavailable,
    LinkResolved,
    AddressFound(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Searching => write!(f, "Looking up your position..."),
            Self::PermissionDenied => {
                write!(f, "Location permission denied. Enter the position manually.")
            }
            Self::LocationUnavailable => {
                write!(f, "Could not determine your position. Using 0, 0.")
            }
            Self::LinkResolved => write!(f, "Position found from link!"),
            Self::AddressFound(label) => write!(f, "Position found: {}", label),
        }
    }
}

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Could not parse coordinates: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out")]
    SensorTimeout,

    #[error("Position unavailable")]
    SensorUnavailable,

    #[error("No strategy produced a location")]
    AllStrategiesExhausted,

    #[error("No location input given")]
    NoInput,
}
