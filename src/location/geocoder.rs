//! Address geocoding via OpenStreetMap Nominatim.
//!
//! Lowest-priority strategy: best effort, single candidate, no retries.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::types::{Coordinate, LocationError};
use super::BoxFuture;

/// Default HTTP timeout for geocoding requests.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// One candidate as returned by the geocoding service.
#[derive(Deserialize, Debug, Clone)]
pub struct GeocodeCandidate {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

impl GeocodeCandidate {
    /// The candidate's position, if its text fields hold one in range.
    pub fn coordinate(&self) -> Result<Coordinate, LocationError> {
        Coordinate::parse(&self.lat, &self.lon)
            .ok_or_else(|| LocationError::Parse(format!("{}, {}", self.lat, self.lon)))
    }
}

/// A geocoded address, ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub coordinate: Coordinate,
    pub display_label: String,
}

/// A service that turns free text into candidate matches.
pub trait Geocoder: Send + Sync + 'static {
    /// Search for `query`, best match first.
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<GeocodeCandidate>, LocationError>>;
}

// ─── Nominatim provider ─────────────────────────────────────────

pub struct NominatimGeocoder {
    endpoint: String,
    user_agent: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1&addressdetails=1",
            self.endpoint,
            utf8_percent_encode(query, NON_ALPHANUMERIC),
        )
    }
}

impl Geocoder for NominatimGeocoder {
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<GeocodeCandidate>, LocationError>> {
        let url = self.search_url(query);
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || nominatim_search(&url, &user_agent, timeout))
                .await
                .map_err(|e| LocationError::Network(e.to_string()))?
        })
    }
}

fn nominatim_search(
    url: &str,
    user_agent: &str,
    timeout: Duration,
) -> Result<Vec<GeocodeCandidate>, LocationError> {
    let response = ureq::get(url)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| LocationError::Network(e.to_string()))?;

    response
        .into_json()
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))
}

// ─── Address geocoder ───────────────────────────────────────────

/// Wraps a [`Geocoder`] with the input preconditions and label rules.
#[derive(Clone)]
pub struct AddressGeocoder {
    geocoder: Arc<dyn Geocoder>,
    min_query_chars: usize,
    label_max_chars: usize,
}

impl AddressGeocoder {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        min_query_chars: usize,
        label_max_chars: usize,
    ) -> Self {
        Self {
            geocoder,
            min_query_chars,
            label_max_chars,
        }
    }

    /// Whether `text` is worth a geocoding request at all.
    pub fn accepts(&self, text: &str) -> bool {
        text.chars().count() >= self.min_query_chars && !looks_like_url(text)
    }

    /// Geocode `text`. Returns `None` on rejection, empty result or failure.
    pub async fn geocode(&self, text: &str) -> Option<GeocodeHit> {
        if !self.accepts(text) {
            return None;
        }

        let candidates = match self.geocoder.search(text).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(query = text, error = %e, "address geocoding failed");
                return None;
            }
        };

        let first = candidates.first()?;
        let coordinate = match first.coordinate() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(query = text, error = %e, "geocoder returned unusable candidate");
                return None;
            }
        };

        Some(GeocodeHit {
            coordinate,
            display_label: truncate_label(&first.display_name, self.label_max_chars),
        })
    }
}

fn looks_like_url(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Cut `label` to `max_chars` characters, marking the cut with `...`.
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let cut: String = label.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
