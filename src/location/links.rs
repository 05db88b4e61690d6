//! Short-link expansion: `maps.app.goo.gl/...` → canonical map URL → coordinates.

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::types::{Coordinate, LocationError};
use super::BoxFuture;

/// Default HTTP timeout for the expansion service.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Map URLs encode coordinates with at least 3 decimals, sometimes with a
/// `+` before the longitude.
const URL_PAIR_PATTERN: &str = r"(-?\d{1,3}\.\d{3,})[,\s]\s*\+?(-?\d{1,3}\.\d{3,})";

fn url_pair_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(URL_PAIR_PATTERN).expect("url pair pattern is valid"))
}

/// Something that can follow a short link to its destination.
pub trait LinkExpander: Send + Sync + 'static {
    /// Resolve `short_url` to the canonical URL it redirects to.
    fn expand<'a>(
        &'a self,
        short_url: &'a str,
    ) -> BoxFuture<'a, Result<String, LocationError>>;
}

// ─── unshorten.me client ────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ExpansionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    resolved_url: Option<String>,
}

/// Expands links through an unshorten.me-compatible JSON endpoint.
pub struct UnshortenClient {
    endpoint: String,
    user_agent: String,
    timeout: Duration,
}

impl UnshortenClient {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    fn request_url(&self, short_url: &str) -> String {
        format!("{}{}", self.endpoint, short_url)
    }
}

impl LinkExpander for UnshortenClient {
    fn expand<'a>(
        &'a self,
        short_url: &'a str,
    ) -> BoxFuture<'a, Result<String, LocationError>> {
        let url = self.request_url(short_url);
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || fetch_expansion(&url, &user_agent, timeout))
                .await
                .map_err(|e| LocationError::Network(e.to_string()))?
        })
    }
}

fn fetch_expansion(
    url: &str,
    user_agent: &str,
    timeout: Duration,
) -> Result<String, LocationError> {
    let response = ureq::get(url)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| LocationError::Network(e.to_string()))?;

    let body: ExpansionResponse = response
        .into_json()
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

    match body.resolved_url {
        Some(resolved) if body.success && !resolved.is_empty() => Ok(resolved),
        _ => Err(LocationError::InvalidResponse("link could not be expanded".into())),
    }
}

// ─── Resolver ───────────────────────────────────────────────────

/// Detects short links in text and turns them into coordinates.
#[derive(Clone)]
pub struct LinkResolver {
    expander: Arc<dyn LinkExpander>,
    short_link: Option<Regex>,
}

impl LinkResolver {
    /// `hosts` is the allow-list of shortener domains, e.g. `maps.app.goo.gl`.
    pub fn new(expander: Arc<dyn LinkExpander>, hosts: &[String]) -> Self {
        Self {
            expander,
            short_link: short_link_regex(hosts),
        }
    }

    /// First short link in `text`, if any. No network.
    pub fn detect(&self, text: &str) -> Option<String> {
        let short_link = self.short_link.as_ref()?;
        short_link.find(text).map(|m| m.as_str().to_string())
    }

    /// Expand the first short link in `text` and read coordinates from it.
    ///
    /// At most one expansion request is made per call.
    pub async fn resolve(&self, text: &str) -> Option<Coordinate> {
        let link = self.detect(text)?;
        self.resolve_link(&link).await
    }

    /// Expand an already detected link. Failures are logged and become `None`.
    pub async fn resolve_link(&self, link: &str) -> Option<Coordinate> {
        match self.expander.expand(link).await {
            Ok(canonical) => {
                let coord = coordinates_in_url(&canonical);
                tracing::debug!(
                    link,
                    canonical = %canonical,
                    found = coord.is_some(),
                    "short link expanded"
                );
                coord
            }
            Err(e) => {
                tracing::warn!(link, error = %e, "link expansion failed");
                None
            }
        }
    }
}

fn short_link_regex(hosts: &[String]) -> Option<Regex> {
    let alternatives = hosts
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return None;
    }
    let pattern = format!(r"https?://(?:{})/\S+", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "invalid short-link host list");
            None
        }
    }
}

/// Percent-decode a canonical map URL and return the first valid pair in it.
pub fn coordinates_in_url(url: &str) -> Option<Coordinate> {
    let decoded = percent_decode_str(url).decode_utf8_lossy();
    url_pair_regex()
        .captures_iter(&decoded)
        .find_map(|caps| Coordinate::parse(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}
