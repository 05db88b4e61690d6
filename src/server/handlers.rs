use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::location::share as share_intent;
use crate::location::{Located, LocationSource, Notice, ResolvedLocation, SiteDraft};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

/// Wire shape of a resolved location.
#[derive(Debug, Serialize, PartialEq)]
pub struct LocationResponse {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    pub source: LocationSource,
}

impl From<ResolvedLocation> for LocationResponse {
    fn from(loc: ResolvedLocation) -> Self {
        Self {
            lat: loc.coordinate.lat,
            lng: loc.coordinate.lng,
            label: loc.label,
            source: loc.source,
        }
    }
}

// ─── GET /api/resolve ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub text: Option<String>,
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<LocationResponse>, ApiError> {
    let start = Instant::now();

    let text = params.text.as_deref().unwrap_or("").trim();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'text' parameter"));
    }

    let resolved = state.resolvers.resolve_text(text).await.ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("No location found for '{}'", text))
    })?;

    tracing::info!(
        text,
        source = %resolved.source,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/resolve"
    );
    Ok(Json(resolved.into()))
}

// ─── GET /api/share ──────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct ShareQuery {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ShareResponse {
    #[serde(flatten)]
    pub draft: SiteDraft,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<LocationResponse>,
}

pub async fn share(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShareQuery>,
) -> Response {
    let Some(shared) = share_intent::parse(&params.title, &params.text, &params.url) else {
        tracing::debug!("GET /api/share with empty payload");
        return StatusCode::NO_CONTENT.into_response();
    };

    let suggestion = if shared.is_resolved() {
        None
    } else {
        state.resolvers.resolve_text(shared.label()).await.map(LocationResponse::from)
    };

    tracing::info!(
        resolved = shared.is_resolved(),
        suggested = suggestion.is_some(),
        "GET /api/share"
    );
    Json(ShareResponse {
        draft: shared.to_draft(),
        resolved: shared.is_resolved(),
        suggestion,
    })
    .into_response()
}

// ─── GET /api/locate ─────────────────────────────────────────────

/// Device position, plus the notice explaining a sentinel fallback.
#[derive(Debug, Serialize, PartialEq)]
pub struct LocateResponse {
    #[serde(flatten)]
    pub location: LocationResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl From<Located> for LocateResponse {
    fn from(located: Located) -> Self {
        Self {
            location: located.location.into(),
            notice: located.notice,
        }
    }
}

pub async fn locate(State(state): State<Arc<AppState>>) -> Json<LocateResponse> {
    let start = Instant::now();
    let located = state.acquirer.locate_or_fallback().await;
    tracing::info!(
        source = %located.location.source,
        fallback = located.notice.is_some(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/locate"
    );
    Json(located.into())
}
