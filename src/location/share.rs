//! Share-intent payloads: `title`, `text` and `url` from a deep link.

use serde::Serialize;

use super::extract;
use super::types::{Coordinate, SiteDraft};

/// Label used when a shared pair arrives with no text at all.
pub const DEFAULT_SHARE_LABEL: &str = "Shared location";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SharedLocation {
    /// The payload carried explicit coordinates.
    Resolved { coordinate: Coordinate, label: String },
    /// Text only; the position has to be fixed by hand.
    LabelOnly { label: String },
}

impl SharedLocation {
    pub fn label(&self) -> &str {
        match self {
            Self::Resolved { label, .. } | Self::LabelOnly { label } => label,
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Self::Resolved { coordinate, .. } => Some(*coordinate),
            Self::LabelOnly { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Entry form contents. Label-only shares sit on the sentinel origin.
    pub fn to_draft(&self) -> SiteDraft {
        SiteDraft::new(self.coordinate().unwrap_or(Coordinate::ORIGIN), self.label())
    }
}

/// Parse a share payload. `None` only when all three fields are blank.
///
/// Labels keep the fields as they were shared; blankness is judged on the
/// trimmed text only.
pub fn parse(title: &str, text: &str, url: &str) -> Option<SharedLocation> {
    if is_blank(title) && is_blank(text) && is_blank(url) {
        return None;
    }

    let combined = [title, text, url].join(" ");
    if let Some(coordinate) = extract::extract(&combined) {
        let label = first_non_empty(&[text, title]).unwrap_or(DEFAULT_SHARE_LABEL);
        tracing::debug!(position = %coordinate, "share payload carried coordinates");
        return Some(SharedLocation::Resolved {
            coordinate,
            label: label.to_string(),
        });
    }

    let label = format!("{} {}", text, url).trim().to_string();
    let label = if label.is_empty() { title.trim().to_string() } else { label };
    Some(SharedLocation::LabelOnly { label })
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|s| !is_blank(s))
}
