//! Text resolution: explicit coordinates → short link → geocoder.
//!
//! [`Resolvers`] runs the strategies once. [`InputField`] runs them against a
//! field that keeps changing: every edit bumps a generation counter and only
//! the newest generation may commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::extract;
use super::geocoder::{AddressGeocoder, NominatimGeocoder};
use super::links::{LinkResolver, UnshortenClient};
use super::types::{LocationSource, Notice, ResolvedLocation};
use crate::config::Config;

const NOTICE_CHANNEL_CAPACITY: usize = 16;

// ─── Strategies ─────────────────────────────────────────────────

/// The three text strategies in priority order.
///
/// Offline resolvers carry neither the link expander nor the geocoder and
/// never touch the network.
#[derive(Clone)]
pub struct Resolvers {
    links: Option<LinkResolver>,
    geocoder: Option<AddressGeocoder>,
    debounce: Duration,
}

impl Resolvers {
    pub fn new(links: LinkResolver, geocoder: AddressGeocoder, debounce: Duration) -> Self {
        Self {
            links: Some(links),
            geocoder: Some(geocoder),
            debounce,
        }
    }

    pub fn offline() -> Self {
        Self {
            links: None,
            geocoder: None,
            debounce: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config, offline: bool) -> Self {
        if offline {
            return Self::offline();
        }
        let agent = &config.geocoder.user_agent;
        let links = LinkResolver::new(
            Arc::new(UnshortenClient::new(&config.links.endpoint, agent)),
            &config.links.hosts,
        );
        let geocoder = AddressGeocoder::new(
            Arc::new(NominatimGeocoder::new(&config.geocoder.endpoint, agent)),
            config.geocoder.min_query_chars,
            config.geocoder.label_max_chars,
        );
        Self::new(links, geocoder, Duration::from_millis(config.geocoder.debounce_ms))
    }

    pub fn is_offline(&self) -> bool {
        self.links.is_none() && self.geocoder.is_none()
    }

    /// Resolve `text` once, without debounce.
    pub async fn resolve_text(&self, text: &str) -> Option<ResolvedLocation> {
        if let Some(loc) = explicit(text) {
            return Some(loc);
        }
        if let Some(links) = &self.links {
            if let Some(coordinate) = links.resolve(text).await {
                return Some(ResolvedLocation::new(coordinate, text.trim(), LocationSource::Link));
            }
        }
        let hit = self.geocoder.as_ref()?.geocode(text).await?;
        Some(ResolvedLocation::new(hit.coordinate, hit.display_label, LocationSource::Geocode))
    }

    fn detect_link(&self, text: &str) -> Option<(LinkResolver, String)> {
        let links = self.links.as_ref()?;
        links.detect(text).map(|link| (links.clone(), link))
    }
}

fn explicit(text: &str) -> Option<ResolvedLocation> {
    extract::extract(text)
        .map(|c| ResolvedLocation::new(c, text.trim(), LocationSource::ExplicitText))
}

// ─── Input field ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStatus {
    /// No input yet.
    Idle,
    /// Waiting on the debounce, a link or the geocoder.
    Pending,
    Resolved(ResolvedLocation),
    Unresolved,
}

/// The field's outcome for one input generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub generation: u64,
    pub status: ResolutionStatus,
}

impl Resolution {
    pub fn location(&self) -> Option<&ResolvedLocation> {
        match &self.status {
            ResolutionStatus::Resolved(loc) => Some(loc),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Cursor {
    generation: u64,
    text: String,
    link_in_flight: bool,
    pending: Option<CancellationToken>,
}

struct FieldInner {
    resolvers: Resolvers,
    cursor: Mutex<Cursor>,
    latest: AtomicU64,
    state: watch::Sender<Resolution>,
    notices: broadcast::Sender<Notice>,
}

/// One text field with last-write-wins resolution.
///
/// Must be driven from inside a tokio runtime; edits spawn the async
/// strategies as tasks.
#[derive(Clone)]
pub struct InputField {
    inner: Arc<FieldInner>,
}

impl InputField {
    pub fn new(resolvers: Resolvers) -> Self {
        let (state, _) = watch::channel(Resolution {
            generation: 0,
            status: ResolutionStatus::Idle,
        });
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(FieldInner {
                resolvers,
                cursor: Mutex::new(Cursor::default()),
                latest: AtomicU64::new(0),
                state,
                notices,
            }),
        }
    }

    /// Record an edit and start resolving it.
    ///
    /// Supersedes everything in flight for older edits. While a short link is
    /// being expanded the edit is only recorded; the newest text is resolved
    /// once the link settles.
    pub fn on_input(&self, text: &str) {
        let inner = &self.inner;
        let mut cursor = inner.cursor();
        cursor.generation += 1;
        cursor.text = text.to_string();
        inner.latest.store(cursor.generation, Ordering::SeqCst);
        if let Some(token) = cursor.pending.take() {
            token.cancel();
        }
        inner.state.send_replace(Resolution {
            generation: cursor.generation,
            status: ResolutionStatus::Pending,
        });

        if cursor.link_in_flight {
            tracing::debug!(generation = cursor.generation, "link in flight, deferring edit");
            return;
        }
        inner.dispatch(&mut cursor);
    }

    pub fn current(&self) -> Resolution {
        self.inner.state.borrow().clone()
    }

    pub fn resolved(&self) -> Option<ResolvedLocation> {
        self.current().location().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Resolution> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Wait until the newest edit has committed.
    pub async fn settled(&self) -> Resolution {
        let inner = &self.inner;
        let mut rx = inner.state.subscribe();
        let settled = rx
            .wait_for(|r| {
                r.status != ResolutionStatus::Pending
                    && r.generation == inner.latest.load(Ordering::SeqCst)
            })
            .await;
        match settled {
            Ok(r) => (*r).clone(),
            Err(_) => self.current(),
        }
    }
}

impl FieldInner {
    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.cursor().generation == generation
    }

    /// Run the strategies for the cursor's current text.
    fn dispatch(self: &Arc<Self>, cursor: &mut Cursor) {
        let generation = cursor.generation;
        let text = cursor.text.clone();

        if let Some(loc) = explicit(&text) {
            self.commit(generation, Some(loc));
            return;
        }

        if let Some((links, link)) = self.resolvers.detect_link(&text) {
            cursor.link_in_flight = true;
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run_link(links, link, generation, text).await });
            return;
        }

        self.schedule_geocode(cursor, generation, text);
    }

    async fn run_link(
        self: Arc<Self>,
        links: LinkResolver,
        link: String,
        generation: u64,
        text: String,
    ) {
        let coordinate = links.resolve_link(&link).await;

        let mut cursor = self.cursor();
        cursor.link_in_flight = false;
        if cursor.generation != generation {
            tracing::debug!(generation, latest = cursor.generation, "discarding stale link result");
            self.dispatch(&mut cursor);
            return;
        }
        match coordinate {
            Some(c) => self.commit(
                generation,
                Some(ResolvedLocation::new(c, text.trim(), LocationSource::Link)),
            ),
            None => self.schedule_geocode(&mut cursor, generation, text),
        }
    }

    fn schedule_geocode(self: &Arc<Self>, cursor: &mut Cursor, generation: u64, text: String) {
        let Some(geocoder) = self
            .resolvers
            .geocoder
            .as_ref()
            .filter(|g| g.accepts(&text))
            .cloned()
        else {
            self.commit(generation, None);
            return;
        };

        let token = CancellationToken::new();
        cursor.pending = Some(token.clone());
        let debounce = self.resolvers.debounce;
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            if !inner.is_current(generation) {
                return;
            }
            let hit = tokio::select! {
                _ = token.cancelled() => return,
                hit = geocoder.geocode(&text) => hit,
            };
            let loc = hit.map(|h| {
                ResolvedLocation::new(h.coordinate, h.display_label, LocationSource::Geocode)
            });
            inner.settle_geocode(generation, loc);
        });
    }

    fn settle_geocode(&self, generation: u64, loc: Option<ResolvedLocation>) {
        let mut cursor = self.cursor();
        if cursor.generation != generation {
            tracing::debug!(
                generation,
                latest = cursor.generation,
                "discarding stale geocode result"
            );
            return;
        }
        cursor.pending = None;
        self.commit(generation, loc);
    }

    /// Publish the outcome of `generation`. Callers hold the cursor lock and
    /// have checked that `generation` is current.
    fn commit(&self, generation: u64, outcome: Option<ResolvedLocation>) {
        let status = match outcome {
            Some(loc) => {
                let notice = match loc.source {
                    LocationSource::Link => Some(Notice::LinkResolved),
                    LocationSource::Geocode => Some(Notice::AddressFound(loc.label.clone())),
                    _ => None,
                };
                if let Some(notice) = notice {
                    let _ = self.notices.send(notice);
                }
                tracing::info!(
                    generation,
                    source = %loc.source,
                    position = %loc.coordinate,
                    "input resolved"
                );
                ResolutionStatus::Resolved(loc)
            }
            None => {
                tracing::debug!(generation, "input unresolved");
                ResolutionStatus::Unresolved
            }
        };
        self.state.send_replace(Resolution { generation, status });
    }
}
