//! Device location acquisition.
//!
//! Ladder: last known fix → high accuracy → low accuracy → failure.
//!
//! [`Acquisition`] is the pure state machine; [`LocationAcquirer`] drives it
//! against a [`PositionSensor`], owns the last-known fix and publishes
//! [`LocationEvent`]s.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};

use super::sensor::{Fix, PositionOptions, PositionSensor, SensorError};
use super::types::{Coordinate, LocationError, LocationSource, Notice, ResolvedLocation};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Requested sensor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    High,
    Low,
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Timeouts and cache tolerances for both rungs of the ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquirerConfig {
    pub high_timeout: Duration,
    pub high_max_age: Duration,
    pub low_timeout: Duration,
    pub low_max_age: Duration,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            high_timeout: Duration::from_secs(15),
            high_max_age: Duration::ZERO,
            low_timeout: Duration::from_secs(30),
            low_max_age: Duration::from_secs(300),
        }
    }
}

/// One device request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    pub accuracy: Accuracy,
    pub timeout: Duration,
    pub max_cache_age: Duration,
    pub attempt: u32,
}

impl LocationRequest {
    pub fn options(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: self.accuracy == Accuracy::High,
            timeout: self.timeout.as_millis() as u64,
            maximum_age: self.max_cache_age.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionState {
    Idle,
    RequestingHighAccuracy,
    RequestingLowAccuracy,
    Success(ResolvedLocation),
    Failed(SensorError),
}

impl AcquisitionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failed(_))
    }
}

/// What the driver has to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Ask the sensor.
    Request(LocationRequest),
    /// The last known fix answered without touching the sensor.
    Cached(ResolvedLocation),
    /// A fresh fix.
    Resolved(ResolvedLocation),
    Failed(SensorError),
    /// The reading no longer matters to this session.
    Ignored,
}

/// One acquisition session.
#[derive(Debug)]
pub struct Acquisition {
    config: AcquirerConfig,
    state: AcquisitionState,
    downgraded: bool,
    attempts: u32,
}

impl Acquisition {
    pub fn new(config: AcquirerConfig) -> Self {
        Self {
            config,
            state: AcquisitionState::Idle,
            downgraded: false,
            attempts: 0,
        }
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn is_downgraded(&self) -> bool {
        self.downgraded
    }

    /// Leave `Idle`: answer from `cached` when present, otherwise ask for a
    /// fresh high-accuracy fix.
    pub fn start(&mut self, cached: Option<ResolvedLocation>) -> Step {
        if self.state != AcquisitionState::Idle {
            return Step::Ignored;
        }
        if let Some(loc) = cached {
            self.state = AcquisitionState::Success(loc.clone());
            return Step::Cached(loc);
        }
        self.state = AcquisitionState::RequestingHighAccuracy;
        Step::Request(self.next_request(Accuracy::High))
    }

    /// Feed a sensor reading produced by a request of accuracy `from`.
    pub fn on_reading(&mut self, from: Accuracy, reading: Result<Fix, SensorError>) -> Step {
        let pending = match self.state {
            AcquisitionState::RequestingHighAccuracy => Some(Accuracy::High),
            AcquisitionState::RequestingLowAccuracy => Some(Accuracy::Low),
            _ => None,
        };

        match (pending, from, reading) {
            (Some(_), Accuracy::High, Ok(fix)) => {
                self.succeed(fix.coordinate, LocationSource::DeviceHighAccuracy)
            }
            (Some(Accuracy::Low), Accuracy::Low, Ok(fix)) => {
                self.succeed(fix.coordinate, LocationSource::DeviceLowAccuracy)
            }
            (Some(Accuracy::High), Accuracy::High, Err(err)) if !err.is_recoverable() => {
                self.fail(err)
            }
            (Some(Accuracy::High), Accuracy::High, Err(err)) => {
                if self.downgraded {
                    return Step::Ignored;
                }
                tracing::debug!(error = %err, "high accuracy failed, downgrading");
                self.downgraded = true;
                self.state = AcquisitionState::RequestingLowAccuracy;
                Step::Request(self.next_request(Accuracy::Low))
            }
            (Some(Accuracy::Low), Accuracy::Low, Err(err)) => self.fail(err),
            _ => Step::Ignored,
        }
    }

    fn next_request(&mut self, accuracy: Accuracy) -> LocationRequest {
        self.attempts += 1;
        let (timeout, max_cache_age) = match accuracy {
            Accuracy::High => (self.config.high_timeout, self.config.high_max_age),
            Accuracy::Low => (self.config.low_timeout, self.config.low_max_age),
        };
        LocationRequest {
            accuracy,
            timeout,
            max_cache_age,
            attempt: self.attempts,
        }
    }

    fn succeed(&mut self, coordinate: Coordinate, source: LocationSource) -> Step {
        let loc = ResolvedLocation::from_device(coordinate, source);
        self.state = AcquisitionState::Success(loc.clone());
        Step::Resolved(loc)
    }

    fn fail(&mut self, err: SensorError) -> Step {
        self.state = AcquisitionState::Failed(err);
        Step::Failed(err)
    }
}

// ─── Last known fix ─────────────────────────────────────────────

/// Shared last successful device fix. Always replaced as a whole.
#[derive(Debug, Clone, Default)]
pub struct LastKnown {
    inner: Arc<RwLock<Option<ResolvedLocation>>>,
}

impl LastKnown {
    pub fn get(&self) -> Option<ResolvedLocation> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn replace(&self, loc: ResolvedLocation) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(loc);
    }
}

// ─── Driver ─────────────────────────────────────────────────────

/// Result of [`LocationAcquirer::locate_or_fallback`].
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub location: ResolvedLocation,
    /// Why the sentinel was used, if it was.
    pub notice: Option<Notice>,
}

impl Located {
    fn fix(location: ResolvedLocation) -> Self {
        Self {
            location,
            notice: None,
        }
    }
}

fn failure_notice(err: &LocationError) -> Notice {
    match err {
        LocationError::PermissionDenied => Notice::PermissionDenied,
        _ => Notice::LocationUnavailable,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A fresh device fix was recorded.
    Fix(ResolvedLocation),
    /// First fix of the session with no explicit center requested.
    AutoCenter(Coordinate),
    Notice(Notice),
}

pub struct LocationAcquirer {
    sensor: Arc<dyn PositionSensor>,
    config: AcquirerConfig,
    last_known: LastKnown,
    session: Mutex<()>,
    events: broadcast::Sender<LocationEvent>,
    auto_centered: AtomicBool,
    explicit_center: AtomicBool,
}

impl LocationAcquirer {
    pub fn new(sensor: Arc<dyn PositionSensor>, config: AcquirerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sensor,
            config,
            last_known: LastKnown::default(),
            session: Mutex::new(()),
            events,
            auto_centered: AtomicBool::new(false),
            explicit_center: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.events.subscribe()
    }

    /// Last successful fix, without touching the sensor.
    pub fn last_known(&self) -> Option<ResolvedLocation> {
        self.last_known.get()
    }

    /// The map was centered on purpose; suppress the automatic centering.
    pub fn request_center(&self) {
        self.explicit_center.store(true, Ordering::SeqCst);
    }

    /// Run the ladder once.
    ///
    /// Concurrent callers are serialized; a caller that waited behind a
    /// successful session gets that session's fix from the cache.
    pub async fn acquire(&self) -> Result<ResolvedLocation, LocationError> {
        if let Some(cached) = self.last_known.get() {
            tracing::debug!(source = %cached.source, "using last known fix");
            return Ok(cached);
        }

        let _session = self.session.lock().await;
        let mut acquisition = Acquisition::new(self.config.clone());
        let mut step = acquisition.start(self.last_known.get());
        loop {
            step = match step {
                Step::Request(request) => {
                    let reading = self.request(&request).await;
                    acquisition.on_reading(request.accuracy, reading)
                }
                Step::Cached(loc) => return Ok(loc),
                Step::Resolved(loc) => {
                    self.record(&loc);
                    return Ok(loc);
                }
                Step::Failed(err) => {
                    self.report_failure(err);
                    // A recoverable error here means both rungs were tried.
                    return Err(if err.is_recoverable() {
                        LocationError::AllStrategiesExhausted
                    } else {
                        err.into()
                    });
                }
                Step::Ignored => return Err(LocationError::AllStrategiesExhausted),
            };
        }
    }

    /// Position for a manual site entry: cached fix, then the ladder, then the
    /// sentinel origin.
    pub async fn locate_or_fallback(&self) -> Located {
        if let Some(cached) = self.last_known.get() {
            return Located::fix(cached);
        }
        self.publish(LocationEvent::Notice(Notice::Searching));
        match self.acquire().await {
            Ok(loc) => Located::fix(loc),
            Err(e) => {
                tracing::warn!(error = %e, "device location unavailable, using sentinel");
                Located {
                    location: ResolvedLocation::sentinel(),
                    notice: Some(failure_notice(&e)),
                }
            }
        }
    }

    /// Follow a continuous high-accuracy watch.
    ///
    /// Every fix replaces the last known one. Errors run through a single
    /// [`Acquisition`], so at most one low-accuracy request is made and a
    /// permission denial ends tracking.
    pub async fn track(&self, mut readings: mpsc::Receiver<Result<Fix, SensorError>>) {
        let mut acquisition = Acquisition::new(self.config.clone());
        // The watch itself is the high-accuracy request.
        let _ = acquisition.start(None);

        while let Some(reading) = readings.recv().await {
            let mut step = match reading {
                Ok(fix) => {
                    let loc = ResolvedLocation::from_device(
                        fix.coordinate,
                        LocationSource::DeviceHighAccuracy,
                    );
                    let _ = acquisition.on_reading(Accuracy::High, Ok(fix));
                    self.record(&loc);
                    continue;
                }
                Err(err) => acquisition.on_reading(Accuracy::High, Err(err)),
            };

            loop {
                step = match step {
                    Step::Request(request) => {
                        let reading = self.request(&request).await;
                        acquisition.on_reading(request.accuracy, reading)
                    }
                    Step::Resolved(loc) | Step::Cached(loc) => {
                        self.record(&loc);
                        break;
                    }
                    Step::Failed(err) => {
                        self.report_failure(err);
                        if !err.is_recoverable() {
                            return;
                        }
                        break;
                    }
                    Step::Ignored => break,
                };
            }
        }
    }

    async fn request(&self, request: &LocationRequest) -> Result<Fix, SensorError> {
        tracing::debug!(
            accuracy = %request.accuracy,
            attempt = request.attempt,
            "requesting device position"
        );
        let reading = self.sensor.current_position(request.options());
        match tokio::time::timeout(request.timeout, reading).await {
            Ok(reading) => reading,
            Err(_) => Err(SensorError::Timeout),
        }
    }

    fn record(&self, loc: &ResolvedLocation) {
        self.last_known.replace(loc.clone());
        tracing::info!(source = %loc.source, position = %loc.coordinate, "device fix recorded");
        self.publish(LocationEvent::Fix(loc.clone()));

        if !self.explicit_center.load(Ordering::SeqCst)
            && !self.auto_centered.swap(true, Ordering::SeqCst)
        {
            self.publish(LocationEvent::AutoCenter(loc.coordinate));
        }
    }

    fn report_failure(&self, err: SensorError) {
        tracing::warn!(error = %err, code = err.code(), "device location failed");
        let notice = failure_notice(&LocationError::from(err));
        self.publish(LocationEvent::Notice(notice));
    }

    fn publish(&self, event: LocationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::BoxFuture;
    use std::collections::VecDeque;

    fn fix(lat: f64, lng: f64) -> Fix {
        Fix::new(Coordinate::new(lat, lng).unwrap(), 10.0)
    }

    enum Scripted {
        Reply(Result<Fix, SensorError>),
        Delay(Duration, Result<Fix, SensorError>),
        Hang,
    }

    struct ScriptedSensor {
        script: std::sync::Mutex<VecDeque<Scripted>>,
        calls: std::sync::Mutex<Vec<PositionOptions>>,
    }

    impl ScriptedSensor {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.into()),
                calls: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<PositionOptions> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PositionSensor for ScriptedSensor {
        fn current_position(
            &self,
            options: PositionOptions,
        ) -> BoxFuture<'_, Result<Fix, SensorError>> {
            self.calls.lock().unwrap().push(options);
            let next = self.script.lock().unwrap().pop_front();
            Box::pin(async move {
                match next {
                    Some(Scripted::Reply(r)) => r,
                    Some(Scripted::Delay(d, r)) => {
                        tokio::time::sleep(d).await;
                        r
                    }
                    Some(Scripted::Hang) => std::future::pending().await,
                    None => Err(SensorError::PositionUnavailable),
                }
            })
        }
    }

    fn drain(rx: &mut broadcast::Receiver<LocationEvent>) -> Vec<LocationEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    // ─── State machine ──────────────────────────────────────────

    #[test]
    fn test_machine_high_accuracy_success() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        let step = acq.start(None);
        let Step::Request(req) = step else { panic!("expected request, got {:?}", step) };
        assert_eq!(req.accuracy, Accuracy::High);
        assert_eq!(
            req.options(),
            PositionOptions { enable_high_accuracy: true, timeout: 15_000, maximum_age: 0 }
        );
        assert_eq!(acq.state(), &AcquisitionState::RequestingHighAccuracy);

        let Step::Resolved(loc) = acq.on_reading(Accuracy::High, Ok(fix(45.0, 9.0))) else {
            panic!("expected fix")
        };
        assert_eq!(loc.source, LocationSource::DeviceHighAccuracy);
        assert!(acq.state().is_terminal());
    }

    #[test]
    fn test_machine_timeout_downgrades() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        acq.start(None);
        let step = acq.on_reading(Accuracy::High, Err(SensorError::Timeout));
        let Step::Request(req) = step else { panic!("expected low request, got {:?}", step) };
        assert_eq!(
            req.options(),
            PositionOptions { enable_high_accuracy: false, timeout: 30_000, maximum_age: 300_000 }
        );
        assert_eq!(req.attempt, 2);
        assert!(acq.is_downgraded());

        let Step::Resolved(loc) = acq.on_reading(Accuracy::Low, Ok(fix(45.0, 9.0))) else {
            panic!("expected fix")
        };
        assert_eq!(loc.source, LocationSource::DeviceLowAccuracy);
    }

    #[test]
    fn test_machine_permission_denied_never_downgrades() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        acq.start(None);
        assert_eq!(
            acq.on_reading(Accuracy::High, Err(SensorError::PermissionDenied)),
            Step::Failed(SensorError::PermissionDenied)
        );
        assert_eq!(acq.on_reading(Accuracy::High, Err(SensorError::Timeout)), Step::Ignored);
        assert_eq!(
            acq.on_reading(Accuracy::High, Err(SensorError::PositionUnavailable)),
            Step::Ignored
        );
        assert_eq!(acq.state(), &AcquisitionState::Failed(SensorError::PermissionDenied));
        assert!(!acq.is_downgraded());
    }

    #[test]
    fn test_machine_downgrades_once() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        acq.start(None);
        assert!(matches!(
            acq.on_reading(Accuracy::High, Err(SensorError::PositionUnavailable)),
            Step::Request(_)
        ));
        // the still-open high accuracy watch fails again
        assert_eq!(acq.on_reading(Accuracy::High, Err(SensorError::Timeout)), Step::Ignored);
        assert_eq!(acq.state(), &AcquisitionState::RequestingLowAccuracy);
    }

    #[test]
    fn test_machine_low_failure_is_terminal() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        acq.start(None);
        acq.on_reading(Accuracy::High, Err(SensorError::Timeout));
        assert_eq!(
            acq.on_reading(Accuracy::Low, Err(SensorError::Timeout)),
            Step::Failed(SensorError::Timeout)
        );
        assert_eq!(acq.on_reading(Accuracy::Low, Ok(fix(1.0, 1.0))), Step::Ignored);
    }

    #[test]
    fn test_machine_late_high_fix_wins() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        acq.start(None);
        acq.on_reading(Accuracy::High, Err(SensorError::Timeout));
        let Step::Resolved(loc) = acq.on_reading(Accuracy::High, Ok(fix(1.0, 2.0))) else {
            panic!("expected fix")
        };
        assert_eq!(loc.source, LocationSource::DeviceHighAccuracy);
        assert_eq!(acq.on_reading(Accuracy::Low, Ok(fix(3.0, 4.0))), Step::Ignored);
    }

    #[test]
    fn test_machine_cached_short_circuit() {
        let mut acq = Acquisition::new(AcquirerConfig::default());
        let cached = ResolvedLocation::from_device(
            Coordinate::new(45.0, 9.0).unwrap(),
            LocationSource::DeviceLowAccuracy,
        );
        assert_eq!(acq.start(Some(cached.clone())), Step::Cached(cached.clone()));
        assert_eq!(acq.state(), &AcquisitionState::Success(cached));
        assert_eq!(acq.start(None), Step::Ignored);
    }

    // ─── Driver ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_acquire_high_accuracy() {
        let sensor = ScriptedSensor::new(vec![Scripted::Reply(Ok(fix(45.4642, 9.19)))]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let loc = acquirer.acquire().await.unwrap();
        assert_eq!(loc.source, LocationSource::DeviceHighAccuracy);
        assert_eq!(loc.label, "45.464200, 9.190000");
        assert_eq!(acquirer.last_known(), Some(loc));
        assert_eq!(sensor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_uses_cache_without_sensor() {
        let sensor = ScriptedSensor::new(vec![Scripted::Reply(Ok(fix(45.0, 9.0)))]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let first = acquirer.acquire().await.unwrap();
        let second = acquirer.acquire().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sensor.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_then_low_accuracy() {
        let sensor = ScriptedSensor::new(vec![Scripted::Hang, Scripted::Reply(Ok(fix(45.0, 9.0)))]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let loc = acquirer.acquire().await.unwrap();
        assert_eq!(loc.source, LocationSource::DeviceLowAccuracy);

        let calls = sensor.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].enable_high_accuracy);
        assert_eq!(
            calls[1],
            PositionOptions { enable_high_accuracy: false, timeout: 30_000, maximum_age: 300_000 }
        );
    }

    #[tokio::test]
    async fn test_acquire_permission_denied() {
        let sensor = ScriptedSensor::new(vec![
            Scripted::Reply(Err(SensorError::PermissionDenied)),
            Scripted::Reply(Ok(fix(1.0, 1.0))),
        ]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let mut events = acquirer.subscribe();

        assert_eq!(acquirer.acquire().await, Err(LocationError::PermissionDenied));
        assert_eq!(sensor.calls().len(), 1);
        assert_eq!(
            drain(&mut events),
            vec![LocationEvent::Notice(Notice::PermissionDenied)]
        );
        assert!(acquirer.last_known().is_none());
    }

    #[tokio::test]
    async fn test_locate_or_fallback_sentinel() {
        let sensor = ScriptedSensor::new(vec![
            Scripted::Reply(Err(SensorError::PositionUnavailable)),
            Scripted::Reply(Err(SensorError::Timeout)),
        ]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let mut events = acquirer.subscribe();

        let located = acquirer.locate_or_fallback().await;
        assert_eq!(located.location, ResolvedLocation::sentinel());
        assert_eq!(located.notice, Some(Notice::LocationUnavailable));
        assert_eq!(sensor.calls().len(), 2);
        assert_eq!(
            drain(&mut events),
            vec![
                LocationEvent::Notice(Notice::Searching),
                LocationEvent::Notice(Notice::LocationUnavailable),
            ]
        );
    }

    #[tokio::test]
    async fn test_locate_or_fallback_permission_denied_notice() {
        let sensor = ScriptedSensor::new(vec![Scripted::Reply(Err(SensorError::PermissionDenied))]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());

        let located = acquirer.locate_or_fallback().await;
        assert_eq!(located.location, ResolvedLocation::sentinel());
        assert_eq!(located.notice, Some(Notice::PermissionDenied));
        assert_eq!(sensor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_locate_or_fallback_fix_has_no_notice() {
        let sensor = ScriptedSensor::new(vec![Scripted::Reply(Ok(fix(45.0, 9.0)))]);
        let acquirer = LocationAcquirer::new(sensor, AcquirerConfig::default());

        let located = acquirer.locate_or_fallback().await;
        assert_eq!(located.location.source, LocationSource::DeviceHighAccuracy);
        assert_eq!(located.notice, None);
    }

    #[tokio::test]
    async fn test_acquire_exhausted_after_both_rungs() {
        let sensor = ScriptedSensor::new(vec![
            Scripted::Reply(Err(SensorError::PositionUnavailable)),
            Scripted::Reply(Err(SensorError::PositionUnavailable)),
        ]);
        let acquirer = LocationAcquirer::new(sensor, AcquirerConfig::default());
        assert_eq!(acquirer.acquire().await, Err(LocationError::AllStrategiesExhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_single_sensor_call() {
        let sensor = ScriptedSensor::new(vec![
            Scripted::Delay(Duration::from_secs(1), Ok(fix(45.0, 9.0))),
            Scripted::Reply(Ok(fix(1.0, 1.0))),
        ]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());
        let (a, b) = tokio::join!(acquirer.acquire(), acquirer.acquire());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(sensor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_track_auto_centers_once() {
        let sensor = ScriptedSensor::new(vec![]);
        let acquirer = LocationAcquirer::new(sensor, AcquirerConfig::default());
        let mut events = acquirer.subscribe();

        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(fix(45.0, 9.0))).await.unwrap();
        tx.send(Ok(fix(45.1, 9.1))).await.unwrap();
        drop(tx);
        acquirer.track(rx).await;

        let centers: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, LocationEvent::AutoCenter(_)))
            .collect();
        assert_eq!(
            centers,
            vec![LocationEvent::AutoCenter(Coordinate::new(45.0, 9.0).unwrap())]
        );
        assert_eq!(
            acquirer.last_known().map(|l| l.coordinate),
            Coordinate::new(45.1, 9.1)
        );
    }

    #[tokio::test]
    async fn test_track_explicit_center_suppresses_auto_center() {
        let sensor = ScriptedSensor::new(vec![]);
        let acquirer = LocationAcquirer::new(sensor, AcquirerConfig::default());
        acquirer.request_center();
        let mut events = acquirer.subscribe();

        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(fix(45.0, 9.0))).await.unwrap();
        drop(tx);
        acquirer.track(rx).await;

        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, LocationEvent::AutoCenter(_))));
        assert!(acquirer.last_known().is_some());
    }

    #[tokio::test]
    async fn test_track_repeated_errors_single_downgrade() {
        let sensor = ScriptedSensor::new(vec![Scripted::Reply(Ok(fix(45.0, 9.0)))]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());

        let (tx, rx) = mpsc::channel(8);
        tx.send(Err(SensorError::Timeout)).await.unwrap();
        tx.send(Err(SensorError::Timeout)).await.unwrap();
        tx.send(Err(SensorError::PositionUnavailable)).await.unwrap();
        drop(tx);
        acquirer.track(rx).await;

        let calls = sensor.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].enable_high_accuracy);
        assert_eq!(
            acquirer.last_known().map(|l| l.source),
            Some(LocationSource::DeviceLowAccuracy)
        );
    }

    #[tokio::test]
    async fn test_track_stops_on_permission_denied() {
        let sensor = ScriptedSensor::new(vec![]);
        let acquirer = LocationAcquirer::new(sensor.clone(), AcquirerConfig::default());

        let (tx, rx) = mpsc::channel(8);
        tx.send(Err(SensorError::PermissionDenied)).await.unwrap();
        tx.send(Ok(fix(45.0, 9.0))).await.unwrap();
        acquirer.track(rx).await;

        assert!(sensor.calls().is_empty());
        assert!(acquirer.last_known().is_none());
        drop(tx);
    }
}
