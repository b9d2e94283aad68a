//! The map session: one task that owns the follow controller and serializes
//! every input through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::algorithm::follow_controller::{FollowConfig, FollowController};
use crate::algorithm::heading::heading_from_alpha;
use crate::algorithm::zoom_gesture::ZoomGesture;
use crate::config::AppConfig;
use crate::geocode::{GeocodeError, Locale, ReverseGeocoder};
use crate::location::{LocationUpdate, LocationWatch};
use crate::models::camera::{ControllerEffect, MapSnapshot};
use crate::models::events::MapEvent;
use crate::models::geo::LngLat;
use crate::session::ports::{HapticSink, MapRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("map session is closed")]
pub struct SessionClosed;

/// Input accepted by a running session.
#[derive(Debug)]
pub enum SessionInput {
    Map(MapEvent),
    ToggleFollow,
    /// Raw `deviceorientation` alpha.
    Orientation(Option<f64>),
    Location(LocationUpdate),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub follow: FollowConfig,
    pub fallback_location: LngLat,
    pub fallback_after: Duration,
    /// Minimum spacing between reverse geocode lookups.
    pub geocode_interval: Duration,
    pub locale: Locale,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            follow: config.follow.clone(),
            fallback_location: config.location.default_location,
            fallback_after: Duration::from_millis(config.location.fallback_after_ms),
            geocode_interval: Duration::from_millis(config.geocoder.min_interval_ms),
            locale: config.geocoder.locale,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct GeocodeOutcome {
    generation: u64,
    result: Result<String, GeocodeError>,
}

/// Cloneable handle used by the UI layer to talk to a session.
#[derive(Clone)]
pub struct MapSessionHandle {
    id: Uuid,
    inputs: mpsc::UnboundedSender<SessionInput>,
    snapshot: watch::Receiver<MapSnapshot>,
    alive: Arc<AtomicBool>,
}

impl MapSessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, input: SessionInput) -> Result<(), SessionClosed> {
        if !self.is_alive() {
            return Err(SessionClosed);
        }
        self.inputs.send(input).map_err(|_| SessionClosed)
    }

    pub fn map_event(&self, event: MapEvent) -> Result<(), SessionClosed> {
        self.send(SessionInput::Map(event))
    }

    pub fn toggle_follow(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::ToggleFollow)
    }

    pub fn report_orientation(&self, alpha: Option<f64>) -> Result<(), SessionClosed> {
        self.send(SessionInput::Orientation(alpha))
    }

    pub fn report_location(&self, update: LocationUpdate) -> Result<(), SessionClosed> {
        self.send(SessionInput::Location(update))
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MapSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Tears the session down. In-flight geocode results are discarded.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let _ = self.inputs.send(SessionInput::Shutdown);
        }
    }
}

pub struct MapSession {
    id: Uuid,
    options: SessionOptions,
    controller: FollowController,
    renderer: Box<dyn MapRenderer>,
    haptics: Box<dyn HapticSink>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    location: Option<LocationWatch>,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    snapshot_tx: watch::Sender<MapSnapshot>,
    alive: Arc<AtomicBool>,
    heading_deg: f64,
    address: Option<String>,
    /// Selection waiting for a lookup, and when that lookup is due.
    geocode_pending: Option<(LngLat, Instant)>,
    /// Generation of the most recently dispatched lookup.
    geocode_generation: u64,
    geocode_tx: mpsc::UnboundedSender<GeocodeOutcome>,
    geocode_rx: mpsc::UnboundedReceiver<GeocodeOutcome>,
}

enum Wake {
    Input(Option<SessionInput>),
    Location(Option<LocationUpdate>),
    Geocoded(GeocodeOutcome),
    GeocodeDue,
    FallbackDue,
}

impl MapSession {
    pub fn new(
        options: SessionOptions,
        renderer: Box<dyn MapRenderer>,
        haptics: Box<dyn HapticSink>,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        location: Option<LocationWatch>,
    ) -> (MapSession, MapSessionHandle) {
        let id = Uuid::new_v4();
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(MapSnapshot::default());
        let (geocode_tx, geocode_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let session = MapSession {
            id,
            controller: FollowController::new(options.follow.clone()),
            options,
            renderer,
            haptics,
            geocoder,
            location,
            inputs,
            snapshot_tx,
            alive: alive.clone(),
            heading_deg: 0.0,
            address: None,
            geocode_pending: None,
            geocode_generation: 0,
            geocode_tx,
            geocode_rx,
        };
        let handle = MapSessionHandle {
            id,
            inputs: inputs_tx,
            snapshot: snapshot_rx,
            alive,
        };
        (session, handle)
    }

    /// Processes inputs until the handle closes the session or every handle
    /// is dropped.
    pub async fn run(mut self) {
        log::info!("map session {}: started", self.id);
        let fallback = tokio::time::sleep(self.options.fallback_after);
        tokio::pin!(fallback);
        let mut fallback_pending = true;

        loop {
            let wake = tokio::select! {
                input = self.inputs.recv() => Wake::Input(input),
                update = next_location(&mut self.location) => Wake::Location(update),
                Some(outcome) = self.geocode_rx.recv() => Wake::Geocoded(outcome),
                () = geocode_due(self.geocode_pending) => Wake::GeocodeDue,
                () = &mut fallback, if fallback_pending => Wake::FallbackDue,
            };

            match wake {
                Wake::Input(None) | Wake::Input(Some(SessionInput::Shutdown)) => break,
                Wake::Input(Some(input)) => self.handle(input),
                Wake::Location(Some(update)) => self.handle(SessionInput::Location(update)),
                Wake::Location(None) => {
                    log::info!("map session {}: location watch ended", self.id);
                    self.location = None;
                }
                Wake::Geocoded(outcome) => self.apply_geocode(outcome),
                Wake::GeocodeDue => self.dispatch_geocode(),
                Wake::FallbackDue => {
                    fallback_pending = false;
                    let effects = self
                        .controller
                        .inject_fallback(self.options.fallback_location);
                    self.commit(effects);
                }
            }
        }

        self.alive.store(false, Ordering::Release);
        // Releases the location subscription.
        self.location = None;
        log::info!("map session {}: closed", self.id);
    }

    fn handle(&mut self, input: SessionInput) {
        let effects = match input {
            SessionInput::Map(event) => self.handle_map_event(event),
            SessionInput::ToggleFollow => self.controller.toggle_follow(),
            SessionInput::Orientation(alpha) => {
                self.heading_deg = heading_from_alpha(alpha);
                Vec::new()
            }
            SessionInput::Location(Ok(sample)) => self.controller.location_updated(sample),
            SessionInput::Location(Err(err)) => {
                log::warn!("map session {}: location update failed: {err}", self.id);
                Vec::new()
            }
            SessionInput::Shutdown => Vec::new(),
        };
        self.commit(effects);
    }

    fn handle_map_event(&mut self, event: MapEvent) -> Vec<ControllerEffect> {
        match event {
            MapEvent::Ready => {
                log::info!("map session {}: renderer ready", self.id);
                self.controller.renderer_ready()
            }
            MapEvent::DragStart { multi_touch } => self.controller.user_drag_started(multi_touch),
            MapEvent::MoveStart => self.controller.map_move_started(),
            MapEvent::MoveEnd { center, zoom } => self.controller.map_move_ended(center, zoom),
            MapEvent::Wheel { delta_y } => {
                self.controller.zoom_gesture(ZoomGesture::Wheel { delta_y })
            }
            MapEvent::Pinch {
                start_distance,
                current_distance,
                start_zoom,
            } => self.controller.zoom_gesture(ZoomGesture::Pinch {
                start_distance,
                current_distance,
                start_zoom,
            }),
        }
    }

    /// Forwards effects, then publishes the new snapshot.
    fn commit(&mut self, effects: Vec<ControllerEffect>) {
        let previous_selected = self.snapshot_tx.borrow().selected;

        for effect in effects {
            match effect {
                ControllerEffect::SetCamera(command) => self.renderer.set_camera(command),
                ControllerEffect::DefaultZoomHandling(enabled) => {
                    self.renderer.set_default_zoom_handling(enabled)
                }
                ControllerEffect::Haptic(cue) => self.haptics.cue(cue),
            }
        }

        let selected = self.controller.selected_location();
        if selected != previous_selected {
            if let Some(at) = selected {
                self.schedule_geocode(at);
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let mut next = self.controller.snapshot();
        next.heading_deg = self.heading_deg;
        next.address = self.address.clone();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Throttles lookups: a change arms a lookup `geocode_interval` later and
    /// further changes before it fires only move its target, so continuous
    /// updates still get one lookup per interval.
    fn schedule_geocode(&mut self, at: LngLat) {
        if self.geocoder.is_none() {
            return;
        }
        let due = self
            .geocode_pending
            .map_or_else(|| Instant::now() + self.options.geocode_interval, |(_, due)| due);
        self.geocode_pending = Some((at, due));
    }

    fn dispatch_geocode(&mut self) {
        let Some((at, _)) = self.geocode_pending.take() else {
            return;
        };
        let Some(geocoder) = self.geocoder.clone() else {
            return;
        };
        self.geocode_generation += 1;
        let generation = self.geocode_generation;
        let alive = self.alive.clone();
        let tx = self.geocode_tx.clone();
        log::debug!("map session {}: reverse geocoding {at:?}", self.id);

        tokio::spawn(async move {
            let result = geocoder.reverse_geocode(at).await;
            if !alive.load(Ordering::Acquire) {
                return;
            }
            let _ = tx.send(GeocodeOutcome { generation, result });
        });
    }

    fn apply_geocode(&mut self, outcome: GeocodeOutcome) {
        if outcome.generation != self.geocode_generation {
            return;
        }
        self.address = Some(match outcome.result {
            Ok(address) => address,
            Err(err) => {
                log::warn!("map session {}: reverse geocode failed: {err}", self.id);
                self.options.locale.failure_text().to_string()
            }
        });
        self.publish();
    }
}

async fn geocode_due(pending: Option<(LngLat, Instant)>) {
    match pending {
        Some((_, due)) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn next_location(watch: &mut Option<LocationWatch>) -> Option<LocationUpdate> {
    match watch {
        Some(watch) => watch.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeFuture;
    use crate::location::{ForwardedLocationSource, LocationError, LocationFeed, LocationSource};
    use crate::models::camera::{CameraCommand, FollowMode};
    use crate::models::geo::LocationSample;
    use std::sync::Mutex;

    const TRACKED: LngLat = LngLat::new(114.16945, 22.3193);
    const WAIT: Duration = Duration::from_secs(3);

    #[derive(Debug, Clone, PartialEq)]
    enum RendererCall {
        Camera(CameraCommand),
        DefaultZoom(bool),
    }

    #[derive(Clone, Default)]
    struct RecordingRenderer(Arc<Mutex<Vec<RendererCall>>>);

    impl MapRenderer for RecordingRenderer {
        fn set_camera(&mut self, command: CameraCommand) {
            self.0.lock().expect("renderer log").push(RendererCall::Camera(command));
        }

        fn set_default_zoom_handling(&mut self, enabled: bool) {
            self.0
                .lock()
                .expect("renderer log")
                .push(RendererCall::DefaultZoom(enabled));
        }
    }

    impl RecordingRenderer {
        fn calls(&self) -> Vec<RendererCall> {
            self.0.lock().expect("renderer log").clone()
        }

        fn cameras(&self) -> Vec<CameraCommand> {
            self.0
                .lock()
                .expect("renderer log")
                .iter()
                .filter_map(|call| match call {
                    RendererCall::Camera(command) => Some(*command),
                    _ => None,
                })
                .collect()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHaptics(Arc<Mutex<Vec<&'static str>>>);

    impl HapticSink for RecordingHaptics {
        fn light_impact(&self) {
            self.0.lock().expect("haptics log").push("impact");
        }

        fn selection_changed(&self) {
            self.0.lock().expect("haptics log").push("selection");
        }
    }

    struct FakeGeocoder {
        calls: Arc<Mutex<Vec<LngLat>>>,
        fail: bool,
    }

    impl ReverseGeocoder for FakeGeocoder {
        fn reverse_geocode(&self, at: LngLat) -> GeocodeFuture<'_> {
            self.calls.lock().expect("geocoder log").push(at);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(GeocodeError::Status(503))
                } else {
                    Ok(format!("{:.4}, {:.4}", at.lat, at.lng))
                }
            })
        }
    }

    struct Harness {
        handle: MapSessionHandle,
        renderer: RecordingRenderer,
        haptics: RecordingHaptics,
        feed: LocationFeed,
        geocode_calls: Arc<Mutex<Vec<LngLat>>>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(options: SessionOptions, failing_geocoder: bool) -> Harness {
        let renderer = RecordingRenderer::default();
        let haptics = RecordingHaptics::default();
        let (source, feed) = ForwardedLocationSource::new();
        let watch = source.watch().expect("watch");
        let geocode_calls = Arc::new(Mutex::new(Vec::new()));
        let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(FakeGeocoder {
            calls: geocode_calls.clone(),
            fail: failing_geocoder,
        });

        let (session, handle) = MapSession::new(
            options,
            Box::new(renderer.clone()),
            Box::new(haptics.clone()),
            Some(geocoder),
            Some(watch),
        );
        let task = tokio::spawn(session.run());
        Harness {
            handle,
            renderer,
            haptics,
            feed,
            geocode_calls,
            task,
        }
    }

    fn fast_options() -> SessionOptions {
        SessionOptions {
            fallback_after: Duration::from_secs(60),
            geocode_interval: Duration::from_millis(30),
            ..SessionOptions::default()
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async move {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition in time");
    }

    /// Starts a session and waits until it has seen the map load.
    async fn start_ready(options: SessionOptions, failing_geocoder: bool) -> Harness {
        let harness = start(options, failing_geocoder);
        harness.handle.map_event(MapEvent::Ready).expect("send ready");
        let renderer = harness.renderer.clone();
        wait_until(move || !renderer.calls().is_empty()).await;
        harness
    }

    async fn wait_for_snapshot(
        handle: &MapSessionHandle,
        predicate: impl FnMut(&MapSnapshot) -> bool,
    ) -> MapSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
            .await
            .expect("snapshot in time")
            .expect("session alive")
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn watched_fix_recenters_and_selects_location() {
        let harness = start_ready(fast_options(), false).await;
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");

        let snapshot = wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;
        assert_eq!(snapshot.selected, Some(TRACKED));
        assert_eq!(snapshot.mode, FollowMode::Following);
        let renderer = harness.renderer.clone();
        wait_until(move || !renderer.cameras().is_empty()).await;
        assert_eq!(harness.renderer.cameras()[0].center, TRACKED);
        harness.handle.close();
    }

    #[tokio::test]
    async fn nearby_pan_snaps_back_with_impact_cue() {
        let harness = start_ready(fast_options(), false).await;
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");
        wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;

        let handle = &harness.handle;
        handle
            .map_event(MapEvent::MoveEnd { center: TRACKED, zoom: 16.0 })
            .expect("send");
        handle
            .map_event(MapEvent::DragStart { multi_touch: false })
            .expect("send");
        wait_for_snapshot(handle, |s| s.mode == FollowMode::Manual).await;

        let nearby = LngLat::new(TRACKED.lng, TRACKED.lat + 5.0 / 111_194.93);
        handle.map_event(MapEvent::MoveStart).expect("send");
        handle
            .map_event(MapEvent::MoveEnd { center: nearby, zoom: 16.0 })
            .expect("send");
        wait_for_snapshot(handle, |s| s.mode == FollowMode::Following).await;

        assert_eq!(*harness.haptics.0.lock().expect("haptics log"), vec!["impact"]);
        let cameras = harness.renderer.cameras();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[1].center, TRACKED);
        harness.handle.close();
    }

    #[tokio::test]
    async fn falls_back_to_default_location_without_fix() {
        let options = SessionOptions {
            fallback_after: Duration::from_millis(20),
            ..fast_options()
        };
        let harness = start(options.clone(), false);

        let snapshot = wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;
        assert_eq!(snapshot.selected, Some(options.fallback_location));
        harness.handle.close();
    }

    #[tokio::test]
    async fn location_errors_are_not_fatal() {
        let harness = start(fast_options(), false);
        harness
            .feed
            .push_error(LocationError::Unavailable("no gps".to_string()))
            .expect("push error");
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");

        let snapshot = wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;
        assert_eq!(snapshot.selected, Some(TRACKED));
        harness.handle.close();
    }

    #[tokio::test]
    async fn rapid_selection_changes_share_one_lookup() {
        let harness = start(fast_options(), false);
        for step in 0..5 {
            harness
                .feed
                .push(LocationSample::new(114.1600 + step as f64 * 0.001, 22.3000))
                .expect("push");
        }

        let snapshot = wait_for_snapshot(&harness.handle, |s| s.address.is_some()).await;
        assert_eq!(snapshot.address.as_deref(), Some("22.3000, 114.1640"));
        let calls = harness.geocode_calls.lock().expect("geocoder log").clone();
        assert_eq!(calls.len(), 1);
        assert!((calls[0].lng - 114.164).abs() < 1e-9);
        harness.handle.close();
    }

    #[tokio::test]
    async fn geocoding_failure_shows_localized_placeholder() {
        let options = SessionOptions {
            locale: Locale::En,
            ..fast_options()
        };
        let harness = start(options, true);
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");

        let snapshot = wait_for_snapshot(&harness.handle, |s| s.address.is_some()).await;
        assert_eq!(snapshot.address.as_deref(), Some("Address unavailable"));
        assert_eq!(snapshot.mode, FollowMode::Following);
        harness.handle.close();
    }

    #[tokio::test]
    async fn orientation_updates_heading() {
        let harness = start(fast_options(), false);
        harness.handle.report_orientation(Some(-45.0)).expect("send");
        let snapshot = wait_for_snapshot(&harness.handle, |s| s.heading_deg != 0.0).await;
        assert_eq!(snapshot.heading_deg, 315.0);
        harness.handle.close();
    }

    #[tokio::test]
    async fn close_releases_watch_and_discards_late_results() {
        let harness = start(fast_options(), false);
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");
        wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;

        // The lookup is still pending when the session goes away.
        harness.handle.close();
        assert!(!harness.handle.is_alive());
        assert_eq!(harness.handle.toggle_follow(), Err(SessionClosed));

        tokio::time::timeout(WAIT, harness.task)
            .await
            .expect("session exits in time")
            .expect("session task");
        assert_eq!(
            harness.feed.push(LocationSample::new(114.0, 22.0)),
            Err(LocationError::WatchClosed)
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(harness.geocode_calls.lock().expect("geocoder log").is_empty());
        assert!(harness.handle.snapshot().address.is_none());
    }

    #[tokio::test]
    async fn ready_turns_off_default_zoom_while_following() {
        let harness = start_ready(fast_options(), false).await;
        assert_eq!(
            harness.renderer.calls(),
            vec![RendererCall::DefaultZoom(false)]
        );

        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");
        let renderer = harness.renderer.clone();
        wait_until(move || !renderer.cameras().is_empty()).await;
        assert_eq!(harness.renderer.calls()[0], RendererCall::DefaultZoom(false));
        harness.handle.close();
    }

    #[tokio::test]
    async fn fix_before_ready_is_replayed_and_first_drag_counts() {
        let harness = start(fast_options(), false);
        harness.feed.push(LocationSample::new(TRACKED.lng, TRACKED.lat)).expect("push");
        wait_for_snapshot(&harness.handle, |s| s.selected.is_some()).await;
        assert!(harness.renderer.calls().is_empty());

        let handle = &harness.handle;
        handle.map_event(MapEvent::Ready).expect("send ready");
        let renderer = harness.renderer.clone();
        wait_until(move || !renderer.cameras().is_empty()).await;
        assert_eq!(
            harness.renderer.cameras(),
            vec![CameraCommand {
                center: TRACKED,
                zoom: 16.0,
                animated: true,
                duration_ms: 500,
            }]
        );

        handle.map_event(MapEvent::MoveStart).expect("send");
        handle
            .map_event(MapEvent::MoveEnd { center: TRACKED, zoom: 16.0 })
            .expect("send");
        handle
            .map_event(MapEvent::DragStart { multi_touch: false })
            .expect("send");
        let snapshot = wait_for_snapshot(handle, |s| s.mode == FollowMode::Manual).await;
        assert_eq!(snapshot.mode, FollowMode::Manual);
        harness.handle.close();
    }

    #[tokio::test]
    async fn continuous_fixes_still_get_geocoded() {
        let options = SessionOptions {
            geocode_interval: Duration::from_millis(100),
            ..fast_options()
        };
        let harness = start(options, false);
        for step in 0..12 {
            harness
                .feed
                .push(LocationSample::new(114.1600 + step as f64 * 0.001, 22.3000))
                .expect("push");
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        assert!(harness.handle.snapshot().address.is_some());
        let calls = harness.geocode_calls.lock().expect("geocoder log").len();
        assert!(calls >= 2, "expected periodic lookups, got {calls}");
        assert!(calls < 12, "lookups not throttled: {calls}");
        harness.handle.close();
    }
}
