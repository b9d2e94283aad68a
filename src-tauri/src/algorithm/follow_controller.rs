use serde::{Deserialize, Serialize};

use crate::algorithm::distance::haversine_m;
use crate::algorithm::zoom_gesture::ZoomGesture;
use crate::models::camera::{CameraCommand, ControllerEffect, FollowMode, HapticCue, MapSnapshot};
use crate::models::geo::{LngLat, LocationSample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FollowConfig {
    /// Manual pans ending this close to the tracked location resume following.
    pub snap_radius_m: f64,
    pub recenter_duration_ms: u64,
    /// Zoom the renderer starts at before any fix.
    pub initial_zoom: f64,
    /// Zoom applied when the first fix arrives.
    pub located_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Zoom levels per unit of wheel `deltaY`.
    pub wheel_zoom_rate: f64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            snap_radius_m: 20.0,
            recenter_duration_ms: 500,
            initial_zoom: 12.0,
            located_zoom: 16.0,
            min_zoom: 0.0,
            max_zoom: 22.0,
            wheel_zoom_rate: 1.0 / 450.0,
        }
    }
}

/// Follow/manual camera state machine.
///
/// Owns all of its state; handlers run to completion and return the effects
/// the host must forward to the renderer and haptic sink, in order.
#[derive(Debug, Clone)]
pub struct FollowController {
    config: FollowConfig,
    mode: FollowMode,
    latest_location: Option<LngLat>,
    camera_center: Option<LngLat>,
    camera_zoom: f64,
    /// Set right before a controller-issued camera command; cleared by the
    /// matching `moveEnded`.
    programmatic_move: bool,
    /// The renderer has loaded and listens for camera commands. Until then
    /// targets are only recorded and get replayed by `renderer_ready`.
    renderer_ready: bool,
}

impl FollowController {
    pub fn new(config: FollowConfig) -> Self {
        let camera_zoom = config.initial_zoom;
        Self {
            config,
            mode: FollowMode::Following,
            latest_location: None,
            camera_center: None,
            camera_zoom,
            programmatic_move: false,
            renderer_ready: false,
        }
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    pub fn latest_location(&self) -> Option<LngLat> {
        self.latest_location
    }

    pub fn camera_zoom(&self) -> f64 {
        self.camera_zoom
    }

    pub fn is_programmatic_move_pending(&self) -> bool {
        self.programmatic_move
    }

    pub fn is_renderer_ready(&self) -> bool {
        self.renderer_ready
    }

    /// Camera focal point shown to the user.
    pub fn selected_location(&self) -> Option<LngLat> {
        match self.mode {
            FollowMode::Following => self.latest_location.or(self.camera_center),
            FollowMode::Manual => self.camera_center.or(self.latest_location),
        }
    }

    /// `(mode, selected)` view for presentation; heading and address are
    /// filled in by the session.
    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            mode: self.mode,
            selected: self.selected_location(),
            ..MapSnapshot::default()
        }
    }

    pub fn location_updated(&mut self, sample: LocationSample) -> Vec<ControllerEffect> {
        if !sample.is_valid() {
            log::warn!(
                "location_updated: dropping malformed sample lng={} lat={}",
                sample.longitude,
                sample.latitude
            );
            return Vec::new();
        }
        self.accept_location(sample.position())
    }

    /// Seeds a default location when the source never produced one.
    pub fn inject_fallback(&mut self, location: LngLat) -> Vec<ControllerEffect> {
        if self.latest_location.is_some() {
            return Vec::new();
        }
        if !location.is_valid() {
            log::warn!("inject_fallback: ignoring invalid fallback {location:?}");
            return Vec::new();
        }
        log::info!("inject_fallback: no fix yet, using {location:?}");
        self.accept_location(location)
    }

    /// The map finished loading (or reloaded). Pushes the zoom-handler state
    /// for the current mode and, while following, the pending recenter.
    pub fn renderer_ready(&mut self) -> Vec<ControllerEffect> {
        self.renderer_ready = true;
        // A fresh map never reports the end of a move issued to its predecessor.
        self.programmatic_move = false;

        let following = self.mode.is_following();
        let mut effects = vec![ControllerEffect::DefaultZoomHandling(!following)];
        if following {
            if let Some(location) = self.latest_location {
                effects.extend(self.recenter(location, self.camera_zoom));
            }
        }
        effects
    }

    pub fn user_drag_started(&mut self, is_multi_touch: bool) -> Vec<ControllerEffect> {
        if self.programmatic_move || is_multi_touch {
            return Vec::new();
        }
        self.enter_mode(FollowMode::Manual)
    }

    pub fn map_move_started(&mut self) -> Vec<ControllerEffect> {
        // Nothing to do on start; programmatic pairs are resolved on end.
        Vec::new()
    }

    pub fn map_move_ended(&mut self, center: LngLat, zoom: f64) -> Vec<ControllerEffect> {
        if zoom.is_finite() {
            self.camera_zoom = zoom;
        }
        if center.is_valid() {
            self.camera_center = Some(center);
        }
        if self.programmatic_move {
            self.programmatic_move = false;
            return Vec::new();
        }

        if self.mode != FollowMode::Manual || !center.is_valid() {
            return Vec::new();
        }
        let Some(location) = self.latest_location else {
            return Vec::new();
        };

        let distance = haversine_m(center, location);
        if distance > self.config.snap_radius_m {
            return Vec::new();
        }

        log::debug!("map_move_ended: snapped back to tracked location ({distance:.1} m)");
        let mut effects = self.enter_mode(FollowMode::Following);
        effects.push(ControllerEffect::Haptic(HapticCue::LightImpact));
        effects.extend(self.recenter(location, self.camera_zoom));
        effects
    }

    /// Wheel or pinch input while following: zoom around the tracked location
    /// instead of the pointer. Manual mode leaves zoom to the renderer.
    pub fn zoom_gesture(&mut self, gesture: ZoomGesture) -> Vec<ControllerEffect> {
        if self.mode != FollowMode::Following {
            return Vec::new();
        }
        let Some(center) = self.latest_location else {
            return Vec::new();
        };
        let Some(zoom) = gesture.resolve(self.camera_zoom, self.config.wheel_zoom_rate) else {
            return Vec::new();
        };
        let zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        if (zoom - self.camera_zoom).abs() < f64::EPSILON {
            return Vec::new();
        }

        self.camera_zoom = zoom;
        self.issue(CameraCommand {
            center,
            zoom,
            animated: false,
            duration_ms: 0,
        })
    }

    pub fn toggle_follow(&mut self) -> Vec<ControllerEffect> {
        let target = self.mode.toggled();
        let mut effects = self.enter_mode(target);
        effects.push(ControllerEffect::Haptic(HapticCue::SelectionChanged));
        if target.is_following() {
            if let Some(location) = self.latest_location {
                effects.extend(self.recenter(location, self.camera_zoom));
            }
        }
        effects
    }

    fn accept_location(&mut self, location: LngLat) -> Vec<ControllerEffect> {
        let first_fix = self.latest_location.is_none();
        self.latest_location = Some(location);
        if !self.mode.is_following() {
            return Vec::new();
        }
        let zoom = if first_fix {
            self.config.located_zoom
        } else {
            self.camera_zoom
        };
        self.recenter(location, zoom)
    }

    fn enter_mode(&mut self, mode: FollowMode) -> Vec<ControllerEffect> {
        if self.mode == mode {
            return Vec::new();
        }
        log::debug!("follow mode: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        if !self.renderer_ready {
            return Vec::new();
        }
        // Following pins the zoom center, so the renderer's own zoom handlers
        // must stay off until the user takes over again.
        vec![ControllerEffect::DefaultZoomHandling(!mode.is_following())]
    }

    fn recenter(&mut self, center: LngLat, zoom: f64) -> Vec<ControllerEffect> {
        self.camera_zoom = zoom;
        self.issue(CameraCommand {
            center,
            zoom,
            animated: true,
            duration_ms: self.config.recenter_duration_ms,
        })
    }

    fn issue(&mut self, command: CameraCommand) -> Vec<ControllerEffect> {
        if !self.renderer_ready {
            log::debug!("issue: renderer not ready, holding {command:?}");
            return Vec::new();
        }
        self.programmatic_move = true;
        vec![ControllerEffect::SetCamera(command)]
    }
}

impl Default for FollowController {
    fn default() -> Self {
        Self::new(FollowConfig::default())
    }
}
