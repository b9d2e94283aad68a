//! Webview-backed collaborators: camera commands, zoom-handler toggles and
//! haptic cues travel to the frontend as Tauri events.
//!
//! Frontend contract:
//! - invoke `map_event` with `{ "type": "ready" }` from the MapLibre `load`
//!   handler. Camera commands and zoom-handler state are held until then and
//!   replayed on every `ready`.
//! - forward `dragstart` (`multiTouch`), `movestart`, `moveend` (`center`,
//!   `zoom`), `wheel` (`deltaY`) and pinch (`startDistance`,
//!   `currentDistance`, `startZoom`) as `map_event`.
//! - listen for `camera-command` (`flyTo`/`jumpTo`), `zoom-handling` (enable
//!   or disable `scrollZoom` and `touchZoomRotate`), `haptic` and
//!   `map-snapshot`.

use tauri::{AppHandle, Emitter};

use crate::models::camera::{CameraCommand, HapticCue};
use crate::session::{HapticSink, MapRenderer};

pub const CAMERA_COMMAND_EVENT: &str = "camera-command";
pub const ZOOM_HANDLING_EVENT: &str = "zoom-handling";
pub const HAPTIC_EVENT: &str = "haptic";
pub const SNAPSHOT_EVENT: &str = "map-snapshot";

pub struct WebviewMapRenderer {
    app: AppHandle,
}

impl WebviewMapRenderer {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl MapRenderer for WebviewMapRenderer {
    fn set_camera(&mut self, command: CameraCommand) {
        if let Err(err) = self.app.emit(CAMERA_COMMAND_EVENT, command) {
            log::warn!("set_camera: failed to emit camera command: {err}");
        }
    }

    fn set_default_zoom_handling(&mut self, enabled: bool) {
        if let Err(err) = self.app.emit(ZOOM_HANDLING_EVENT, enabled) {
            log::warn!("set_default_zoom_handling: failed to emit: {err}");
        }
    }
}

/// Forwards cues to the frontend haptics plugin. A frontend without the
/// plugin simply has no listener.
pub struct WebviewHaptics {
    app: AppHandle,
}

impl WebviewHaptics {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn emit(&self, cue: HapticCue) {
        if let Err(err) = self.app.emit(HAPTIC_EVENT, cue) {
            log::debug!("haptics: failed to emit {cue:?}: {err}");
        }
    }
}

impl HapticSink for WebviewHaptics {
    fn light_impact(&self) {
        self.emit(HapticCue::LightImpact);
    }

    fn selection_changed(&self) {
        self.emit(HapticCue::SelectionChanged);
    }
}
