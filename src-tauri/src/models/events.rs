//! Map/gesture events forwarded by the webview renderer.

use serde::{Deserialize, Serialize};

use crate::models::geo::LngLat;

/// One renderer event, as posted by the frontend's MapLibre listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapEvent {
    /// MapLibre `load`, sent again whenever the webview reloads the map.
    Ready,
    /// `dragstart`. Multi-touch drags are zoom gestures, not pans.
    DragStart {
        #[serde(rename = "multiTouch", default)]
        multi_touch: bool,
    },
    /// `movestart` for any camera change.
    MoveStart,
    /// `moveend` with the camera as the renderer left it.
    MoveEnd { center: LngLat, zoom: f64 },
    /// Mouse wheel; positive `deltaY` zooms out.
    Wheel {
        #[serde(rename = "deltaY")]
        delta_y: f64,
    },
    /// Two-finger pinch, measured against the distance at gesture start.
    Pinch {
        #[serde(rename = "startDistance")]
        start_distance: f64,
        #[serde(rename = "currentDistance")]
        current_distance: f64,
        #[serde(rename = "startZoom")]
        start_zoom: f64,
    },
}
