//! Controller-facing camera types and the state snapshot handed to the UI.

use serde::{Deserialize, Serialize};

use crate::models::geo::LngLat;

/// Who is driving the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FollowMode {
    /// Camera recenters on every location update.
    #[default]
    Following,
    /// Camera is under free user control.
    Manual,
}

impl FollowMode {
    pub fn is_following(self) -> bool {
        matches!(self, FollowMode::Following)
    }

    pub fn toggled(self) -> Self {
        match self {
            FollowMode::Following => FollowMode::Manual,
            FollowMode::Manual => FollowMode::Following,
        }
    }
}

/// `setCamera` request for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCommand {
    pub center: LngLat,
    pub zoom: f64,
    pub animated: bool,
    pub duration_ms: u64,
}

/// Haptic cue kinds; sinks on unsupported platforms drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HapticCue {
    LightImpact,
    SelectionChanged,
}

/// Side effect produced by a controller transition, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEffect {
    SetCamera(CameraCommand),
    /// Enable/disable the renderer's own wheel and pinch zoom handlers.
    DefaultZoomHandling(bool),
    Haptic(HapticCue),
}

/// What presentation code renders after every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub mode: FollowMode,
    pub selected: Option<LngLat>,
    /// Compass heading for the bearing marker, degrees in `[0, 360)`.
    pub heading_deg: f64,
    /// Reverse-geocoded address, or a localized placeholder on failure.
    pub address: Option<String>,
}
