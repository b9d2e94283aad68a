//! Collaborators the session drives: the map renderer and the haptic engine.

use crate::models::camera::{CameraCommand, HapticCue};

/// Camera side of the map renderer.
///
/// Camera center and zoom flow back through `moveEnded` events rather than
/// synchronous queries, since the renderer lives in another process.
pub trait MapRenderer: Send {
    fn set_camera(&mut self, command: CameraCommand);

    /// Toggles the renderer's own wheel/pinch zoom handlers.
    fn set_default_zoom_handling(&mut self, enabled: bool);
}

/// Fire-and-forget haptic cues.
pub trait HapticSink: Send {
    fn light_impact(&self);
    fn selection_changed(&self);

    fn cue(&self, cue: HapticCue) {
        match cue {
            HapticCue::LightImpact => self.light_impact(),
            HapticCue::SelectionChanged => self.selection_changed(),
        }
    }
}

/// For platforms without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl HapticSink for NoopHaptics {
    fn light_impact(&self) {}
    fn selection_changed(&self) {}
}
