//! Zoom-level math for wheel and pinch input while the camera is pinned.

/// Raw zoom input from the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomGesture {
    Wheel {
        delta_y: f64,
    },
    Pinch {
        start_distance: f64,
        current_distance: f64,
        start_zoom: f64,
    },
}

impl ZoomGesture {
    /// New zoom level, or `None` when the input carries no usable delta.
    ///
    /// Wheel input is linear in `delta_y`; pinch input is logarithmic in the
    /// finger-distance ratio, so doubling the spread adds one zoom level.
    pub fn resolve(self, current_zoom: f64, wheel_zoom_rate: f64) -> Option<f64> {
        match self {
            ZoomGesture::Wheel { delta_y } => {
                if !delta_y.is_finite() || delta_y == 0.0 {
                    return None;
                }
                Some(current_zoom - delta_y * wheel_zoom_rate)
            }
            ZoomGesture::Pinch {
                start_distance,
                current_distance,
                start_zoom,
            } => {
                if !(start_distance.is_finite() && current_distance.is_finite())
                    || start_distance <= 0.0
                    || current_distance <= 0.0
                    || !start_zoom.is_finite()
                {
                    return None;
                }
                Some(start_zoom + (current_distance / start_distance).log2())
            }
        }
    }
}
