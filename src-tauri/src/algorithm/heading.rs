/// Converts a `deviceorientation` alpha reading into a compass heading in
/// `[0, 360)`. Missing or garbage readings point north.
pub fn heading_from_alpha(alpha: Option<f64>) -> f64 {
    match alpha {
        Some(value) if value.is_finite() => {
            let heading = value.rem_euclid(360.0);
            // Tiny negative readings round up to exactly 360.
            if heading >= 360.0 {
                0.0
            } else {
                heading
            }
        }
        _ => 0.0,
    }
}
