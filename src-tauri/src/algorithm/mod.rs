pub mod distance;
pub mod follow_controller;
pub mod heading;
pub mod zoom_gesture;
