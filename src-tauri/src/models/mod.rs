pub mod camera;
pub mod events;
pub mod geo;
