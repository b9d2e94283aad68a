pub mod bridge;
pub mod map;
