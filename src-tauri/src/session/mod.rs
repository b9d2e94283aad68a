pub mod ports;
pub mod runner;

pub use ports::{HapticSink, MapRenderer, NoopHaptics};
pub use runner::{MapSession, MapSessionHandle, SessionClosed, SessionInput, SessionOptions};
