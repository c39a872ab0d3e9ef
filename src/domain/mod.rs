//! Domain types: sensor configuration, decoded device values and settings.

pub mod config;
pub mod models;
pub mod settings;

pub use config::{AccLpf, AccRange, GyroLpf, GyroRange, SensorConfig};
pub use models::{AccelerometerOffset, ConnectionIntervals, SensorSample, SessionState};
