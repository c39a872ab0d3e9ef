//! Host-side driver for eSense earables.
//!
//! [`EsenseManager`] runs one BLE session: it scans for a device by name,
//! connects, discovers its GATT services and then reads, writes and streams
//! the device characteristics. Inbound frames are decoded by
//! [`infrastructure::bluetooth::protocol`] and handed to the registered
//! listeners.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::{
    AccLpf, AccRange, AccelerometerOffset, ConnectionIntervals, GyroLpf, GyroRange, SensorConfig,
    SensorSample, SessionState,
};
pub use error::{EsenseError, FrameError, Result};
pub use infrastructure::bluetooth::{
    ConnectionListener, EsenseManager, EventListener, SensorListener, SessionDriver,
    TokioScanTimer, Transport, TransportError, TransportEvent,
};
