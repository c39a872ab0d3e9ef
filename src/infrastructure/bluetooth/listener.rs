//! Callback interfaces registered on an [`EsenseManager`](super::service::EsenseManager).
//!
//! Callbacks run synchronously inside `handle_event`, on whichever task
//! drives the session.

use crate::domain::config::SensorConfig;
use crate::domain::models::{AccelerometerOffset, ConnectionIntervals, SensorSample};

/// Scan and connection lifecycle
pub trait ConnectionListener: Send {
    /// The target device was found before the scan timed out
    fn on_device_found(&mut self);

    /// The scan timed out without finding the target device
    fn on_device_not_found(&mut self);

    fn on_connected(&mut self);

    fn on_disconnected(&mut self);
}

/// Results of characteristic reads and button notifications
pub trait EventListener: Send {
    /// Battery voltage in volts
    fn on_battery_read(&mut self, _voltage: f64) {}

    fn on_button_event_changed(&mut self, _pressed: bool) {}

    fn on_advertisement_and_connection_interval_read(&mut self, _intervals: ConnectionIntervals) {}

    fn on_device_name_read(&mut self, _name: &str) {}

    fn on_sensor_config_read(&mut self, _config: SensorConfig) {}

    fn on_accelerometer_offset_read(&mut self, _offset: AccelerometerOffset) {}
}

/// IMU sample stream
pub trait SensorListener: Send {
    fn on_sensor_changed(&mut self, sample: SensorSample);
}
