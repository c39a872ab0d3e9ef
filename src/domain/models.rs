use crate::domain::config::SensorConfig;
use std::fmt;

/// Factory accelerometer offsets use the ±16g format in which 1g = 2048 LSB
pub const ACCEL_OFFSET_LSB_PER_G: f64 = 2048.0;

/// One IMU reading received on the sensor characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSample {
    /// Host timestamp (Unix milliseconds) taken when the frame was decoded
    pub timestamp_millis: i64,
    /// Device sequence counter
    pub packet_index: i32,
    /// Raw accelerometer ADC values on X, Y and Z
    pub accel: [i16; 3],
    /// Raw gyroscope ADC values on X, Y and Z
    pub gyro: [i16; 3],
}

impl SensorSample {
    /// Acceleration in g on X, Y and Z for the given configuration
    pub fn convert_acc_to_g(&self, config: &SensorConfig) -> [f64; 3] {
        let factor = config.acc_sensitivity_factor();
        self.accel.map(|v| v as f64 / factor)
    }

    /// Rotational speed in deg/s on X, Y and Z for the given configuration
    pub fn convert_gyro_to_deg_per_second(&self, config: &SensorConfig) -> [f64; 3] {
        let factor = config.gyro_sensitivity_factor();
        self.gyro.map(|v| v as f64 / factor)
    }
}

/// Raw factory accelerometer offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelerometerOffset {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccelerometerOffset {
    pub fn as_g(&self) -> [f64; 3] {
        [self.x, self.y, self.z].map(|v| v as f64 / ACCEL_OFFSET_LSB_PER_G)
    }
}

/// Advertisement and connection intervals in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionIntervals {
    pub adv_min_ms: i32,
    pub adv_max_ms: i32,
    pub conn_min_ms: i32,
    pub conn_max_ms: i32,
}

impl fmt::Display for ConnectionIntervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "advertisement {}-{} ms, connection {}-{} ms",
            self.adv_min_ms, self.adv_max_ms, self.conn_min_ms, self.conn_max_ms
        )
    }
}

/// Lifecycle of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    Ready,
    Disconnected,
}

impl SessionState {
    /// The BLE link is up (services may still be under discovery)
    pub fn is_connected(self) -> bool {
        matches!(self, Self::DiscoveringServices | Self::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{AccLpf, AccRange, GyroLpf, GyroRange};

    #[test]
    fn test_convert_to_physical_units() {
        let sample = SensorSample {
            timestamp_millis: 0,
            packet_index: 256,
            accel: [8192, -4096, 0],
            gyro: [328, -164, 0],
        };
        let config = SensorConfig::default();
        assert_eq!(sample.convert_acc_to_g(&config), [1.0, -0.5, 0.0]);

        let gyro = sample.convert_gyro_to_deg_per_second(&config);
        assert!((gyro[0] - 10.0).abs() < 1e-9);
        assert!((gyro[1] + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_conversion_follows_config_changes() {
        let sample = SensorSample {
            timestamp_millis: 0,
            packet_index: 256,
            accel: [2048, 0, 0],
            gyro: [131, 0, 0],
        };
        let wide = SensorConfig::new(AccRange::G16, GyroRange::Deg250, AccLpf::Bw5, GyroLpf::Bw5);
        assert_eq!(sample.convert_acc_to_g(&wide)[0], 1.0);
        assert_eq!(sample.convert_gyro_to_deg_per_second(&wide)[0], 1.0);

        let narrow = SensorConfig::new(AccRange::G2, GyroRange::Deg250, AccLpf::Bw5, GyroLpf::Bw5);
        assert_eq!(sample.convert_acc_to_g(&narrow)[0], 0.125);
    }

    #[test]
    fn test_offset_as_g() {
        let offset = AccelerometerOffset {
            x: 2048,
            y: -1024,
            z: 0,
        };
        assert_eq!(offset.as_g(), [1.0, -0.5, 0.0]);
    }

    #[test]
    fn test_session_state_connected() {
        assert!(!SessionState::Idle.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(SessionState::DiscoveringServices.is_connected());
        assert!(SessionState::Ready.is_connected());
        assert!(!SessionState::Disconnected.is_connected());
    }
}
