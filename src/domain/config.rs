//! Sensor Configuration Model
//!
//! Typed representation of the IMU ranges and low pass filters of an eSense
//! device. Every enumeration is declared in the order the device firmware
//! uses on the wire, so the discriminant of a variant is its ordinal in the
//! configuration register.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accelerometer full scale range in ±g
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccRange {
    /// Wire-order table
    pub const ALL: [AccRange; 4] = [Self::G2, Self::G4, Self::G8, Self::G16];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Sensitivity factor in LSB/g
    pub fn sensitivity(self) -> f64 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }
}

impl fmt::Display for AccRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = match self {
            Self::G2 => 2,
            Self::G4 => 4,
            Self::G8 => 8,
            Self::G16 => 16,
        };
        write!(f, "±{}g", g)
    }
}

/// Gyroscope full scale range in ±deg/s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GyroRange {
    Deg250 = 0,
    Deg500 = 1,
    Deg1000 = 2,
    Deg2000 = 3,
}

impl GyroRange {
    /// Wire-order table
    pub const ALL: [GyroRange; 4] = [Self::Deg250, Self::Deg500, Self::Deg1000, Self::Deg2000];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Sensitivity factor in LSB/(deg/s)
    pub fn sensitivity(self) -> f64 {
        match self {
            Self::Deg250 => 131.0,
            Self::Deg500 => 65.5,
            Self::Deg1000 => 32.8,
            Self::Deg2000 => 16.4,
        }
    }
}

impl fmt::Display for GyroRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deg = match self {
            Self::Deg250 => 250,
            Self::Deg500 => 500,
            Self::Deg1000 => 1000,
            Self::Deg2000 => 2000,
        };
        write!(f, "±{}deg/s", deg)
    }
}

/// Accelerometer low pass filter. Every variant except `Disabled` is the
/// filter bandwidth in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccLpf {
    Bw460 = 0,
    Bw184 = 1,
    Bw92 = 2,
    Bw41 = 3,
    Bw20 = 4,
    Bw10 = 5,
    Bw5 = 6,
    Disabled = 7,
}

impl AccLpf {
    /// Wire-order table
    pub const ALL: [AccLpf; 8] = [
        Self::Bw460,
        Self::Bw184,
        Self::Bw92,
        Self::Bw41,
        Self::Bw20,
        Self::Bw10,
        Self::Bw5,
        Self::Disabled,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Bandwidth in Hz, `None` when the filter is disabled
    pub fn bandwidth_hz(self) -> Option<u16> {
        match self {
            Self::Bw460 => Some(460),
            Self::Bw184 => Some(184),
            Self::Bw92 => Some(92),
            Self::Bw41 => Some(41),
            Self::Bw20 => Some(20),
            Self::Bw10 => Some(10),
            Self::Bw5 => Some(5),
            Self::Disabled => None,
        }
    }
}

impl fmt::Display for AccLpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bandwidth_hz() {
            Some(hz) => write!(f, "{}Hz", hz),
            None => f.write_str("disabled"),
        }
    }
}

/// Gyroscope low pass filter. Every variant except `Disabled` is the filter
/// bandwidth in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GyroLpf {
    Bw250 = 0,
    Bw184 = 1,
    Bw92 = 2,
    Bw41 = 3,
    Bw20 = 4,
    Bw10 = 5,
    Bw5 = 6,
    Bw3600 = 7,
    Disabled = 8,
}

impl GyroLpf {
    /// Wire-order table
    pub const ALL: [GyroLpf; 9] = [
        Self::Bw250,
        Self::Bw184,
        Self::Bw92,
        Self::Bw41,
        Self::Bw20,
        Self::Bw10,
        Self::Bw5,
        Self::Bw3600,
        Self::Disabled,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Bandwidth in Hz, `None` when the filter is disabled
    pub fn bandwidth_hz(self) -> Option<u16> {
        match self {
            Self::Bw250 => Some(250),
            Self::Bw184 => Some(184),
            Self::Bw92 => Some(92),
            Self::Bw41 => Some(41),
            Self::Bw20 => Some(20),
            Self::Bw10 => Some(10),
            Self::Bw5 => Some(5),
            Self::Bw3600 => Some(3600),
            Self::Disabled => None,
        }
    }
}

impl fmt::Display for GyroLpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bandwidth_hz() {
            Some(hz) => write!(f, "{}Hz", hz),
            None => f.write_str("disabled"),
        }
    }
}

/// IMU configuration of an eSense device
///
/// The default is ±4g / ±1000deg/s with both low pass filters at 5Hz, which
/// matches the factory configuration of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorConfig {
    pub acc_range: AccRange,
    pub gyro_range: GyroRange,
    pub acc_lpf: AccLpf,
    pub gyro_lpf: GyroLpf,
}

impl SensorConfig {
    pub fn new(acc_range: AccRange, gyro_range: GyroRange, acc_lpf: AccLpf, gyro_lpf: GyroLpf) -> Self {
        Self {
            acc_range,
            gyro_range,
            acc_lpf,
            gyro_lpf,
        }
    }

    /// Accelerometer sensitivity factor (LSB/g) for the current range
    pub fn acc_sensitivity_factor(&self) -> f64 {
        self.acc_range.sensitivity()
    }

    /// Gyroscope sensitivity factor (LSB/(deg/s)) for the current range
    pub fn gyro_sensitivity_factor(&self) -> f64 {
        self.gyro_range.sensitivity()
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            acc_range: AccRange::G4,
            gyro_range: GyroRange::Deg1000,
            acc_lpf: AccLpf::Bw5,
            gyro_lpf: GyroLpf::Bw5,
        }
    }
}

impl fmt::Display for SensorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acc {} (lpf {}), gyro {} (lpf {})",
            self.acc_range, self.acc_lpf, self.gyro_range, self.gyro_lpf
        )
    }
}
