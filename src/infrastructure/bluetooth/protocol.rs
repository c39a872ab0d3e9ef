//! eSense Device Protocol
//!
//! GATT identifiers of the eSense earable and the codec translating between
//! raw characteristic values and typed domain values.
//!
//! Every frame exchanged with the device carries a one byte checksum at a
//! fixed index. The checksum is the sum of all bytes that follow that index,
//! modulo 256.
//!
//! ```text
//! command / read frames      sensor frames
//! [0] : command id           [0] : command id
//! [1] : checksum             [1] : packet index
//! [2] : payload length       [2] : checksum
//! [3..] : payload            [3] : payload length
//!                            [4..10]  : gyro X, Y, Z (i16 big-endian)
//!                            [10..16] : accel X, Y, Z (i16 big-endian)
//! ```

use crate::domain::config::{AccLpf, AccRange, GyroLpf, GyroRange, SensorConfig};
use crate::domain::models::{AccelerometerOffset, ConnectionIntervals, SensorSample};
use crate::error::{EsenseError, FrameError};
use tracing::warn;
use uuid::Uuid;

/// Sensor service advertised by the device (0xFF06)
pub const SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ff06_0000_1000_8000_00805f9b34fb);

/// Generic access service carrying the device name (0x1800)
pub const DEVICE_NAME_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);

/// Services used to filter advertisements while scanning
pub const SCAN_SERVICES: [Uuid; 2] = [DEVICE_NAME_SERVICE_UUID, SENSOR_SERVICE_UUID];

/// Command channel: sensor start/stop and advertisement/connection intervals
pub const CONFIG_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff07_0000_1000_8000_00805f9b34fb);

/// IMU sample notifications
pub const SENSOR_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff08_0000_1000_8000_00805f9b34fb);

/// Button state notifications
pub const BUTTON_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff09_0000_1000_8000_00805f9b34fb);

/// Battery voltage
pub const BATTERY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff0a_0000_1000_8000_00805f9b34fb);

/// Advertisement and connection intervals (read)
pub const ADV_CONN_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff0b_0000_1000_8000_00805f9b34fb);

/// Device name (write)
pub const NAME_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff0c_0000_1000_8000_00805f9b34fb);

/// Factory accelerometer offsets
pub const ACCEL_OFFSET_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff0d_0000_1000_8000_00805f9b34fb);

/// IMU range and low pass filter configuration
pub const SENSOR_CONFIG_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff0e_0000_1000_8000_00805f9b34fb);

/// Standard GATT device name (read)
pub const DEVICE_NAME_CHAR_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

/// Checksum position of commands and read responses
pub const COMMAND_CHECKSUM_INDEX: usize = 1;

/// Checksum position of streamed sensor frames
pub const SENSOR_CHECKSUM_INDEX: usize = 2;

/// Stop IMU sampling. The checksum (0x02) is already in place.
pub const SENSOR_STOP_COMMAND: [u8; 5] = [0x53, 0x02, 0x02, 0x00, 0x00];

pub const MIN_SAMPLING_RATE_HZ: u8 = 1;
pub const MAX_SAMPLING_RATE_HZ: u8 = 100;

pub const MAX_DEVICE_NAME_LEN: usize = 22;

/// Advertisement interval tick in milliseconds
pub const ADV_INTERVAL_UNIT_MS: f64 = 0.625;

/// Connection interval tick in milliseconds
pub const CONN_INTERVAL_UNIT_MS: f64 = 1.25;

pub const SENSOR_FRAME_LEN: usize = 16;
pub const CONFIG_FRAME_LEN: usize = 7;
pub const BUTTON_FRAME_LEN: usize = 4;
pub const BATTERY_FRAME_LEN: usize = 5;
pub const ACCEL_OFFSET_FRAME_LEN: usize = 15;
pub const INTERVAL_FRAME_LEN: usize = 11;

// ── Checksum ────────────────────────────────────────────────────────────────

/// Sum of every byte after `index`, modulo 256
pub fn checksum(bytes: &[u8], index: usize) -> u8 {
    bytes
        .iter()
        .skip(index + 1)
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// `true` if the byte at `index` matches the checksum of the bytes after it
pub fn verify_checksum(bytes: &[u8], index: usize) -> bool {
    bytes.get(index) == Some(&checksum(bytes, index))
}

/// Write the checksum of the bytes after `index` into `bytes[index]`
pub fn seal_checksum(bytes: &mut [u8], index: usize) {
    bytes[index] = checksum(bytes, index);
}

fn check_frame(bytes: &[u8], index: usize, needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }
    let expected = checksum(bytes, index);
    if bytes[index] != expected {
        return Err(FrameError::ChecksumMismatch {
            index,
            expected,
            actual: bytes[index],
        });
    }
    Ok(())
}

fn be_i16(bytes: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([bytes[at], bytes[at + 1]])
}

// ── Sensor configuration ────────────────────────────────────────────────────

/// Builder for the 7 byte sensor configuration frame
///
/// Every setter takes the frame by value and returns the updated frame, so
/// each bit-field can be checked in isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFrame([u8; CONFIG_FRAME_LEN]);

impl ConfigFrame {
    pub const TEMPLATE: [u8; CONFIG_FRAME_LEN] = [0x59, 0x00, 0x04, 0x06, 0x08, 0x08, 0x06];

    pub fn new() -> Self {
        Self(Self::TEMPLATE)
    }

    pub fn with_gyro_lpf(self, lpf: GyroLpf) -> Self {
        let mut data = self.0;
        if lpf == GyroLpf::Disabled {
            data[4] = (data[4] & 0xfc) | 0x1;
        } else {
            data[4] &= 0xfc;
            data[3] = (data[3] & 0xf8) | lpf.ordinal();
        }
        Self(data)
    }

    pub fn with_acc_lpf(self, lpf: AccLpf) -> Self {
        let mut data = self.0;
        if lpf == AccLpf::Disabled {
            data[6] = (data[6] & 0xf7) | (0x1 << 3);
        } else {
            data[6] &= 0xf7;
            data[6] = (data[6] & 0xf8) | lpf.ordinal();
        }
        Self(data)
    }

    pub fn with_gyro_range(self, range: GyroRange) -> Self {
        let mut data = self.0;
        data[4] = (data[4] & 0xe7) | (range.ordinal() << 3);
        Self(data)
    }

    pub fn with_acc_range(self, range: AccRange) -> Self {
        let mut data = self.0;
        data[5] = (data[5] & 0xe7) | (range.ordinal() << 3);
        Self(data)
    }

    /// Frame bytes with the checksum at index 1 filled in
    pub fn sealed(self) -> [u8; CONFIG_FRAME_LEN] {
        let mut data = self.0;
        seal_checksum(&mut data, COMMAND_CHECKSUM_INDEX);
        data
    }

    /// Frame bytes as built, checksum byte untouched
    pub fn into_bytes(self) -> [u8; CONFIG_FRAME_LEN] {
        self.0
    }
}

impl Default for ConfigFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&SensorConfig> for ConfigFrame {
    fn from(config: &SensorConfig) -> Self {
        ConfigFrame::new()
            .with_gyro_lpf(config.gyro_lpf)
            .with_acc_lpf(config.acc_lpf)
            .with_gyro_range(config.gyro_range)
            .with_acc_range(config.acc_range)
    }
}

/// Frame to write on the sensor configuration characteristic
pub fn encode_sensor_config(config: &SensorConfig) -> [u8; CONFIG_FRAME_LEN] {
    ConfigFrame::from(config).sealed()
}

fn parse_gyro_lpf(data: &[u8]) -> GyroLpf {
    let lpf_enabled = data[4] & 0x3;
    if lpf_enabled == 1 || lpf_enabled == 2 {
        GyroLpf::Disabled
    } else {
        GyroLpf::ALL[(data[3] & 0x7) as usize]
    }
}

fn parse_acc_lpf(data: &[u8]) -> AccLpf {
    if (data[6] & 0x8) >> 3 == 1 {
        AccLpf::Disabled
    } else {
        AccLpf::ALL[(data[6] & 0x7) as usize]
    }
}

fn parse_gyro_range(data: &[u8]) -> GyroRange {
    GyroRange::ALL[((data[4] & 0x18) >> 3) as usize]
}

fn parse_acc_range(data: &[u8]) -> AccRange {
    AccRange::ALL[((data[5] & 0x18) >> 3) as usize]
}

/// Decode the configuration register bytes read from the device
///
/// The checksum is not checked here; see [`decode_sensor_config_frame`].
pub fn decode_sensor_config(data: &[u8]) -> Result<SensorConfig, FrameError> {
    if data.len() < CONFIG_FRAME_LEN {
        return Err(FrameError::Truncated {
            needed: CONFIG_FRAME_LEN,
            actual: data.len(),
        });
    }
    Ok(SensorConfig {
        acc_range: parse_acc_range(data),
        gyro_range: parse_gyro_range(data),
        acc_lpf: parse_acc_lpf(data),
        gyro_lpf: parse_gyro_lpf(data),
    })
}

/// Verify and decode a sensor configuration read response
pub fn decode_sensor_config_frame(data: &[u8]) -> Result<SensorConfig, FrameError> {
    check_frame(data, COMMAND_CHECKSUM_INDEX, CONFIG_FRAME_LEN)?;
    decode_sensor_config(data)
}

// ── Inbound frames ──────────────────────────────────────────────────────────

/// Decode an IMU notification
///
/// `timestamp_millis` is the host clock at reception.
pub fn decode_sensor_sample(data: &[u8], timestamp_millis: i64) -> Result<SensorSample, FrameError> {
    check_frame(data, SENSOR_CHECKSUM_INDEX, SENSOR_FRAME_LEN)?;

    let mut accel = [0i16; 3];
    let mut gyro = [0i16; 3];
    for i in 0..3 {
        accel[i] = be_i16(data, i * 2 + 10);
        gyro[i] = be_i16(data, i * 2 + 4);
    }

    Ok(SensorSample {
        timestamp_millis,
        // The device counter is 8 bits wide; the offset is applied unconditionally.
        packet_index: data[1] as i32 + 256,
        accel,
        gyro,
    })
}

/// Decode a button notification. Returns `true` while the button is pressed.
pub fn decode_button(data: &[u8]) -> Result<bool, FrameError> {
    check_frame(data, COMMAND_CHECKSUM_INDEX, BUTTON_FRAME_LEN)?;
    Ok(data[3] == 1)
}

/// Decode a battery read response into volts
pub fn decode_battery_voltage(data: &[u8]) -> Result<f64, FrameError> {
    check_frame(data, COMMAND_CHECKSUM_INDEX, BATTERY_FRAME_LEN)?;
    Ok((data[3] as u32 * 256 + data[4] as u32) as f64 / 1000.0)
}

/// Decode the factory accelerometer offsets (±16g format, 1g = 2048)
pub fn decode_accelerometer_offset(data: &[u8]) -> Result<AccelerometerOffset, FrameError> {
    check_frame(data, COMMAND_CHECKSUM_INDEX, ACCEL_OFFSET_FRAME_LEN)?;
    Ok(AccelerometerOffset {
        x: be_i16(data, 9),
        y: be_i16(data, 11),
        z: be_i16(data, 13),
    })
}

/// Decode the advertisement and connection intervals into milliseconds
pub fn decode_connection_intervals(data: &[u8]) -> Result<ConnectionIntervals, FrameError> {
    check_frame(data, COMMAND_CHECKSUM_INDEX, INTERVAL_FRAME_LEN)?;
    let adv = |at| (be_i16(data, at) as f64 * ADV_INTERVAL_UNIT_MS) as i32;
    let conn = |at| (be_i16(data, at) as f64 * CONN_INTERVAL_UNIT_MS) as i32;
    Ok(ConnectionIntervals {
        adv_min_ms: adv(3),
        adv_max_ms: adv(5),
        conn_min_ms: conn(7),
        conn_max_ms: conn(9),
    })
}

/// Decode the GATT device name. Invalid UTF-8 yields `None`.
pub fn decode_device_name(data: &[u8]) -> Option<String> {
    String::from_utf8(data.to_vec()).ok()
}

// ── Outbound commands ───────────────────────────────────────────────────────

/// Command starting IMU sampling at `sampling_rate_hz` (1-100 Hz)
pub fn encode_sensor_start(sampling_rate_hz: u8) -> Result<[u8; 5], EsenseError> {
    if !(MIN_SAMPLING_RATE_HZ..=MAX_SAMPLING_RATE_HZ).contains(&sampling_rate_hz) {
        warn!(
            "Sampling rate should be set between {} and {}, but is set to {}",
            MIN_SAMPLING_RATE_HZ, MAX_SAMPLING_RATE_HZ, sampling_rate_hz
        );
        return Err(EsenseError::InvalidParameter(format!(
            "sampling rate {} Hz outside {}..={}",
            sampling_rate_hz, MIN_SAMPLING_RATE_HZ, MAX_SAMPLING_RATE_HZ
        )));
    }
    let mut bytes = [0x53, 0x00, 0x02, 0x01, sampling_rate_hz];
    seal_checksum(&mut bytes, COMMAND_CHECKSUM_INDEX);
    Ok(bytes)
}

/// Command writing new advertisement and connection intervals (milliseconds)
///
/// Advertisement: `100 <= adv_min <= adv_max <= 2000`.
/// Connection: `20 <= conn_min`, `conn_max <= 2000`, `conn_max - conn_min >= 20`.
pub fn encode_connection_intervals(
    adv_min_ms: i32,
    adv_max_ms: i32,
    conn_min_ms: i32,
    conn_max_ms: i32,
) -> Result<[u8; INTERVAL_FRAME_LEN], EsenseError> {
    if !(100 <= adv_min_ms && adv_min_ms <= adv_max_ms && adv_max_ms <= 2000) {
        if adv_min_ms < 100 {
            warn!("advMinInterval should be >= 100, but is set to {}", adv_min_ms);
        }
        if adv_max_ms > 2000 {
            warn!("advMaxInterval should be <= 2000, but is set to {}", adv_max_ms);
        }
        if adv_min_ms > adv_max_ms {
            warn!(
                "advMaxInterval should be >= advMinInterval, but they are set to {} and {}",
                adv_max_ms, adv_min_ms
            );
        }
        return Err(EsenseError::InvalidParameter(format!(
            "advertisement interval {}-{} ms",
            adv_min_ms, adv_max_ms
        )));
    }

    let conn_span = i64::from(conn_max_ms) - i64::from(conn_min_ms);
    if !(20 <= conn_min_ms && conn_max_ms <= 2000 && conn_span >= 20) {
        if conn_min_ms < 20 {
            warn!("connMinInterval should be >= 20, but is set to {}", conn_min_ms);
        }
        if conn_max_ms > 2000 {
            warn!("connMaxInterval should be <= 2000, but is set to {}", conn_max_ms);
        }
        if conn_span < 20 {
            warn!(
                "connMaxInterval - connMinInterval should be >= 20, but they are set to {} and {}",
                conn_max_ms, conn_min_ms
            );
        }
        return Err(EsenseError::InvalidParameter(format!(
            "connection interval {}-{} ms",
            conn_min_ms, conn_max_ms
        )));
    }

    let adv_ticks = |ms: i32| ((ms as f64 / ADV_INTERVAL_UNIT_MS).round() as i16).to_be_bytes();
    let conn_ticks = |ms: i32| ((ms as f64 / CONN_INTERVAL_UNIT_MS).round() as i16).to_be_bytes();

    let [adv_min_hi, adv_min_lo] = adv_ticks(adv_min_ms);
    let [adv_max_hi, adv_max_lo] = adv_ticks(adv_max_ms);
    let [conn_min_hi, conn_min_lo] = conn_ticks(conn_min_ms);
    let [conn_max_hi, conn_max_lo] = conn_ticks(conn_max_ms);

    let mut bytes = [
        0x57,
        0x00,
        0x08,
        adv_min_hi,
        adv_min_lo,
        adv_max_hi,
        adv_max_lo,
        conn_min_hi,
        conn_min_lo,
        conn_max_hi,
        conn_max_lo,
    ];
    seal_checksum(&mut bytes, COMMAND_CHECKSUM_INDEX);
    Ok(bytes)
}

/// Payload renaming the device (1 to 22 characters)
pub fn encode_device_name(name: &str) -> Result<Vec<u8>, EsenseError> {
    let length = name.chars().count();
    if !(1..=MAX_DEVICE_NAME_LEN).contains(&length) {
        warn!(
            "Device name should be 1 to {} characters long, but has {}",
            MAX_DEVICE_NAME_LEN, length
        );
        return Err(EsenseError::InvalidParameter(format!(
            "device name length {} outside 1..={}",
            length, MAX_DEVICE_NAME_LEN
        )));
    }
    Ok(name.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(mut bytes: Vec<u8>, index: usize) -> Vec<u8> {
        seal_checksum(&mut bytes, index);
        bytes
    }

    #[test]
    fn test_checksum_is_mod_256_sum() {
        assert_eq!(checksum(&[0x53, 0x00, 0x02, 0x01, 0x32], 1), 0x35);
        assert_eq!(checksum(&[0x00, 0x00, 0xff, 0x02], 1), 0x01);
        assert_eq!(checksum(&[0x00, 0x00], 1), 0x00);
        assert!(verify_checksum(&SENSOR_STOP_COMMAND, 1));
    }

    #[test]
    fn test_verify_short_frame() {
        assert!(!verify_checksum(&[], 1));
        assert!(!verify_checksum(&[0x53], 1));
    }

    #[test]
    fn test_single_bit_flip_is_rejected() {
        let frames = [
            (sealed(vec![0x53, 0x00, 0x02, 0x01, 0x64], 1), 1),
            (sealed(vec![0x57, 0x00, 0x08, 0x00, 0xa0, 0x0c, 0x80, 0x00, 0x10, 0x00, 0x20], 1), 1),
            (
                sealed(
                    vec![0x55, 0x07, 0x00, 0x0c, 0xff, 0xfe, 0x80, 0x00, 0x7f, 0xff, 0x00, 0x01, 0x12, 0x34, 0xab, 0xcd],
                    2,
                ),
                2,
            ),
        ];
        for (frame, index) in frames.iter() {
            assert!(verify_checksum(frame, *index));
            for pos in (index + 1)..frame.len() {
                for bit in 0..8 {
                    let mut corrupted = frame.clone();
                    corrupted[pos] ^= 1 << bit;
                    assert!(
                        !verify_checksum(&corrupted, *index),
                        "flip of bit {} at byte {} went unnoticed",
                        bit,
                        pos
                    );
                }
            }
        }
    }

    #[test]
    fn test_config_template_fields() {
        let config = SensorConfig::default();
        let frame = ConfigFrame::from(&config).into_bytes();
        // 5Hz gyro LPF -> ordinal 6, enabled
        assert_eq!(frame[3], 0x06);
        // gyro LPF enable bits cleared, 1000deg/s -> ordinal 2
        assert_eq!(frame[4], 2 << 3);
        // 4g -> ordinal 1
        assert_eq!(frame[5], 1 << 3);
        // 5Hz acc LPF -> ordinal 6, disable bit clear
        assert_eq!(frame[6], 0x06);
        assert_eq!(frame[1], 0x00);
    }

    #[test]
    fn test_config_setters_are_independent() {
        let base = ConfigFrame::new();
        let disabled = base.with_gyro_lpf(GyroLpf::Disabled).into_bytes();
        assert_eq!(disabled[4] & 0x3, 0x1);
        assert_eq!(disabled[3], ConfigFrame::TEMPLATE[3]);

        let acc_off = base.with_acc_lpf(AccLpf::Disabled).into_bytes();
        assert_eq!(acc_off[6] & 0x8, 0x8);
        assert_eq!(&acc_off[..6], &ConfigFrame::TEMPLATE[..6]);

        let ranged = base.with_acc_range(AccRange::G16).into_bytes();
        assert_eq!(ranged[5], 0x18);
        assert_eq!(ranged[4], ConfigFrame::TEMPLATE[4]);
    }

    #[test]
    fn test_config_round_trip_all_combinations() {
        let mut count = 0;
        for acc_range in AccRange::ALL {
            for gyro_range in GyroRange::ALL {
                for acc_lpf in AccLpf::ALL {
                    for gyro_lpf in GyroLpf::ALL {
                        let config = SensorConfig::new(acc_range, gyro_range, acc_lpf, gyro_lpf);
                        let bytes = encode_sensor_config(&config);
                        assert!(verify_checksum(&bytes, COMMAND_CHECKSUM_INDEX));
                        assert_eq!(decode_sensor_config_frame(&bytes), Ok(config));
                        count += 1;
                    }
                }
            }
        }
        assert_eq!(count, 4 * 4 * 8 * 9);
    }

    #[test]
    fn test_decode_config_from_device_bytes() {
        // Gyro LPF disable bits set to 2, acc LPF disable bit set
        let data = [0x59, 0x00, 0x04, 0x03, 0x1a, 0x10, 0x0d];
        let config = decode_sensor_config(&data).unwrap();
        assert_eq!(config.gyro_lpf, GyroLpf::Disabled);
        assert_eq!(config.gyro_range, GyroRange::Deg2000);
        assert_eq!(config.acc_range, AccRange::G8);
        assert_eq!(config.acc_lpf, AccLpf::Disabled);

        let data = [0x59, 0x00, 0x04, 0x07, 0x00, 0x00, 0x07];
        let config = decode_sensor_config(&data).unwrap();
        assert_eq!(config.gyro_lpf, GyroLpf::Bw3600);
        assert_eq!(config.acc_lpf, AccLpf::Disabled);
        assert_eq!(config.gyro_range, GyroRange::Deg250);
        assert_eq!(config.acc_range, AccRange::G2);
    }

    #[test]
    fn test_decode_config_rejects_short_and_corrupt_frames() {
        assert_eq!(
            decode_sensor_config(&[0x59, 0x00, 0x04]),
            Err(FrameError::Truncated { needed: 7, actual: 3 })
        );
        let mut bytes = encode_sensor_config(&SensorConfig::default());
        bytes[5] ^= 0x08;
        assert!(matches!(
            decode_sensor_config_frame(&bytes),
            Err(FrameError::ChecksumMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_decode_sensor_sample() {
        let frame = sealed(
            vec![0x55, 5, 0, 0x0c, 0x00, 0x04, 0x00, 0x05, 0x00, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03],
            SENSOR_CHECKSUM_INDEX,
        );
        let sample = decode_sensor_sample(&frame, 1_565_000_000_000).unwrap();
        assert_eq!(sample.accel, [1, 2, 3]);
        assert_eq!(sample.gyro, [4, 5, 6]);
        assert_eq!(sample.packet_index, 261);
        assert_eq!(sample.timestamp_millis, 1_565_000_000_000);
    }

    #[test]
    fn test_decode_sensor_sample_negative_values() {
        let frame = sealed(
            vec![0x55, 0xff, 0, 0x0c, 0xff, 0xff, 0x80, 0x00, 0x01, 0x02, 0xff, 0xfe, 0x7f, 0xff, 0x00, 0x00],
            SENSOR_CHECKSUM_INDEX,
        );
        let sample = decode_sensor_sample(&frame, 0).unwrap();
        assert_eq!(sample.gyro, [-1, i16::MIN, 0x0102]);
        assert_eq!(sample.accel, [-2, i16::MAX, 0]);
        assert_eq!(sample.packet_index, 511);
    }

    #[test]
    fn test_decode_sensor_sample_bad_checksum() {
        let mut frame = sealed(vec![0x55, 1, 0, 0x0c, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9], 2);
        frame[15] = 8;
        assert!(decode_sensor_sample(&frame, 0).is_err());
        assert!(matches!(
            decode_sensor_sample(&frame[..10], 0),
            Err(FrameError::Truncated { needed: 16, actual: 10 })
        ));
    }

    #[test]
    fn test_decode_button() {
        assert_eq!(decode_button(&sealed(vec![0x42, 0, 0x02, 0x01], 1)), Ok(true));
        assert_eq!(decode_button(&sealed(vec![0x42, 0, 0x02, 0x00], 1)), Ok(false));
        assert!(decode_button(&[0x42, 0x00, 0x02, 0x01]).is_err());
    }

    #[test]
    fn test_decode_battery() {
        // 0x0f 0xa0 = 4000 mV
        let frame = sealed(vec![0x42, 0, 0x04, 0x0f, 0xa0], 1);
        assert_eq!(decode_battery_voltage(&frame), Ok(4.0));
    }

    #[test]
    fn test_decode_accelerometer_offset() {
        let frame = sealed(
            vec![0x00, 0, 0x0c, 0, 0, 0, 0, 0, 0, 0x08, 0x00, 0xf8, 0x00, 0xff, 0xff],
            1,
        );
        let offset = decode_accelerometer_offset(&frame).unwrap();
        assert_eq!(offset, AccelerometerOffset { x: 2048, y: -2048, z: -1 });
    }

    #[test]
    fn test_decode_connection_intervals() {
        let frame = sealed(
            vec![0x57, 0, 0x08, 0x00, 0xa0, 0x0c, 0x80, 0x00, 0x10, 0x00, 0x21],
            1,
        );
        let intervals = decode_connection_intervals(&frame).unwrap();
        assert_eq!(intervals.adv_min_ms, 100);
        assert_eq!(intervals.adv_max_ms, 2000);
        assert_eq!(intervals.conn_min_ms, 20);
        // 33 ticks * 1.25 = 41.25, truncated
        assert_eq!(intervals.conn_max_ms, 41);
    }

    #[test]
    fn test_encode_sensor_start() {
        assert!(encode_sensor_start(0).is_err());
        assert!(encode_sensor_start(101).is_err());
        assert_eq!(encode_sensor_start(1).unwrap(), [0x53, 0x04, 0x02, 0x01, 0x01]);
        let bytes = encode_sensor_start(100).unwrap();
        assert_eq!(bytes, [0x53, 0x67, 0x02, 0x01, 100]);
        assert!(verify_checksum(&bytes, 1));
    }

    #[test]
    fn test_encode_connection_intervals_validation() {
        assert!(matches!(
            encode_connection_intervals(99, 200, 20, 50),
            Err(EsenseError::InvalidParameter(_))
        ));
        assert!(encode_connection_intervals(300, 200, 20, 50).is_err());
        assert!(encode_connection_intervals(100, 2001, 20, 50).is_err());
        assert!(encode_connection_intervals(100, 200, 19, 50).is_err());
        assert!(encode_connection_intervals(100, 200, 20, 2001).is_err());
        assert!(encode_connection_intervals(100, 200, 40, 59).is_err());
        assert!(encode_connection_intervals(100, 100, 40, 60).is_ok());
    }

    #[test]
    fn test_encode_connection_intervals_extreme_values() {
        for (conn_min, conn_max) in [
            (20, i32::MIN),
            (-1, i32::MAX),
            (i32::MAX, i32::MIN),
            (i32::MIN, 2000),
        ] {
            assert!(
                matches!(
                    encode_connection_intervals(100, 200, conn_min, conn_max),
                    Err(EsenseError::InvalidParameter(_))
                ),
                "{} / {}",
                conn_min,
                conn_max
            );
        }
        assert!(encode_connection_intervals(i32::MIN, i32::MAX, 20, 40).is_err());
    }

    #[test]
    fn test_encode_connection_intervals_ticks() {
        let bytes = encode_connection_intervals(100, 2000, 20, 40).unwrap();
        assert_eq!(&bytes[..1], &[0x57]);
        assert_eq!(bytes[2], 0x08);
        assert_eq!(i16::from_be_bytes([bytes[3], bytes[4]]), 160);
        assert_eq!(i16::from_be_bytes([bytes[5], bytes[6]]), 3200);
        assert_eq!(i16::from_be_bytes([bytes[7], bytes[8]]), 16);
        assert_eq!(i16::from_be_bytes([bytes[9], bytes[10]]), 32);
        assert!(verify_checksum(&bytes, 1));

        let intervals = decode_connection_intervals(&bytes).unwrap();
        assert_eq!(
            intervals,
            ConnectionIntervals {
                adv_min_ms: 100,
                adv_max_ms: 2000,
                conn_min_ms: 20,
                conn_max_ms: 40,
            }
        );
    }

    #[test]
    fn test_device_name() {
        assert!(encode_device_name("").is_err());
        assert!(encode_device_name("eSense-0063-with-a-long-name").is_err());
        assert_eq!(encode_device_name("eSense-0420").unwrap(), b"eSense-0420".to_vec());
        assert!(encode_device_name(&"é".repeat(22)).is_ok());

        assert_eq!(decode_device_name(b"eSense-0063"), Some("eSense-0063".to_string()));
        assert_eq!(decode_device_name(&[0xff, 0xfe]), None);
    }
}
