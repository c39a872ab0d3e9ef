use crate::infrastructure::bluetooth::transport::TransportError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned synchronously by session requests
///
/// A rejected request never reaches the transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EsenseError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("device is not connected")]
    NotConnected,

    #[error("characteristic {0} has not been discovered")]
    CharacteristicNotFound(Uuid),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Reasons an inbound frame is dropped by the codec
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("checksum mismatch at index {index}: expected {expected:#04x}, found {actual:#04x}")]
    ChecksumMismatch { index: usize, expected: u8, actual: u8 },

    #[error("frame too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, EsenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EsenseError::InvalidParameter("sampling rate 0".to_string());
        assert_eq!(err.to_string(), "invalid parameter: sampling rate 0");

        assert_eq!(EsenseError::NotConnected.to_string(), "device is not connected");

        let err = FrameError::ChecksumMismatch {
            index: 1,
            expected: 0x12,
            actual: 0x13,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch at index 1: expected 0x12, found 0x13"
        );

        let err = FrameError::Truncated { needed: 7, actual: 3 };
        assert_eq!(err.to_string(), "frame too short: need 7 bytes, got 3");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: EsenseError = TransportError::new("adapter powered off").into();
        assert_eq!(err.to_string(), "transport failure: adapter powered off");
    }
}
