//! BLE Transport Module
//!
//! The narrow contract between the session state machine and a BLE stack.
//!
//! Every request returns as soon as it has been handed to the stack. The
//! outcome comes back later as a [`TransportEvent`], delivered serially to
//! [`EsenseManager::handle_event`](super::service::EsenseManager::handle_event).

use thiserror::Error;
use uuid::Uuid;

/// Opaque reference to a remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralHandle(pub u64);

/// Opaque reference to a discovered GATT service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle(pub u64);

/// Opaque reference to a discovered GATT characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle(pub u64);

/// A service reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub handle: ServiceHandle,
}

/// A characteristic reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub handle: CharacteristicHandle,
}

/// Failure reported by the BLE stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Completions and unsolicited notifications from the BLE stack
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An advertisement matching the scan filter was received
    DeviceDiscovered {
        peripheral: PeripheralHandle,
        name: Option<String>,
    },
    Connected,
    ConnectFailed(String),
    Disconnected,
    ServicesDiscovered(Vec<DiscoveredService>),
    /// Service discovery could not complete
    DiscoveryFailed(String),
    CharacteristicsDiscovered {
        service: DiscoveredService,
        characteristics: Vec<DiscoveredCharacteristic>,
    },
    /// Read response or notification
    ValueUpdated { characteristic: Uuid, value: Vec<u8> },
    WriteCompleted {
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<TransportError>,
    },
    /// Posted by the scan timer after it won the scan gate
    ScanTimedOut { generation: u64 },
}

/// Fire-and-request access to a BLE central
pub trait Transport: Send {
    fn start_scan(&mut self, services: &[Uuid]) -> Result<(), TransportError>;

    fn stop_scan(&mut self) -> Result<(), TransportError>;

    fn connect(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError>;

    fn disconnect(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError>;

    fn discover_services(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError>;

    fn discover_characteristics(
        &mut self,
        peripheral: PeripheralHandle,
        service: ServiceHandle,
    ) -> Result<(), TransportError>;

    fn read_characteristic(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
    ) -> Result<(), TransportError>;

    fn write_characteristic(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;

    fn set_notify(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        enable: bool,
    ) -> Result<(), TransportError>;
}
