//! Bluetooth Module
//!
//! Drives an eSense earable over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     EsenseManager                        │
//! │   (session state machine - public API for callers)      │
//! └──────┬──────────────┬──────────────┬───────────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  Scanner   │ │ Transport  │ │  Protocol  │
//! │            │ │            │ │            │
//! │ - scan     │ │ - GATT     │ │ - UUIDs    │
//! │   gate     │ │   requests │ │ - commands │
//! │ - timeout  │ │ - events   │ │ - parsing  │
//! └────────────┘ └─────┬──────┘ └────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//!   BtleplugTransport       RecordingTransport
//!   (feature "ble")         (tests)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - GATT identifiers, checksums, frame encoding and decoding
//! - [`transport`] - The transport trait, handles and events
//! - [`listener`] - Callback interfaces
//! - [`scanner`] - Scan gate and timer trait
//! - [`service`] - Session state machine
//! - [`runtime`] - Tokio scan timer and event pump
//! - [`mock`] - Test doubles
//! - `connection` - btleplug transport (feature `ble`)

#[cfg(feature = "ble")]
pub mod connection;
pub mod listener;
pub mod mock;
pub mod protocol;
pub mod runtime;
pub mod scanner;
pub mod service;
pub mod transport;

pub use listener::{ConnectionListener, EventListener, SensorListener};
pub use runtime::{SessionDriver, TokioScanTimer};
pub use service::EsenseManager;
pub use transport::{Transport, TransportError, TransportEvent};

#[cfg(feature = "ble")]
pub use connection::BtleplugTransport;
