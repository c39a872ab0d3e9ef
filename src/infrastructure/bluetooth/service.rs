//! eSense Session Module
//!
//! [`EsenseManager`] owns one device session. It turns public requests into
//! transport calls and turns [`TransportEvent`]s back into state transitions
//! and listener callbacks.
//!
//! ```text
//! Idle ──connect──▶ Scanning ──found──▶ Connecting ──connected──▶ DiscoveringServices
//!  ▲                   │                    │                              │
//!  └────── timeout ────┘◀── connect failed ─┘                 characteristics discovered
//!                                                                          ▼
//!                          Disconnected ◀──────── disconnected ──────── Ready
//! ```
//!
//! A discovery that cannot produce the sensor service ends the link and
//! lands in `Disconnected` as well.

use crate::domain::config::SensorConfig;
use crate::domain::models::SessionState;
use crate::error::{EsenseError, FrameError, Result};
use crate::infrastructure::bluetooth::listener::{ConnectionListener, EventListener, SensorListener};
use crate::infrastructure::bluetooth::protocol::{self, *};
use crate::infrastructure::bluetooth::scanner::{ScanGate, ScanOutcome, ScanTimer};
use crate::infrastructure::bluetooth::transport::{
    CharacteristicHandle, DiscoveredCharacteristic, DiscoveredService, PeripheralHandle,
    ServiceHandle, Transport, TransportError, TransportEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Invoked once, when the session first becomes ready
pub type ReadyHandler<T> = Box<dyn FnOnce(&mut EsenseManager<T>) + Send>;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Session with a single eSense device
pub struct EsenseManager<T: Transport> {
    device_name: String,
    transport: T,
    timer: Box<dyn ScanTimer>,
    state: SessionState,
    peripheral: Option<PeripheralHandle>,
    characteristics: HashMap<Uuid, CharacteristicHandle>,
    pending_services: HashSet<ServiceHandle>,
    sensor_service_seen: bool,
    scan_gate: Option<Arc<ScanGate>>,
    next_generation: u64,
    connection_listener: Option<Box<dyn ConnectionListener>>,
    event_listener: Option<Box<dyn EventListener>>,
    sensor_listener: Option<Box<dyn SensorListener>>,
    ready_handler: Option<ReadyHandler<T>>,
}

impl<T: Transport> EsenseManager<T> {
    /// Create a session looking for the device advertising `device_name`
    pub fn new(device_name: impl Into<String>, transport: T, timer: Box<dyn ScanTimer>) -> Self {
        Self {
            device_name: device_name.into(),
            transport,
            timer,
            state: SessionState::Idle,
            peripheral: None,
            characteristics: HashMap::new(),
            pending_services: HashSet::new(),
            sensor_service_seen: false,
            scan_gate: None,
            next_generation: 0,
            connection_listener: None,
            event_listener: None,
            sensor_listener: None,
            ready_handler: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Name the next scan will look for
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Listeners ───────────────────────────────────────────────────────────

    pub fn set_connection_listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.connection_listener = Some(listener);
    }

    pub fn set_device_ready_handler(&mut self, handler: ReadyHandler<T>) {
        self.ready_handler = Some(handler);
    }

    pub fn remove_device_ready_handler(&mut self) {
        self.ready_handler = None;
    }

    /// Register the sample listener and start IMU sampling at `sampling_rate_hz`
    pub fn register_sensor_listener(
        &mut self,
        listener: Box<dyn SensorListener>,
        sampling_rate_hz: u8,
    ) -> Result<()> {
        let command = protocol::encode_sensor_start(sampling_rate_hz)?;
        let peripheral = self.require_ready()?;
        let config = self.characteristic(CONFIG_CHAR_UUID)?;
        let sensor = self.characteristic(SENSOR_CHAR_UUID)?;

        self.transport
            .write_characteristic(peripheral, config, &command, true)?;
        self.sensor_listener = Some(listener);
        self.transport.set_notify(peripheral, sensor, true)?;
        info!("Sensor sampling started at {} Hz", sampling_rate_hz);
        Ok(())
    }

    /// Drop the sample listener and stop IMU sampling
    ///
    /// The listener is removed even when the device is no longer ready.
    pub fn unregister_sensor_listener(&mut self) -> Result<()> {
        self.sensor_listener = None;
        let peripheral = self.require_ready()?;
        let config = self.characteristic(CONFIG_CHAR_UUID)?;
        let sensor = self.characteristic(SENSOR_CHAR_UUID)?;

        self.transport
            .write_characteristic(peripheral, config, &SENSOR_STOP_COMMAND, true)?;
        self.transport.set_notify(peripheral, sensor, false)?;
        info!("Sensor sampling stopped");
        Ok(())
    }

    /// Register the event listener and enable button notifications
    pub fn register_event_listener(&mut self, listener: Box<dyn EventListener>) -> Result<()> {
        let peripheral = self.require_ready()?;
        let button = self.characteristic(BUTTON_CHAR_UUID)?;
        self.event_listener = Some(listener);
        self.transport.set_notify(peripheral, button, true)?;
        Ok(())
    }

    /// Drop the event listener and disable button notifications
    ///
    /// The listener is removed even when the device is no longer ready.
    pub fn unregister_event_listener(&mut self) -> Result<()> {
        self.event_listener = None;
        let peripheral = self.require_ready()?;
        let button = self.characteristic(BUTTON_CHAR_UUID)?;
        self.transport.set_notify(peripheral, button, false)?;
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Scan for the target device and connect to it once found
    ///
    /// The outcome is reported through the connection listener. A call made
    /// while a scan or a connection is already in progress is ignored.
    pub fn connect(&mut self, timeout: Duration) -> Result<()> {
        if self.scan_gate.is_some() {
            warn!("A device scan is already running, ignoring connect request");
            return Ok(());
        }
        match self.state {
            SessionState::Idle | SessionState::Disconnected => {}
            state => {
                warn!("Connect requested while {:?}, ignoring", state);
                return Ok(());
            }
        }

        info!("Scanning for {} (timeout {:?})", self.device_name, timeout);
        self.transport.start_scan(&SCAN_SERVICES)?;

        let gate = Arc::new(ScanGate::new(self.next_generation));
        self.next_generation += 1;
        self.timer.arm(timeout, gate.clone());
        self.scan_gate = Some(gate);
        self.state = SessionState::Scanning;
        Ok(())
    }

    /// Ask the transport to drop the link
    ///
    /// `on_disconnected` fires once the transport confirms.
    pub fn disconnect(&mut self) -> Result<()> {
        let peripheral = match self.peripheral {
            Some(peripheral) if self.state.is_connected() => peripheral,
            _ => return Err(EsenseError::NotConnected),
        };
        info!("Disconnecting from {}", self.device_name);
        self.transport.disconnect(peripheral)?;
        Ok(())
    }

    // ── Device requests ─────────────────────────────────────────────────────

    /// Request the device name; answered by `on_device_name_read`
    pub fn get_device_name(&mut self) -> Result<()> {
        self.read(DEVICE_NAME_CHAR_UUID)
    }

    /// Rename the device (1 to 22 characters)
    ///
    /// Once the write is acknowledged, later scans look for the new name.
    pub fn set_device_name(&mut self, name: &str) -> Result<()> {
        let payload = protocol::encode_device_name(name)?;
        self.write(NAME_WRITE_CHAR_UUID, &payload)
    }

    /// Request the factory accelerometer offsets; answered by `on_accelerometer_offset_read`
    pub fn get_accelerometer_offset(&mut self) -> Result<()> {
        self.read(ACCEL_OFFSET_CHAR_UUID)
    }

    /// Request the sensor configuration; answered by `on_sensor_config_read`
    pub fn get_sensor_config(&mut self) -> Result<()> {
        self.read(SENSOR_CONFIG_CHAR_UUID)
    }

    pub fn set_sensor_config(&mut self, config: &SensorConfig) -> Result<()> {
        let frame = protocol::encode_sensor_config(config);
        self.write(SENSOR_CONFIG_CHAR_UUID, &frame)?;
        info!("Sensor configuration written: {}", config);
        Ok(())
    }

    /// Request the intervals; answered by `on_advertisement_and_connection_interval_read`
    pub fn get_advertisement_and_connection_interval(&mut self) -> Result<()> {
        self.read(ADV_CONN_CHAR_UUID)
    }

    /// Write new advertisement and connection intervals in milliseconds
    pub fn set_advertisement_and_connection_interval(
        &mut self,
        adv_min_ms: i32,
        adv_max_ms: i32,
        conn_min_ms: i32,
        conn_max_ms: i32,
    ) -> Result<()> {
        let frame =
            protocol::encode_connection_intervals(adv_min_ms, adv_max_ms, conn_min_ms, conn_max_ms)?;
        self.write(CONFIG_CHAR_UUID, &frame)
    }

    /// Request the battery voltage; answered by `on_battery_read`
    pub fn get_battery_voltage(&mut self) -> Result<()> {
        self.read(BATTERY_CHAR_UUID)
    }

    fn require_ready(&self) -> Result<PeripheralHandle> {
        match (self.state, self.peripheral) {
            (SessionState::Ready, Some(peripheral)) => Ok(peripheral),
            _ => {
                debug!("Request rejected in state {:?}", self.state);
                Err(EsenseError::NotConnected)
            }
        }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<CharacteristicHandle> {
        self.characteristics
            .get(&uuid)
            .copied()
            .ok_or(EsenseError::CharacteristicNotFound(uuid))
    }

    fn read(&mut self, uuid: Uuid) -> Result<()> {
        let peripheral = self.require_ready()?;
        let characteristic = self.characteristic(uuid)?;
        self.transport.read_characteristic(peripheral, characteristic)?;
        Ok(())
    }

    fn write(&mut self, uuid: Uuid, value: &[u8]) -> Result<()> {
        let peripheral = self.require_ready()?;
        let characteristic = self.characteristic(uuid)?;
        trace!("Writing {:02x?} to {}", value, uuid);
        self.transport
            .write_characteristic(peripheral, characteristic, value, true)?;
        Ok(())
    }

    // ── Transport events ────────────────────────────────────────────────────

    /// Apply one transport event. Events must be delivered serially.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceDiscovered { peripheral, name } => {
                self.on_device_discovered(peripheral, name)
            }
            TransportEvent::ScanTimedOut { generation } => self.on_scan_timed_out(generation),
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::ConnectFailed(reason) => self.on_connect_failed(&reason),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::ServicesDiscovered(services) => self.on_services_discovered(services),
            TransportEvent::DiscoveryFailed(reason) => {
                if self.state == SessionState::DiscoveringServices {
                    self.fail_discovery(&reason);
                } else {
                    debug!("Discovery failure ignored in state {:?}: {}", self.state, reason);
                }
            }
            TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics,
            } => self.on_characteristics_discovered(service, characteristics),
            TransportEvent::ValueUpdated {
                characteristic,
                value,
            } => self.on_value_updated(characteristic, &value),
            TransportEvent::WriteCompleted {
                characteristic,
                value,
                error,
            } => self.on_write_completed(characteristic, &value, error),
        }
    }

    fn on_device_discovered(&mut self, peripheral: PeripheralHandle, name: Option<String>) {
        if self.state != SessionState::Scanning || name.as_deref() != Some(self.device_name.as_str()) {
            trace!("Ignoring advertisement from {:?}", name);
            return;
        }
        let Some(gate) = self.scan_gate.clone() else {
            return;
        };
        if !gate.claim(ScanOutcome::Found) {
            debug!("Scan already timed out, ignoring {}", self.device_name);
            return;
        }

        info!("Found {}", self.device_name);
        self.timer.cancel();
        self.scan_gate = None;
        if let Err(e) = self.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }

        self.state = SessionState::Connecting;
        self.peripheral = Some(peripheral);
        if let Err(e) = self.transport.connect(peripheral) {
            warn!("Failed to connect to {}: {}", self.device_name, e);
            self.state = SessionState::Idle;
            self.peripheral = None;
        }

        if let Some(listener) = self.connection_listener.as_mut() {
            listener.on_device_found();
        }
    }

    fn on_scan_timed_out(&mut self, generation: u64) {
        let Some(gate) = self.scan_gate.clone() else {
            debug!("Stale scan timeout (generation {})", generation);
            return;
        };
        if gate.generation() != generation {
            debug!(
                "Stale scan timeout (generation {}, current {})",
                generation,
                gate.generation()
            );
            return;
        }
        let timed_out =
            gate.outcome() == Some(ScanOutcome::TimedOut) || gate.claim(ScanOutcome::TimedOut);
        if !timed_out {
            return;
        }

        info!("{} not found before the scan timed out", self.device_name);
        self.scan_gate = None;
        if let Err(e) = self.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }
        self.state = SessionState::Idle;

        if let Some(listener) = self.connection_listener.as_mut() {
            listener.on_device_not_found();
        }
    }

    fn on_connected(&mut self) {
        let Some(peripheral) = self.peripheral else {
            debug!("Connected event without a pending connection");
            return;
        };
        if self.state != SessionState::Connecting {
            debug!("Connected event ignored in state {:?}", self.state);
            return;
        }

        info!("Connected to {}", self.device_name);
        self.state = SessionState::DiscoveringServices;
        self.characteristics.clear();
        self.pending_services.clear();
        self.sensor_service_seen = false;

        if let Some(listener) = self.connection_listener.as_mut() {
            listener.on_connected();
        }

        if let Err(e) = self.transport.discover_services(peripheral) {
            self.fail_discovery(&format!("service discovery request failed: {}", e));
        }
    }

    fn on_connect_failed(&mut self, reason: &str) {
        if self.state != SessionState::Connecting {
            debug!("Connect failure ignored in state {:?}: {}", self.state, reason);
            return;
        }
        warn!("Connection to {} failed: {}", self.device_name, reason);
        self.state = SessionState::Idle;
        self.peripheral = None;
    }

    /// Only a live link can go down; late duplicates from a previous link
    /// must not disturb a scan or an idle session.
    fn on_disconnected(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::DiscoveringServices | SessionState::Ready
        ) {
            debug!("Disconnected event ignored in state {:?}", self.state);
            return;
        }

        info!("Disconnected from {}", self.device_name);
        self.link_down();
    }

    fn link_down(&mut self) {
        self.state = SessionState::Disconnected;
        self.peripheral = None;
        self.characteristics.clear();
        self.pending_services.clear();
        self.sensor_service_seen = false;

        if let Some(listener) = self.connection_listener.as_mut() {
            listener.on_disconnected();
        }
    }

    /// Give up on a half-discovered device: drop the link and report it as
    /// disconnected so the caller can `connect` again.
    fn fail_discovery(&mut self, reason: &str) {
        warn!("Discovery on {} failed: {}", self.device_name, reason);
        if let Some(peripheral) = self.peripheral {
            if let Err(e) = self.transport.disconnect(peripheral) {
                warn!("Failed to drop the link: {}", e);
            }
        }
        self.link_down();
    }

    fn on_services_discovered(&mut self, services: Vec<DiscoveredService>) {
        let Some(peripheral) = self.peripheral else {
            return;
        };
        if self.state != SessionState::DiscoveringServices {
            debug!("Services discovered in state {:?}, ignoring", self.state);
            return;
        }

        debug!("Discovered {} services", services.len());
        for service in services {
            match self.transport.discover_characteristics(peripheral, service.handle) {
                Ok(()) => {
                    self.pending_services.insert(service.handle);
                }
                Err(e) => warn!("Characteristic discovery for {} failed: {}", service.uuid, e),
            }
        }
        if self.pending_services.is_empty() {
            self.fail_discovery("no service accepted characteristic discovery");
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        service: DiscoveredService,
        characteristics: Vec<DiscoveredCharacteristic>,
    ) {
        if self.state != SessionState::DiscoveringServices {
            debug!("Characteristics discovered in state {:?}, ignoring", self.state);
            return;
        }

        for characteristic in &characteristics {
            self.characteristics
                .insert(characteristic.uuid, characteristic.handle);
        }
        self.pending_services.remove(&service.handle);
        if service.uuid == SENSOR_SERVICE_UUID {
            self.sensor_service_seen = true;
        }
        debug!(
            "Service {}: {} characteristics, {} services pending",
            service.uuid,
            characteristics.len(),
            self.pending_services.len()
        );

        if !self.pending_services.is_empty() {
            return;
        }
        if !self.sensor_service_seen {
            self.fail_discovery("the eSense sensor service was not discovered");
            return;
        }

        info!("{} is ready", self.device_name);
        self.state = SessionState::Ready;
        if let Some(handler) = self.ready_handler.take() {
            handler(self);
        }
    }

    fn on_value_updated(&mut self, characteristic: Uuid, value: &[u8]) {
        trace!("{} -> {:02x?}", characteristic, value);

        let dropped = |what: &str, e: FrameError| debug!("Dropping {} frame: {}", what, e);

        match characteristic {
            SENSOR_CHAR_UUID => match protocol::decode_sensor_sample(value, now_ms()) {
                Ok(sample) => {
                    if let Some(listener) = self.sensor_listener.as_mut() {
                        listener.on_sensor_changed(sample);
                    }
                }
                Err(e) => dropped("sensor", e),
            },
            DEVICE_NAME_CHAR_UUID => match protocol::decode_device_name(value) {
                Some(name) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_device_name_read(&name);
                    }
                }
                None => debug!("Dropping device name that is not valid UTF-8"),
            },
            BATTERY_CHAR_UUID => match protocol::decode_battery_voltage(value) {
                Ok(voltage) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_battery_read(voltage);
                    }
                }
                Err(e) => dropped("battery", e),
            },
            BUTTON_CHAR_UUID => match protocol::decode_button(value) {
                Ok(pressed) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_button_event_changed(pressed);
                    }
                }
                Err(e) => dropped("button", e),
            },
            SENSOR_CONFIG_CHAR_UUID => match protocol::decode_sensor_config_frame(value) {
                Ok(config) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_sensor_config_read(config);
                    }
                }
                Err(e) => dropped("sensor config", e),
            },
            ACCEL_OFFSET_CHAR_UUID => match protocol::decode_accelerometer_offset(value) {
                Ok(offset) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_accelerometer_offset_read(offset);
                    }
                }
                Err(e) => dropped("accelerometer offset", e),
            },
            ADV_CONN_CHAR_UUID => match protocol::decode_connection_intervals(value) {
                Ok(intervals) => {
                    if let Some(listener) = self.event_listener.as_mut() {
                        listener.on_advertisement_and_connection_interval_read(intervals);
                    }
                }
                Err(e) => dropped("interval", e),
            },
            other => trace!("Unhandled value on {}", other),
        }
    }

    fn on_write_completed(&mut self, characteristic: Uuid, value: &[u8], error: Option<TransportError>) {
        if let Some(e) = error {
            warn!("Write to {} failed: {}", characteristic, e);
            return;
        }
        if characteristic == NAME_WRITE_CHAR_UUID {
            if let Some(name) = protocol::decode_device_name(value) {
                info!("Device renamed to {}", name);
                self.device_name = name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{AccLpf, AccRange, GyroLpf, GyroRange};
    use crate::infrastructure::bluetooth::mock::{
        ready_manager, ListenerEvent, ManualTimer, RecordingListener, RecordingTransport,
        TransportCall,
    };

    fn sealed(mut bytes: Vec<u8>, index: usize) -> Vec<u8> {
        protocol::seal_checksum(&mut bytes, index);
        bytes
    }

    #[test]
    fn test_requests_outside_ready_are_rejected() {
        let timer = ManualTimer::new();
        let mut manager = EsenseManager::new("eSense-0063", RecordingTransport::new(), Box::new(timer));
        let listener = RecordingListener::new();

        assert_eq!(manager.get_battery_voltage(), Err(EsenseError::NotConnected));
        assert_eq!(manager.get_device_name(), Err(EsenseError::NotConnected));
        assert_eq!(manager.get_sensor_config(), Err(EsenseError::NotConnected));
        assert_eq!(manager.get_accelerometer_offset(), Err(EsenseError::NotConnected));
        assert_eq!(
            manager.get_advertisement_and_connection_interval(),
            Err(EsenseError::NotConnected)
        );
        assert_eq!(
            manager.set_sensor_config(&SensorConfig::default()),
            Err(EsenseError::NotConnected)
        );
        assert_eq!(manager.set_device_name("eSense-1"), Err(EsenseError::NotConnected));
        assert_eq!(
            manager.set_advertisement_and_connection_interval(100, 200, 20, 50),
            Err(EsenseError::NotConnected)
        );
        assert_eq!(
            manager.register_sensor_listener(Box::new(listener.clone()), 50),
            Err(EsenseError::NotConnected)
        );
        assert_eq!(
            manager.register_event_listener(Box::new(listener)),
            Err(EsenseError::NotConnected)
        );
        assert_eq!(manager.unregister_sensor_listener(), Err(EsenseError::NotConnected));
        assert_eq!(manager.disconnect(), Err(EsenseError::NotConnected));
        assert!(manager.transport().calls().is_empty());
    }

    #[test]
    fn test_invalid_parameters_are_rejected_before_io() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.transport_mut().clear();

        assert!(matches!(
            manager.set_device_name(""),
            Err(EsenseError::InvalidParameter(_))
        ));
        assert!(matches!(
            manager.set_advertisement_and_connection_interval(99, 200, 20, 50),
            Err(EsenseError::InvalidParameter(_))
        ));
        assert!(manager.transport().calls().is_empty());
    }

    #[test]
    fn test_sampling_rate_bounds() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.transport_mut().clear();
        let listener = RecordingListener::new();

        for hz in [0u8, 101] {
            assert!(matches!(
                manager.register_sensor_listener(Box::new(listener.clone()), hz),
                Err(EsenseError::InvalidParameter(_))
            ));
        }
        assert!(manager.transport().calls().is_empty());

        for hz in [1u8, 100] {
            manager.transport_mut().clear();
            manager
                .register_sensor_listener(Box::new(listener.clone()), hz)
                .unwrap();
            let calls = manager.transport().calls();
            assert_eq!(calls.len(), 2);
            match &calls[0] {
                TransportCall::Write { value, .. } => {
                    assert_eq!(value[4], hz);
                    assert!(protocol::verify_checksum(value, 1));
                }
                other => panic!("unexpected call {:?}", other),
            }
            assert!(matches!(calls[1], TransportCall::SetNotify { enable: true, .. }));
        }
    }

    #[test]
    fn test_interval_write_goes_to_config_characteristic() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.transport_mut().clear();

        manager
            .set_advertisement_and_connection_interval(100, 2000, 20, 40)
            .unwrap();
        let config = manager.characteristic(CONFIG_CHAR_UUID).unwrap();
        assert_eq!(
            manager.transport().calls(),
            vec![TransportCall::Write {
                characteristic: config,
                value: vec![0x57, 0x64, 0x08, 0x00, 0xa0, 0x0c, 0x80, 0x00, 0x10, 0x00, 0x20],
                with_response: true,
            }]
        );
    }

    #[test]
    fn test_sensor_config_write() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.transport_mut().clear();

        let config = SensorConfig::new(AccRange::G16, GyroRange::Deg500, AccLpf::Disabled, GyroLpf::Bw92);
        manager.set_sensor_config(&config).unwrap();

        let handle = manager.characteristic(SENSOR_CONFIG_CHAR_UUID).unwrap();
        match &manager.transport().calls()[0] {
            TransportCall::Write {
                characteristic,
                value,
                ..
            } => {
                assert_eq!(*characteristic, handle);
                assert_eq!(protocol::decode_sensor_config_frame(value), Ok(config));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_missing_characteristic() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.characteristics.remove(&BATTERY_CHAR_UUID);
        manager.transport_mut().clear();

        assert_eq!(
            manager.get_battery_voltage(),
            Err(EsenseError::CharacteristicNotFound(BATTERY_CHAR_UUID))
        );
        assert!(manager.transport().calls().is_empty());
    }

    #[test]
    fn test_transport_failure_is_propagated() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager
            .transport_mut()
            .fail_next(TransportError::new("write rejected"));

        assert_eq!(
            manager.get_battery_voltage(),
            Err(EsenseError::Transport(TransportError::new("write rejected")))
        );
    }

    #[test]
    fn test_value_dispatch() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        let listener = RecordingListener::new();
        manager
            .register_event_listener(Box::new(listener.clone()))
            .unwrap();
        manager
            .register_sensor_listener(Box::new(listener.clone()), 50)
            .unwrap();

        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_CHAR_UUID,
            value: sealed(vec![0x42, 0, 0x04, 0x0f, 0xa0], 1),
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: BUTTON_CHAR_UUID,
            value: sealed(vec![0x42, 0, 0x02, 0x01], 1),
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: DEVICE_NAME_CHAR_UUID,
            value: b"eSense-0063".to_vec(),
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: SENSOR_CONFIG_CHAR_UUID,
            value: protocol::encode_sensor_config(&SensorConfig::default()).to_vec(),
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: SENSOR_CHAR_UUID,
            value: sealed(
                vec![0x55, 9, 0, 0x0c, 0, 4, 0, 5, 0, 6, 0, 1, 0, 2, 0, 3],
                2,
            ),
        });

        let events = listener.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], ListenerEvent::Battery(4.0));
        assert_eq!(events[1], ListenerEvent::Button(true));
        assert_eq!(events[2], ListenerEvent::DeviceName("eSense-0063".to_string()));
        assert_eq!(events[3], ListenerEvent::SensorConfig(SensorConfig::default()));
        match &events[4] {
            ListenerEvent::Sample(sample) => {
                assert_eq!(sample.accel, [1, 2, 3]);
                assert_eq!(sample.gyro, [4, 5, 6]);
                assert_eq!(sample.packet_index, 265);
                assert!(sample.timestamp_millis > 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_frames_are_dropped() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        let listener = RecordingListener::new();
        manager
            .register_event_listener(Box::new(listener.clone()))
            .unwrap();
        manager
            .register_sensor_listener(Box::new(listener.clone()), 50)
            .unwrap();

        let mut battery = sealed(vec![0x42, 0, 0x04, 0x0f, 0xa0], 1);
        battery[4] ^= 0x01;
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_CHAR_UUID,
            value: battery,
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: SENSOR_CHAR_UUID,
            value: vec![0x55, 1, 0],
        });
        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: DEVICE_NAME_CHAR_UUID,
            value: vec![0xc3, 0x28],
        });

        assert!(listener.events().is_empty());
    }

    #[test]
    fn test_name_write_completion_updates_target() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        manager.set_device_name("eSense-0420").unwrap();
        assert_eq!(manager.device_name(), "eSense-0063");

        manager.handle_event(TransportEvent::WriteCompleted {
            characteristic: NAME_WRITE_CHAR_UUID,
            value: b"eSense-0420".to_vec(),
            error: Some(TransportError::new("timeout")),
        });
        assert_eq!(manager.device_name(), "eSense-0063");

        manager.handle_event(TransportEvent::WriteCompleted {
            characteristic: NAME_WRITE_CHAR_UUID,
            value: b"eSense-0420".to_vec(),
            error: None,
        });
        assert_eq!(manager.device_name(), "eSense-0420");
    }

    #[test]
    fn test_unregister_listeners() {
        let (mut manager, _timer) = ready_manager("eSense-0063");
        let listener = RecordingListener::new();
        manager
            .register_sensor_listener(Box::new(listener.clone()), 20)
            .unwrap();
        manager
            .register_event_listener(Box::new(listener.clone()))
            .unwrap();
        manager.transport_mut().clear();

        manager.unregister_sensor_listener().unwrap();
        manager.unregister_event_listener().unwrap();

        let calls = manager.transport().calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(
            &calls[0],
            TransportCall::Write { value, .. } if value.as_slice() == SENSOR_STOP_COMMAND
        ));
        assert!(matches!(calls[1], TransportCall::SetNotify { enable: false, .. }));
        assert!(matches!(calls[2], TransportCall::SetNotify { enable: false, .. }));

        manager.handle_event(TransportEvent::ValueUpdated {
            characteristic: BUTTON_CHAR_UUID,
            value: sealed(vec![0x42, 0, 0x02, 0x01], 1),
        });
        assert!(listener.events().is_empty());
    }
}
