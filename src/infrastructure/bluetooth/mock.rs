//! In-memory test doubles: a transport that records every request, a scan
//! timer fired by hand and a listener that records every callback.

use crate::domain::config::SensorConfig;
use crate::domain::models::{AccelerometerOffset, ConnectionIntervals, SensorSample};
use crate::infrastructure::bluetooth::listener::{ConnectionListener, EventListener, SensorListener};
use crate::infrastructure::bluetooth::protocol::*;
use crate::infrastructure::bluetooth::scanner::{ScanGate, ScanOutcome, ScanTimer};
use crate::infrastructure::bluetooth::service::EsenseManager;
use crate::infrastructure::bluetooth::transport::{
    CharacteristicHandle, DiscoveredCharacteristic, DiscoveredService, PeripheralHandle,
    ServiceHandle, Transport, TransportError, TransportEvent,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Peripheral handle reported by [`discovered`]
pub const MOCK_PERIPHERAL: PeripheralHandle = PeripheralHandle(7);

/// A request received by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    StartScan { services: Vec<Uuid> },
    StopScan,
    Connect(PeripheralHandle),
    Disconnect(PeripheralHandle),
    DiscoverServices(PeripheralHandle),
    DiscoverCharacteristics(ServiceHandle),
    Read { characteristic: CharacteristicHandle },
    Write {
        characteristic: CharacteristicHandle,
        value: Vec<u8>,
        with_response: bool,
    },
    SetNotify {
        characteristic: CharacteristicHandle,
        enable: bool,
    },
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Vec<TransportCall>,
    fail_next: Option<TransportError>,
    fail_on: Option<(TransportCall, TransportError)>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.clone()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Make the next request fail with `error` (it is still recorded)
    pub fn fail_next(&mut self, error: TransportError) {
        self.fail_next = Some(error);
    }

    /// Make the first request equal to `call` fail with `error`
    pub fn fail_on(&mut self, call: TransportCall, error: TransportError) {
        self.fail_on = Some((call, error));
    }

    fn record(&mut self, call: TransportCall) -> Result<(), TransportError> {
        if let Some((expected, error)) = self.fail_on.take() {
            if expected == call {
                self.calls.push(call);
                return Err(error);
            }
            self.fail_on = Some((expected, error));
        }
        self.calls.push(call);
        match self.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Transport for RecordingTransport {
    fn start_scan(&mut self, services: &[Uuid]) -> Result<(), TransportError> {
        self.record(TransportCall::StartScan {
            services: services.to_vec(),
        })
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::StopScan)
    }

    fn connect(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError> {
        self.record(TransportCall::Connect(peripheral))
    }

    fn disconnect(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect(peripheral))
    }

    fn discover_services(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError> {
        self.record(TransportCall::DiscoverServices(peripheral))
    }

    fn discover_characteristics(
        &mut self,
        _peripheral: PeripheralHandle,
        service: ServiceHandle,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::DiscoverCharacteristics(service))
    }

    fn read_characteristic(
        &mut self,
        _peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Read { characteristic })
    }

    fn write_characteristic(
        &mut self,
        _peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Write {
            characteristic,
            value: value.to_vec(),
            with_response,
        })
    }

    fn set_notify(
        &mut self,
        _peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        enable: bool,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SetNotify {
            characteristic,
            enable,
        })
    }
}

#[derive(Debug, Default)]
struct TimerState {
    armed: Option<(Duration, Arc<ScanGate>)>,
    cancelled: usize,
}

/// Scan timer that only fires when told to. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<TimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    pub fn armed_timeout(&self) -> Option<Duration> {
        self.lock().armed.as_ref().map(|(timeout, _)| *timeout)
    }

    pub fn cancel_count(&self) -> usize {
        self.lock().cancelled
    }

    /// Let the timeout elapse. Returns the event to deliver when the timer
    /// wins the gate, the same way the tokio timer would post it.
    pub fn fire(&self) -> Option<TransportEvent> {
        let (_, gate) = self.lock().armed.take()?;
        if gate.claim(ScanOutcome::TimedOut) {
            Some(TransportEvent::ScanTimedOut {
                generation: gate.generation(),
            })
        } else {
            None
        }
    }

    /// Gate of the pending timer
    pub fn gate(&self) -> Option<Arc<ScanGate>> {
        self.lock().armed.as_ref().map(|(_, gate)| gate.clone())
    }
}

impl ScanTimer for ManualTimer {
    fn arm(&mut self, timeout: Duration, gate: Arc<ScanGate>) {
        self.lock().armed = Some((timeout, gate));
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        if state.armed.take().is_some() {
            state.cancelled += 1;
        }
    }
}

/// Callback recorded by [`RecordingListener`]
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    DeviceFound,
    DeviceNotFound,
    Connected,
    Disconnected,
    Battery(f64),
    Button(bool),
    Intervals(ConnectionIntervals),
    DeviceName(String),
    SensorConfig(SensorConfig),
    AccelerometerOffset(AccelerometerOffset),
    Sample(SensorSample),
}

/// Listener implementing every listener trait. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event: &ListenerEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: ListenerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ConnectionListener for RecordingListener {
    fn on_device_found(&mut self) {
        self.push(ListenerEvent::DeviceFound);
    }

    fn on_device_not_found(&mut self) {
        self.push(ListenerEvent::DeviceNotFound);
    }

    fn on_connected(&mut self) {
        self.push(ListenerEvent::Connected);
    }

    fn on_disconnected(&mut self) {
        self.push(ListenerEvent::Disconnected);
    }
}

impl EventListener for RecordingListener {
    fn on_battery_read(&mut self, voltage: f64) {
        self.push(ListenerEvent::Battery(voltage));
    }

    fn on_button_event_changed(&mut self, pressed: bool) {
        self.push(ListenerEvent::Button(pressed));
    }

    fn on_advertisement_and_connection_interval_read(&mut self, intervals: ConnectionIntervals) {
        self.push(ListenerEvent::Intervals(intervals));
    }

    fn on_device_name_read(&mut self, name: &str) {
        self.push(ListenerEvent::DeviceName(name.to_string()));
    }

    fn on_sensor_config_read(&mut self, config: SensorConfig) {
        self.push(ListenerEvent::SensorConfig(config));
    }

    fn on_accelerometer_offset_read(&mut self, offset: AccelerometerOffset) {
        self.push(ListenerEvent::AccelerometerOffset(offset));
    }
}

impl SensorListener for RecordingListener {
    fn on_sensor_changed(&mut self, sample: SensorSample) {
        self.push(ListenerEvent::Sample(sample));
    }
}

// ── Scripted device ─────────────────────────────────────────────────────────

pub const SENSOR_SERVICE: DiscoveredService = DiscoveredService {
    uuid: SENSOR_SERVICE_UUID,
    handle: ServiceHandle(1),
};

pub const GENERIC_ACCESS_SERVICE: DiscoveredService = DiscoveredService {
    uuid: DEVICE_NAME_SERVICE_UUID,
    handle: ServiceHandle(2),
};

/// Advertisement from the mock peripheral
pub fn discovered(name: &str) -> TransportEvent {
    TransportEvent::DeviceDiscovered {
        peripheral: MOCK_PERIPHERAL,
        name: Some(name.to_string()),
    }
}

pub fn services_discovered() -> TransportEvent {
    TransportEvent::ServicesDiscovered(vec![SENSOR_SERVICE, GENERIC_ACCESS_SERVICE])
}

/// Characteristics of one of the two eSense services
pub fn characteristics_discovered(service: DiscoveredService) -> TransportEvent {
    let uuids: &[Uuid] = if service.uuid == SENSOR_SERVICE_UUID {
        &[
            CONFIG_CHAR_UUID,
            SENSOR_CHAR_UUID,
            BUTTON_CHAR_UUID,
            BATTERY_CHAR_UUID,
            ADV_CONN_CHAR_UUID,
            NAME_WRITE_CHAR_UUID,
            ACCEL_OFFSET_CHAR_UUID,
            SENSOR_CONFIG_CHAR_UUID,
        ]
    } else {
        &[DEVICE_NAME_CHAR_UUID]
    };
    let base = service.handle.0 * 100;
    TransportEvent::CharacteristicsDiscovered {
        service,
        characteristics: uuids
            .iter()
            .enumerate()
            .map(|(i, uuid)| DiscoveredCharacteristic {
                uuid: *uuid,
                handle: CharacteristicHandle(base + i as u64),
            })
            .collect(),
    }
}

/// Events taking a session from `Scanning` to `Ready`
pub fn connection_script(name: &str) -> Vec<TransportEvent> {
    vec![
        discovered(name),
        TransportEvent::Connected,
        services_discovered(),
        characteristics_discovered(SENSOR_SERVICE),
        characteristics_discovered(GENERIC_ACCESS_SERVICE),
    ]
}

/// A session already in the `Ready` state, with its scan timer
pub fn ready_manager(name: &str) -> (EsenseManager<RecordingTransport>, ManualTimer) {
    let timer = ManualTimer::new();
    let mut manager = EsenseManager::new(name, RecordingTransport::new(), Box::new(timer.clone()));
    // The recording transport accepts every request.
    let _ = manager.connect(Duration::from_secs(10));
    for event in connection_script(name) {
        manager.handle_event(event);
    }
    (manager, timer)
}
