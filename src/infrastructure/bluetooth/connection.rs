//! BLE Connection Module
//!
//! [`Transport`] implementation over btleplug. Each request spawns a task on
//! the runtime the transport was created in; results are posted to the
//! session's event channel as [`TransportEvent`]s.

use crate::infrastructure::bluetooth::transport::{
    CharacteristicHandle, DiscoveredCharacteristic, DiscoveredService, PeripheralHandle,
    ServiceHandle, Transport, TransportError, TransportEvent,
};
use anyhow::anyhow;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maps opaque handles to btleplug objects
#[derive(Default)]
struct Registry {
    next_id: u64,
    peripheral_ids: HashMap<PeripheralId, u64>,
    peripherals: HashMap<u64, Peripheral>,
    services: HashMap<u64, Service>,
    characteristics: HashMap<u64, Characteristic>,
}

impl Registry {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_peripheral(&mut self, peripheral: Peripheral) -> PeripheralHandle {
        let id = peripheral.id();
        if let Some(handle) = self.peripheral_ids.get(&id) {
            return PeripheralHandle(*handle);
        }
        let handle = self.allocate();
        self.peripheral_ids.insert(id, handle);
        self.peripherals.insert(handle, peripheral);
        PeripheralHandle(handle)
    }

    /// Forget the GATT table of the previous link; peripherals stay known
    fn clear_gatt(&mut self) {
        self.services.clear();
        self.characteristics.clear();
    }

    fn add_service(&mut self, service: Service) -> DiscoveredService {
        let handle = self.allocate();
        let uuid = service.uuid;
        self.services.insert(handle, service);
        DiscoveredService {
            uuid,
            handle: ServiceHandle(handle),
        }
    }

    fn add_characteristic(&mut self, characteristic: Characteristic) -> DiscoveredCharacteristic {
        let handle = self.allocate();
        let uuid = characteristic.uuid;
        self.characteristics.insert(handle, characteristic);
        DiscoveredCharacteristic {
            uuid,
            handle: CharacteristicHandle(handle),
        }
    }
}

/// BLE central backed by the first system adapter
pub struct BtleplugTransport {
    adapter: Adapter,
    runtime: Handle,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    registry: Arc<Mutex<Registry>>,
    scan_task: Option<JoinHandle<()>>,
    link_tasks: Vec<JoinHandle<()>>,
}

impl BtleplugTransport {
    /// Open the first Bluetooth adapter. Must be called inside a tokio runtime.
    pub async fn new(event_sender: mpsc::UnboundedSender<TransportEvent>) -> anyhow::Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Using Bluetooth adapter: {}", adapter.adapter_info().await.unwrap_or_default());

        Ok(Self {
            adapter,
            runtime: Handle::current(),
            event_sender,
            registry: Arc::new(Mutex::new(Registry::default())),
            scan_task: None,
            link_tasks: Vec::new(),
        })
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>, TransportError> {
        self.registry
            .lock()
            .map_err(|_| TransportError::new("transport registry poisoned"))
    }

    fn peripheral(&self, handle: PeripheralHandle) -> Result<Peripheral, TransportError> {
        self.registry()?
            .peripherals
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("unknown peripheral {}", handle.0)))
    }

    fn characteristic(&self, handle: CharacteristicHandle) -> Result<Characteristic, TransportError> {
        self.registry()?
            .characteristics
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("unknown characteristic {}", handle.0)))
    }

    /// Post `Disconnected` when the adapter reports the link dropped, and
    /// forward every notification of the peripheral as `ValueUpdated`.
    fn watch_link(&mut self, peripheral: Peripheral) {
        let adapter = self.adapter.clone();
        let sender = self.event_sender.clone();
        let peripheral_id = peripheral.id();
        self.link_tasks.push(self.runtime.spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("Device {:?} disconnected", id);
                                let _ = sender.send(TransportEvent::Disconnected);
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("Could not subscribe to adapter events: {}", e),
            }
        }));

        let sender = self.event_sender.clone();
        self.link_tasks.push(self.runtime.spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Could not get notification stream: {}", e);
                    return;
                }
            };
            while let Some(notification) = notifications.next().await {
                let _ = sender.send(TransportEvent::ValueUpdated {
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
            debug!("Notification stream ended");
        }));
    }

    fn stop_link_tasks(&mut self) {
        for task in self.link_tasks.drain(..) {
            task.abort();
        }
    }
}

impl Transport for BtleplugTransport {
    fn start_scan(&mut self, services: &[Uuid]) -> Result<(), TransportError> {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }

        let adapter = self.adapter.clone();
        let sender = self.event_sender.clone();
        let registry = self.registry.clone();
        let filter = ScanFilter {
            services: services.to_vec(),
        };

        self.scan_task = Some(self.runtime.spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Could not subscribe to adapter events: {}", e);
                    return;
                }
            };
            if let Err(e) = adapter.start_scan(filter).await {
                warn!("Failed to start scan: {}", e);
                return;
            }
            info!("BLE scan started");

            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let name = peripheral
                    .properties()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|p| p.local_name);
                let handle = match registry.lock() {
                    Ok(mut registry) => registry.add_peripheral(peripheral),
                    Err(_) => break,
                };
                let _ = sender.send(TransportEvent::DeviceDiscovered {
                    peripheral: handle,
                    name,
                });
            }
        }));
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            } else {
                info!("BLE scan stopped");
            }
        });
        Ok(())
    }

    fn connect(&mut self, handle: PeripheralHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(handle)?;
        self.registry()?.clear_gatt();
        self.stop_link_tasks();
        self.watch_link(peripheral.clone());

        let sender = self.event_sender.clone();
        self.runtime.spawn(async move {
            let event = match peripheral.connect().await {
                Ok(()) => TransportEvent::Connected,
                Err(e) => TransportEvent::ConnectFailed(e.to_string()),
            };
            let _ = sender.send(event);
        });
        Ok(())
    }

    fn disconnect(&mut self, handle: PeripheralHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(handle)?;
        self.registry()?.clear_gatt();
        let sender = self.event_sender.clone();
        self.runtime.spawn(async move {
            match peripheral.disconnect().await {
                // The adapter event may never arrive on some platforms. The
                // session only acts on the first Disconnected of a link.
                Ok(()) => {
                    let _ = sender.send(TransportEvent::Disconnected);
                }
                Err(e) => warn!("Disconnect failed: {}", e),
            }
        });
        Ok(())
    }

    fn discover_services(&mut self, handle: PeripheralHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(handle)?;
        let sender = self.event_sender.clone();
        let registry = self.registry.clone();
        self.runtime.spawn(async move {
            if let Err(e) = peripheral.discover_services().await {
                warn!("Service discovery failed: {}", e);
                let _ = sender.send(TransportEvent::DiscoveryFailed(e.to_string()));
                return;
            }
            let services = match registry.lock() {
                Ok(mut registry) => peripheral
                    .services()
                    .into_iter()
                    .map(|service| registry.add_service(service))
                    .collect(),
                Err(_) => {
                    let _ = sender.send(TransportEvent::DiscoveryFailed(
                        "transport registry poisoned".to_string(),
                    ));
                    return;
                }
            };
            let _ = sender.send(TransportEvent::ServicesDiscovered(services));
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        _peripheral: PeripheralHandle,
        service: ServiceHandle,
    ) -> Result<(), TransportError> {
        // btleplug resolves characteristics together with their services.
        let mut registry = self.registry()?;
        let found = registry
            .services
            .get(&service.0)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("unknown service {}", service.0)))?;
        let discovered = DiscoveredService {
            uuid: found.uuid,
            handle: service,
        };
        let characteristics = found
            .characteristics
            .into_iter()
            .map(|c| registry.add_characteristic(c))
            .collect();
        drop(registry);

        self.event_sender
            .send(TransportEvent::CharacteristicsDiscovered {
                service: discovered,
                characteristics,
            })
            .map_err(|_| TransportError::new("session event channel closed"))
    }

    fn read_characteristic(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(peripheral)?;
        let characteristic = self.characteristic(characteristic)?;
        let sender = self.event_sender.clone();
        self.runtime.spawn(async move {
            match peripheral.read(&characteristic).await {
                Ok(value) => {
                    let _ = sender.send(TransportEvent::ValueUpdated {
                        characteristic: characteristic.uuid,
                        value,
                    });
                }
                Err(e) => warn!("Read of {} failed: {}", characteristic.uuid, e),
            }
        });
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(peripheral)?;
        let characteristic = self.characteristic(characteristic)?;
        let sender = self.event_sender.clone();
        let value = value.to_vec();
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.runtime.spawn(async move {
            let error = peripheral
                .write(&characteristic, &value, write_type)
                .await
                .err()
                .map(|e| TransportError::new(e.to_string()));
            let _ = sender.send(TransportEvent::WriteCompleted {
                characteristic: characteristic.uuid,
                value,
                error,
            });
        });
        Ok(())
    }

    fn set_notify(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        enable: bool,
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(peripheral)?;
        let characteristic = self.characteristic(characteristic)?;
        self.runtime.spawn(async move {
            let result = if enable {
                peripheral.subscribe(&characteristic).await
            } else {
                peripheral.unsubscribe(&characteristic).await
            };
            if let Err(e) = result {
                warn!(
                    "Failed to {} notifications on {}: {}",
                    if enable { "enable" } else { "disable" },
                    characteristic.uuid,
                    e
                );
            }
        });
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        self.stop_link_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::SENSOR_SERVICE_UUID;
    use std::collections::BTreeSet;

    #[test]
    fn test_clear_gatt_forgets_previous_link() {
        let mut registry = Registry::default();
        let service = Service {
            uuid: SENSOR_SERVICE_UUID,
            primary: true,
            characteristics: BTreeSet::new(),
        };
        let first = registry.add_service(service.clone());
        assert_eq!(registry.services.len(), 1);

        registry.clear_gatt();
        assert!(registry.services.is_empty());
        assert!(registry.characteristics.is_empty());

        let second = registry.add_service(service);
        assert_ne!(first.handle, second.handle);
        assert_eq!(registry.services.len(), 1);
    }
}
