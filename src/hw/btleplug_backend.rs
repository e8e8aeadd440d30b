use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Descriptor, Manager as _, Peripheral as _, ScanFilter, Service,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use super::model::FoundDevice;
use crate::dispatch::{
    CharacteristicAddress, DescriptorAddress, DiscoveredAttribute, GattTransport, Handle,
    TransportEvent, WriteMode,
};
use crate::error::{InteractionError, TransportError};

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Scans until the first matching peripheral appears, connects, and caches its GATT table.
    #[instrument(skip(self), level = "debug", fields(prefix = name_prefix))]
    pub(crate) async fn connect_first_matching(
        &self,
        name_prefix: &str,
    ) -> Result<ConnectedPeripheral, InteractionError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting BLE scan");

        for adapter in &adapters {
            adapter.adapter.start_scan(ScanFilter::default()).await?;
        }

        loop {
            for adapter in &adapters {
                for peripheral in adapter.adapter.peripherals().await? {
                    let Some(properties) = peripheral.properties().await? else {
                        continue;
                    };
                    if !matches_name_prefix(properties.local_name.as_deref(), name_prefix) {
                        continue;
                    }

                    for handle in &adapters {
                        if let Err(error) = handle.adapter.stop_scan().await {
                            debug!(?error, "failed to stop adapter scan cleanly");
                        }
                    }

                    if !peripheral.is_connected().await? {
                        peripheral.connect().await?;
                    }
                    peripheral.discover_services().await?;

                    let device = FoundDevice::new(
                        adapter.name.clone(),
                        peripheral.id().to_string(),
                        properties.local_name,
                        properties.rssi,
                    );
                    info!(device_id = device.device_id(), "connected to matching peripheral");
                    return Ok(ConnectedPeripheral { peripheral, device });
                }
            }

            sleep(Duration::from_millis(250)).await;
        }
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

/// A connected peripheral whose GATT table has been discovered by btleplug.
#[derive(Debug)]
pub(crate) struct ConnectedPeripheral {
    pub(crate) peripheral: Peripheral,
    pub(crate) device: FoundDevice,
}

/// Transport answering discovery from btleplug's cached GATT table.
///
/// btleplug discovers the whole table at connect time, so the three discovery requests are
/// answered immediately from that cache. Reads, writes and subscriptions run as spawned tasks
/// that post their completion back on the event channel.
#[derive(Debug)]
pub(crate) struct BtleplugTransport {
    peripheral: Peripheral,
    events: mpsc::UnboundedSender<TransportEvent>,
    services: HashMap<Handle, Service>,
    characteristics: HashMap<CharacteristicAddress, Characteristic>,
    descriptors: HashMap<DescriptorAddress, Descriptor>,
    notify_tasks: HashMap<CharacteristicAddress, CancellationToken>,
    next_handle: u64,
}

impl BtleplugTransport {
    pub(crate) fn new(
        peripheral: Peripheral,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            peripheral,
            events,
            services: HashMap::new(),
            characteristics: HashMap::new(),
            descriptors: HashMap::new(),
            notify_tasks: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Stops notification forwarding and disconnects the peripheral.
    #[instrument(skip(self), level = "debug")]
    pub(crate) async fn close(self) -> Result<(), InteractionError> {
        for token in self.notify_tasks.values() {
            token.cancel();
        }
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    fn allocate_handle(&mut self) -> Handle {
        self.next_handle += 1;
        Handle::new(self.next_handle)
    }

    fn send(&self, event: TransportEvent) {
        send_event(&self.events, event);
    }

    fn spawn_completion<F>(&self, completion: F)
    where
        F: Future<Output = TransportEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            send_event(&events, completion.await);
        });
    }

    fn characteristic(
        &self,
        address: CharacteristicAddress,
    ) -> Result<Characteristic, TransportError> {
        self.characteristics
            .get(&address)
            .cloned()
            .ok_or(TransportError::UnknownHandle {
                handle: address.characteristic,
            })
    }

    fn descriptor(&self, address: DescriptorAddress) -> Result<Descriptor, TransportError> {
        self.descriptors
            .get(&address)
            .cloned()
            .ok_or(TransportError::UnknownHandle {
                handle: address.descriptor,
            })
    }

    fn start_notifications(&mut self, address: CharacteristicAddress, characteristic: Characteristic) {
        let token = CancellationToken::new();
        if let Some(previous) = self.notify_tasks.insert(address, token.clone()) {
            previous.cancel();
        }

        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let notifications = match peripheral.notifications().await {
                Ok(notifications) => notifications,
                Err(error) => {
                    send_event(
                        &events,
                        TransportEvent::NotificationStateUpdated {
                            characteristic: address,
                            result: Err(error.into()),
                        },
                    );
                    return;
                }
            };
            let result = peripheral
                .subscribe(&characteristic)
                .await
                .map(|()| true)
                .map_err(TransportError::from);
            let subscribed = result.is_ok();
            send_event(
                &events,
                TransportEvent::NotificationStateUpdated {
                    characteristic: address,
                    result,
                },
            );
            if subscribed {
                forward_notifications(notifications, characteristic.uuid, address, &events, &token)
                    .await;
            }
        });
    }

    fn stop_notifications(&mut self, address: CharacteristicAddress, characteristic: Characteristic) {
        if let Some(token) = self.notify_tasks.remove(&address) {
            token.cancel();
        }

        let peripheral = self.peripheral.clone();
        self.spawn_completion(async move {
            let result = peripheral
                .unsubscribe(&characteristic)
                .await
                .map(|()| false)
                .map_err(TransportError::from);
            TransportEvent::NotificationStateUpdated {
                characteristic: address,
                result,
            }
        });
    }
}

impl GattTransport for BtleplugTransport {
    fn discover_services(&mut self, uuids: Option<Vec<Uuid>>) {
        let mut discovered = Vec::new();
        for service in self.peripheral.services() {
            if !in_scope(uuids.as_deref(), service.uuid) {
                continue;
            }
            let handle = self.allocate_handle();
            discovered.push(DiscoveredAttribute::new(handle, service.uuid));
            self.services.insert(handle, service);
        }
        trace!(count = discovered.len(), "answering service discovery from cache");
        self.send(TransportEvent::ServicesDiscovered(Ok(discovered)));
    }

    fn discover_characteristics(&mut self, service: Handle, uuids: Option<Vec<Uuid>>) {
        let Some(cached) = self.services.get(&service).cloned() else {
            self.send(TransportEvent::CharacteristicsDiscovered {
                service,
                result: Err(TransportError::UnknownHandle { handle: service }),
            });
            return;
        };

        let mut discovered = Vec::new();
        for characteristic in cached.characteristics {
            if !in_scope(uuids.as_deref(), characteristic.uuid) {
                continue;
            }
            let handle = self.allocate_handle();
            discovered.push(DiscoveredAttribute::new(handle, characteristic.uuid));
            self.characteristics.insert(
                CharacteristicAddress {
                    service,
                    characteristic: handle,
                },
                characteristic,
            );
        }
        self.send(TransportEvent::CharacteristicsDiscovered {
            service,
            result: Ok(discovered),
        });
    }

    fn discover_descriptors(&mut self, characteristic: CharacteristicAddress) {
        let cached = match self.characteristic(characteristic) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::DescriptorsDiscovered {
                    characteristic,
                    result: Err(error),
                });
                return;
            }
        };

        let mut discovered = Vec::new();
        for descriptor in cached.descriptors {
            let handle = self.allocate_handle();
            discovered.push(DiscoveredAttribute::new(handle, descriptor.uuid));
            self.descriptors.insert(
                DescriptorAddress {
                    characteristic,
                    descriptor: handle,
                },
                descriptor,
            );
        }
        self.send(TransportEvent::DescriptorsDiscovered {
            characteristic,
            result: Ok(discovered),
        });
    }

    fn read_characteristic(&mut self, characteristic: CharacteristicAddress) {
        let cached = match self.characteristic(characteristic) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::CharacteristicValueUpdated {
                    characteristic,
                    result: Err(error),
                });
                return;
            }
        };

        let peripheral = self.peripheral.clone();
        self.spawn_completion(async move {
            let result = peripheral.read(&cached).await.map_err(TransportError::from);
            TransportEvent::CharacteristicValueUpdated {
                characteristic,
                result,
            }
        });
    }

    fn write_characteristic(
        &mut self,
        characteristic: CharacteristicAddress,
        value: Vec<u8>,
        mode: WriteMode,
    ) {
        let cached = match self.characteristic(characteristic) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::CharacteristicWritten {
                    characteristic,
                    result: Err(error),
                });
                return;
            }
        };

        let peripheral = self.peripheral.clone();
        let write_type = write_type(mode);
        self.spawn_completion(async move {
            let result = peripheral
                .write(&cached, &value, write_type)
                .await
                .map_err(TransportError::from);
            TransportEvent::CharacteristicWritten {
                characteristic,
                result,
            }
        });
    }

    fn set_notify(&mut self, characteristic: CharacteristicAddress, enabled: bool) {
        let cached = match self.characteristic(characteristic) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::NotificationStateUpdated {
                    characteristic,
                    result: Err(error),
                });
                return;
            }
        };

        if enabled {
            self.start_notifications(characteristic, cached);
        } else {
            self.stop_notifications(characteristic, cached);
        }
    }

    fn read_descriptor(&mut self, descriptor: DescriptorAddress) {
        let cached = match self.descriptor(descriptor) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::DescriptorValueUpdated {
                    descriptor,
                    result: Err(error),
                });
                return;
            }
        };

        let peripheral = self.peripheral.clone();
        self.spawn_completion(async move {
            let result = peripheral
                .read_descriptor(&cached)
                .await
                .map_err(TransportError::from);
            TransportEvent::DescriptorValueUpdated { descriptor, result }
        });
    }

    fn write_descriptor(&mut self, descriptor: DescriptorAddress, value: Vec<u8>) {
        let cached = match self.descriptor(descriptor) {
            Ok(cached) => cached,
            Err(error) => {
                self.send(TransportEvent::DescriptorWritten {
                    descriptor,
                    result: Err(error),
                });
                return;
            }
        };

        let peripheral = self.peripheral.clone();
        self.spawn_completion(async move {
            let result = peripheral
                .write_descriptor(&cached, &value)
                .await
                .map_err(TransportError::from);
            TransportEvent::DescriptorWritten { descriptor, result }
        });
    }
}

async fn forward_notifications<S>(
    mut notifications: S,
    uuid: Uuid,
    address: CharacteristicAddress,
    events: &mpsc::UnboundedSender<TransportEvent>,
    token: &CancellationToken,
) where
    S: Stream<Item = ValueNotification> + Unpin,
{
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            notification = notifications.next() => {
                match notification {
                    Some(notification) if notification.uuid == uuid => {
                        send_event(
                            events,
                            TransportEvent::CharacteristicValueUpdated {
                                characteristic: address,
                                result: Ok(notification.value),
                            },
                        );
                    }
                    Some(_) => {}
                    None => {
                        debug!(%address, "notification stream closed");
                        break;
                    }
                }
            }
        }
    }
}

fn send_event(events: &mpsc::UnboundedSender<TransportEvent>, event: TransportEvent) {
    if events.send(event).is_err() {
        debug!("transport event receiver was dropped");
    }
}

fn in_scope(scope: Option<&[Uuid]>, uuid: Uuid) -> bool {
    scope.is_none_or(|uuids| uuids.contains(&uuid))
}

fn write_type(mode: WriteMode) -> WriteType {
    match mode {
        WriteMode::WithResponse => WriteType::WithResponse,
        WriteMode::WithoutResponse => WriteType::WithoutResponse,
    }
}

fn matches_name_prefix(local_name: Option<&str>, name_prefix: &str) -> bool {
    if name_prefix.is_empty() {
        return true;
    }

    local_name.is_some_and(|value| value.starts_with(name_prefix))
}
