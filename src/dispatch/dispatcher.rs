use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, instrument, trace, warn};

use super::event::{
    CharacteristicAddress, DescriptorAddress, DiscoveryResult, GattTransport, Handle,
    PeripheralEvent, TransportEvent, WriteMode,
};
use super::tracker::{DiscoveryState, DiscoveryTracker};
use crate::error::{DispatchError, OperationError};
use crate::gatt::{
    CharacteristicPath, DefaultEntityFactory, DescriptorPath, EntityFactory, Peripheral, Pending,
};
use crate::subscription::PeripheralSubscription;

/// Drives discovery of one peripheral and routes transport callbacks into its entity tree.
///
/// Callbacks must be delivered one at a time, in transport order. Every failure is reported
/// on the event channel; no callback ever returns an error to the transport.
#[derive(Debug)]
pub struct Dispatcher<T, F = DefaultEntityFactory> {
    peripheral: Peripheral,
    subscription: Arc<PeripheralSubscription>,
    factory: F,
    tracker: DiscoveryTracker,
    transport: T,
    events: mpsc::UnboundedSender<PeripheralEvent>,
}

impl<T: GattTransport> Dispatcher<T> {
    /// Creates a dispatcher and the receiving end of its outward event stream.
    pub fn new(
        peripheral: Peripheral,
        subscription: Arc<PeripheralSubscription>,
        transport: T,
    ) -> (Self, mpsc::UnboundedReceiver<PeripheralEvent>) {
        Self::with_factory(peripheral, subscription, transport, DefaultEntityFactory)
    }
}

impl<T: GattTransport, F: EntityFactory> Dispatcher<T, F> {
    /// Creates a dispatcher that builds entities with a custom factory.
    pub fn with_factory(
        peripheral: Peripheral,
        subscription: Arc<PeripheralSubscription>,
        transport: T,
        factory: F,
    ) -> (Self, mpsc::UnboundedReceiver<PeripheralEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let dispatcher = Self {
            peripheral,
            subscription,
            factory,
            tracker: DiscoveryTracker::new(),
            transport,
            events,
        };
        (dispatcher, receiver)
    }

    #[must_use]
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    #[must_use]
    pub fn subscription(&self) -> &PeripheralSubscription {
        &self.subscription
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Ends the session, returning the transport.
    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    #[must_use]
    pub fn state(&self) -> DiscoveryState {
        DiscoveryTracker::state(&self.peripheral)
    }

    /// Asks the transport for the subscribed services.
    #[instrument(skip(self), level = "debug", fields(peripheral = %self.peripheral.name()))]
    pub fn start_discovery(&mut self) {
        let scope = self.subscription.service_scope();
        debug!(service_count = scope.len(), "requesting service discovery");
        self.transport.discover_services(Some(scope));
    }

    /// Processes one transport callback.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ServicesDiscovered(result) => self.services_discovered(result),
            TransportEvent::CharacteristicsDiscovered { service, result } => {
                self.characteristics_discovered(service, result);
            }
            TransportEvent::DescriptorsDiscovered {
                characteristic,
                result,
            } => self.descriptors_discovered(characteristic, result),
            TransportEvent::CharacteristicValueUpdated {
                characteristic,
                result,
            } => {
                if let Some(entity) = self.lookup_characteristic(characteristic) {
                    entity.value_updated(result);
                }
            }
            TransportEvent::CharacteristicWritten {
                characteristic,
                result,
            } => {
                if let Some(entity) = self.lookup_characteristic(characteristic) {
                    entity.write_completed(result);
                }
            }
            TransportEvent::NotificationStateUpdated {
                characteristic,
                result,
            } => {
                if let Some(entity) = self.lookup_characteristic(characteristic) {
                    entity.notification_state_updated(result);
                }
            }
            TransportEvent::DescriptorValueUpdated { descriptor, result } => {
                if let Some(entity) = self.lookup_descriptor(descriptor) {
                    entity.value_updated(result);
                }
            }
            TransportEvent::DescriptorWritten { descriptor, result } => {
                if let Some(entity) = self.lookup_descriptor(descriptor) {
                    entity.write_completed(result);
                }
            }
        }
    }

    #[instrument(skip_all, level = "debug", fields(peripheral = %self.peripheral.name()))]
    fn services_discovered(&mut self, result: DiscoveryResult) {
        if self.peripheral.services_discovered() {
            if let Err(error) = self.tracker.mark_services_discovered(&mut self.peripheral) {
                self.report(error);
            }
            return;
        }

        let discovered = match result {
            Ok(discovered) => discovered,
            Err(source) => {
                self.report(DispatchError::PeripheralDiscovery {
                    peripheral: self.peripheral.name().to_string(),
                    source,
                });
                return;
            }
        };

        if discovered.is_empty() && !self.subscription.services().is_empty() {
            self.report(DispatchError::MissingServices);
        }

        for attribute in discovered {
            let Some(id) = self.subscription.match_service(attribute.uuid) else {
                self.report(DispatchError::UnrecognizedService {
                    uuid: attribute.uuid,
                });
                continue;
            };

            trace!(service = %id, handle = %attribute.handle, "admitting service");
            let service = self
                .factory
                .make_service(attribute.handle, id, self.peripheral.id());
            self.peripheral.push_service(service);

            let scope = self.subscription.characteristic_scope(attribute.uuid);
            self.transport
                .discover_characteristics(attribute.handle, scope);
        }

        if let Err(error) = self.tracker.mark_services_discovered(&mut self.peripheral) {
            self.report(error);
        }
        self.signal_if_ready();
    }

    #[instrument(skip(self, result), level = "debug", fields(peripheral = %self.peripheral.name()))]
    fn characteristics_discovered(&mut self, service_handle: Handle, result: DiscoveryResult) {
        let Some(service_index) = self.peripheral.find_service(service_handle) else {
            self.report(DispatchError::UnknownService {
                handle: service_handle,
            });
            return;
        };
        let subscription = Arc::clone(&self.subscription);
        let Some(service) = self.peripheral.service_mut(service_index) else {
            return;
        };

        if service.characteristics_discovered() {
            if let Err(error) = self.tracker.mark_characteristics_discovered(service) {
                self.report(error);
            }
            return;
        }

        let discovered = match result {
            Ok(discovered) => discovered,
            Err(source) => {
                let error = DispatchError::ServiceDiscovery {
                    service: service.id().clone(),
                    source,
                };
                self.report(error);
                return;
            }
        };

        let service_uuid = service.id().uuid();
        let mut anomalies = Vec::new();
        if discovered.is_empty()
            && subscription
                .service(service_uuid)
                .is_some_and(|entry| !entry.characteristics().is_empty())
        {
            anomalies.push(DispatchError::MissingCharacteristics {
                service: service.id().clone(),
            });
        }

        for attribute in discovered {
            let Some(matched) = subscription.match_characteristic(service_uuid, attribute.uuid)
            else {
                anomalies.push(DispatchError::UnrecognizedCharacteristic {
                    service: service.id().clone(),
                    uuid: attribute.uuid,
                });
                continue;
            };

            trace!(characteristic = %matched.id, handle = %attribute.handle, "admitting characteristic");
            let mut characteristic =
                self.factory
                    .make_characteristic(attribute.handle, matched.id, service_index);
            if matched.discover_descriptors {
                self.transport.discover_descriptors(CharacteristicAddress {
                    service: service_handle,
                    characteristic: attribute.handle,
                });
            } else if let Err(error) = self
                .tracker
                .mark_descriptors_discovered(&mut characteristic)
            {
                anomalies.push(error);
            }
            service.push_characteristic(characteristic);
        }

        let marked = self.tracker.mark_characteristics_discovered(service);
        for anomaly in anomalies {
            self.report(anomaly);
        }
        if let Err(error) = marked {
            self.report(error);
        }
        self.signal_if_ready();
    }

    #[instrument(skip(self, result), level = "debug", fields(peripheral = %self.peripheral.name()))]
    fn descriptors_discovered(&mut self, address: CharacteristicAddress, result: DiscoveryResult) {
        let Some(path) = self
            .peripheral
            .find_characteristic(address.service, address.characteristic)
        else {
            self.report(DispatchError::UnknownCharacteristic { address });
            return;
        };
        let Some(characteristic) = self.peripheral.characteristic_mut(path) else {
            return;
        };

        if characteristic.descriptors_discovered() {
            if let Err(error) = self.tracker.mark_descriptors_discovered(characteristic) {
                self.report(error);
            }
            return;
        }

        let discovered = match result {
            Ok(discovered) => discovered,
            Err(source) => {
                let error = DispatchError::CharacteristicDiscovery {
                    characteristic: characteristic.id().clone(),
                    source,
                };
                self.report(error);
                return;
            }
        };

        for attribute in discovered {
            let id = PeripheralSubscription::match_descriptor(attribute.uuid);
            trace!(descriptor = %id, handle = %attribute.handle, "admitting descriptor");
            let descriptor = self.factory.make_descriptor(attribute.handle, id, path);
            characteristic.push_descriptor(descriptor);
        }

        if let Err(error) = self.tracker.mark_descriptors_discovered(characteristic) {
            self.report(error);
        }
        self.signal_if_ready();
    }

    fn signal_if_ready(&mut self) {
        if self.tracker.ready_transition(&self.peripheral) {
            info!(peripheral = %self.peripheral.name(), "peripheral discovery completed");
            self.emit(PeripheralEvent::Ready {
                peripheral: self.peripheral.name().to_string(),
            });
        } else {
            trace!(state = %self.state(), "discovery progressed");
        }
    }

    fn lookup_characteristic(
        &mut self,
        address: CharacteristicAddress,
    ) -> Option<&mut crate::gatt::Characteristic> {
        let Some(path) = self
            .peripheral
            .find_characteristic(address.service, address.characteristic)
        else {
            self.report(DispatchError::UnknownCharacteristic { address });
            return None;
        };
        self.peripheral.characteristic_mut(path)
    }

    fn lookup_descriptor(
        &mut self,
        address: DescriptorAddress,
    ) -> Option<&mut crate::gatt::Descriptor> {
        let Some(path) = self.peripheral.find_descriptor(
            address.characteristic.service,
            address.characteristic.characteristic,
            address.descriptor,
        ) else {
            self.report(DispatchError::UnknownDescriptor { address });
            return None;
        };
        self.peripheral.descriptor_mut(path)
    }

    fn report(&self, error: DispatchError) {
        warn!(kind = %error.kind(), %error, "dispatch error");
        self.emit(PeripheralEvent::Error(error));
    }

    fn emit(&self, event: PeripheralEvent) {
        if self.events.send(event).is_err() {
            debug!("peripheral event receiver was dropped");
        }
    }

    /// Reads a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown or a read is already pending.
    pub fn read_characteristic(
        &mut self,
        path: CharacteristicPath,
    ) -> Result<Pending<Vec<u8>>, OperationError> {
        let address = self.characteristic_address(path)?;
        let pending = self
            .peripheral
            .characteristic_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .begin_read()?;
        self.transport.read_characteristic(address);
        Ok(pending)
    }

    /// Writes a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown or a write is already pending.
    pub fn write_characteristic(
        &mut self,
        path: CharacteristicPath,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<Pending<()>, OperationError> {
        let address = self.characteristic_address(path)?;
        let pending = self
            .peripheral
            .characteristic_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .begin_write()?;
        self.transport.write_characteristic(address, value, mode);
        Ok(pending)
    }

    /// Enables or disables notifications; resolves to the new notification state.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown or a change is already pending.
    pub fn set_notify(
        &mut self,
        path: CharacteristicPath,
        enabled: bool,
    ) -> Result<Pending<bool>, OperationError> {
        let address = self.characteristic_address(path)?;
        let pending = self
            .peripheral
            .characteristic_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .begin_set_notify()?;
        self.transport.set_notify(address, enabled);
        Ok(pending)
    }

    /// Opens the notification stream of a characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown.
    pub fn notifications(
        &mut self,
        path: CharacteristicPath,
    ) -> Result<UnboundedReceiverStream<Vec<u8>>, OperationError> {
        Ok(self
            .peripheral
            .characteristic_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .notifications())
    }

    /// Reads a descriptor value.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown or a read is already pending.
    pub fn read_descriptor(
        &mut self,
        path: DescriptorPath,
    ) -> Result<Pending<Vec<u8>>, OperationError> {
        let address = self.descriptor_address(path)?;
        let pending = self
            .peripheral
            .descriptor_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .begin_read()?;
        self.transport.read_descriptor(address);
        Ok(pending)
    }

    /// Writes a descriptor value.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is unknown or a write is already pending.
    pub fn write_descriptor(
        &mut self,
        path: DescriptorPath,
        value: Vec<u8>,
    ) -> Result<Pending<()>, OperationError> {
        let address = self.descriptor_address(path)?;
        let pending = self
            .peripheral
            .descriptor_mut(path)
            .ok_or_else(|| unknown_entity(path))?
            .begin_write()?;
        self.transport.write_descriptor(address, value);
        Ok(pending)
    }

    fn characteristic_address(
        &self,
        path: CharacteristicPath,
    ) -> Result<CharacteristicAddress, OperationError> {
        let service = self
            .peripheral
            .service(path.service())
            .ok_or_else(|| unknown_entity(path))?;
        let characteristic = self
            .peripheral
            .characteristic(path)
            .ok_or_else(|| unknown_entity(path))?;
        Ok(CharacteristicAddress {
            service: service.handle(),
            characteristic: characteristic.handle(),
        })
    }

    fn descriptor_address(&self, path: DescriptorPath) -> Result<DescriptorAddress, OperationError> {
        let characteristic = self.characteristic_address(path.characteristic())?;
        let descriptor = self
            .peripheral
            .descriptor(path)
            .ok_or_else(|| unknown_entity(path))?;
        Ok(DescriptorAddress {
            characteristic,
            descriptor: descriptor.handle(),
        })
    }
}

fn unknown_entity(path: impl std::fmt::Display) -> OperationError {
    OperationError::UnknownEntity {
        path: path.to_string(),
    }
}

