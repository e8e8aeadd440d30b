use derive_more::Display;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use super::pending::{Pending, PendingSlot};
use crate::dispatch::Handle;
use crate::error::{OperationError, OperationKind, TransportError};
use crate::identifier::Identifier;

/// Backend-specific identity of a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Position of a service in its peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("service[{_0}]")]
pub struct ServiceIndex(usize);

/// Position of a characteristic in the tree.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("{service}/characteristic[{index}]")]
pub struct CharacteristicPath {
    service: ServiceIndex,
    index: usize,
}

impl CharacteristicPath {
    #[must_use]
    pub fn service(self) -> ServiceIndex {
        self.service
    }
}

/// Position of a descriptor in the tree.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("{characteristic}/descriptor[{index}]")]
pub struct DescriptorPath {
    characteristic: CharacteristicPath,
    index: usize,
}

impl DescriptorPath {
    #[must_use]
    pub fn characteristic(self) -> CharacteristicPath {
        self.characteristic
    }
}

/// Root of the entity tree for one connection.
#[derive(Debug)]
pub struct Peripheral {
    id: PeripheralId,
    name: String,
    services: Vec<Service>,
    services_discovered: bool,
}

impl Peripheral {
    #[must_use]
    pub fn new(id: PeripheralId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            services: Vec::new(),
            services_discovered: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    #[must_use]
    pub fn services_discovered(&self) -> bool {
        self.services_discovered
    }

    pub(crate) fn set_services_discovered(&mut self) {
        self.services_discovered = true;
    }

    /// True once services and every service below them have finished discovery.
    #[must_use]
    pub fn discovery_completed(&self) -> bool {
        self.services_discovered && self.services.iter().all(Service::discovery_completed)
    }

    pub(crate) fn push_service(&mut self, service: Service) -> ServiceIndex {
        self.services.push(service);
        ServiceIndex(self.services.len() - 1)
    }

    #[must_use]
    pub fn service(&self, index: ServiceIndex) -> Option<&Service> {
        self.services.get(index.0)
    }

    pub(crate) fn service_mut(&mut self, index: ServiceIndex) -> Option<&mut Service> {
        self.services.get_mut(index.0)
    }

    #[must_use]
    pub fn characteristic(&self, path: CharacteristicPath) -> Option<&Characteristic> {
        self.service(path.service)?.characteristics.get(path.index)
    }

    pub(crate) fn characteristic_mut(
        &mut self,
        path: CharacteristicPath,
    ) -> Option<&mut Characteristic> {
        self.service_mut(path.service)?
            .characteristics
            .get_mut(path.index)
    }

    #[must_use]
    pub fn descriptor(&self, path: DescriptorPath) -> Option<&Descriptor> {
        self.characteristic(path.characteristic)?
            .descriptors
            .get(path.index)
    }

    pub(crate) fn descriptor_mut(&mut self, path: DescriptorPath) -> Option<&mut Descriptor> {
        self.characteristic_mut(path.characteristic)?
            .descriptors
            .get_mut(path.index)
    }

    /// Resolves a transport service handle.
    #[must_use]
    pub fn find_service(&self, handle: Handle) -> Option<ServiceIndex> {
        self.services
            .iter()
            .position(|service| service.handle == handle)
            .map(ServiceIndex)
    }

    /// Resolves a characteristic handle scoped to its service handle.
    #[must_use]
    pub fn find_characteristic(
        &self,
        service: Handle,
        characteristic: Handle,
    ) -> Option<CharacteristicPath> {
        let service = self.find_service(service)?;
        self.service(service)?
            .characteristics
            .iter()
            .position(|candidate| candidate.handle == characteristic)
            .map(|index| CharacteristicPath { service, index })
    }

    /// Resolves a descriptor handle through its characteristic and service handles.
    #[must_use]
    pub fn find_descriptor(
        &self,
        service: Handle,
        characteristic: Handle,
        descriptor: Handle,
    ) -> Option<DescriptorPath> {
        let characteristic = self.find_characteristic(service, characteristic)?;
        self.characteristic(characteristic)?
            .descriptors
            .iter()
            .position(|candidate| candidate.handle == descriptor)
            .map(|index| DescriptorPath {
                characteristic,
                index,
            })
    }

    /// Finds a characteristic by service and characteristic UUID.
    #[must_use]
    pub fn characteristic_by_uuid(
        &self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Option<CharacteristicPath> {
        self.services
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.id.uuid() == service)
            .find_map(|(service_index, candidate)| {
                candidate
                    .characteristics
                    .iter()
                    .position(|entry| entry.id.uuid() == characteristic)
                    .map(|index| CharacteristicPath {
                        service: ServiceIndex(service_index),
                        index,
                    })
            })
    }
}

/// A discovered service admitted by the subscription.
#[derive(Debug)]
pub struct Service {
    handle: Handle,
    id: Identifier,
    peripheral: PeripheralId,
    characteristics: Vec<Characteristic>,
    characteristics_discovered: bool,
}

impl Service {
    pub(crate) fn new(handle: Handle, id: Identifier, peripheral: PeripheralId) -> Self {
        Self {
            handle,
            id,
            peripheral,
            characteristics: Vec::new(),
            characteristics_discovered: false,
        }
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// The owning peripheral.
    #[must_use]
    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }

    #[must_use]
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    #[must_use]
    pub fn characteristics_discovered(&self) -> bool {
        self.characteristics_discovered
    }

    pub(crate) fn set_characteristics_discovered(&mut self) {
        self.characteristics_discovered = true;
    }

    #[must_use]
    pub fn discovery_completed(&self) -> bool {
        self.characteristics_discovered
            && self
                .characteristics
                .iter()
                .all(Characteristic::discovery_completed)
    }

    pub(crate) fn push_characteristic(&mut self, characteristic: Characteristic) {
        self.characteristics.push(characteristic);
    }
}

/// A discovered characteristic with its pending-operation state.
#[derive(Debug)]
pub struct Characteristic {
    handle: Handle,
    id: Identifier,
    service: ServiceIndex,
    descriptors: Vec<Descriptor>,
    descriptors_discovered: bool,
    value: Option<Vec<u8>>,
    notifying: bool,
    pending_read: PendingSlot<Vec<u8>>,
    pending_write: PendingSlot<()>,
    pending_notify: PendingSlot<bool>,
    notification_sink: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl Characteristic {
    pub(crate) fn new(handle: Handle, id: Identifier, service: ServiceIndex) -> Self {
        Self {
            handle,
            id,
            service,
            descriptors: Vec::new(),
            descriptors_discovered: false,
            value: None,
            notifying: false,
            pending_read: PendingSlot::new(OperationKind::Read),
            pending_write: PendingSlot::new(OperationKind::Write),
            pending_notify: PendingSlot::new(OperationKind::Notify),
            notification_sink: None,
        }
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// The owning service.
    #[must_use]
    pub fn service(&self) -> ServiceIndex {
        self.service
    }

    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    #[must_use]
    pub fn descriptors_discovered(&self) -> bool {
        self.descriptors_discovered
    }

    pub(crate) fn set_descriptors_discovered(&mut self) {
        self.descriptors_discovered = true;
    }

    #[must_use]
    pub fn discovery_completed(&self) -> bool {
        self.descriptors_discovered
    }

    pub(crate) fn push_descriptor(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    /// The last value read or notified.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    #[must_use]
    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// Opens a stream of notified values, replacing any earlier stream.
    pub fn notifications(&mut self) -> UnboundedReceiverStream<Vec<u8>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.notification_sink = Some(sender);
        UnboundedReceiverStream::new(receiver)
    }

    pub(crate) fn begin_read(&mut self) -> Result<Pending<Vec<u8>>, OperationError> {
        self.pending_read.begin(&self.id)
    }

    pub(crate) fn begin_write(&mut self) -> Result<Pending<()>, OperationError> {
        self.pending_write.begin(&self.id)
    }

    pub(crate) fn begin_set_notify(&mut self) -> Result<Pending<bool>, OperationError> {
        self.pending_notify.begin(&self.id)
    }

    /// Handles a value update: the answer to a read, or otherwise a notification.
    pub(crate) fn value_updated(&mut self, result: Result<Vec<u8>, TransportError>) {
        if self.pending_read.is_armed() {
            if let Ok(value) = &result {
                self.value = Some(value.clone());
            }
            self.pending_read.resolve(result);
            return;
        }

        match result {
            Ok(value) if self.notifying => {
                self.value = Some(value.clone());
                if let Some(sink) = &self.notification_sink
                    && sink.send(value).is_err()
                {
                    debug!(characteristic = %self.id, "notification stream was dropped");
                    self.notification_sink = None;
                }
            }
            Ok(value) => {
                debug!(characteristic = %self.id, len = value.len(), "unsolicited value update");
                self.value = Some(value);
            }
            Err(error) => {
                warn!(characteristic = %self.id, %error, "value update failed with no read pending");
            }
        }
    }

    pub(crate) fn write_completed(&mut self, result: Result<(), TransportError>) {
        if !self.pending_write.resolve(result) {
            warn!(characteristic = %self.id, "write completion arrived with no write pending");
        }
    }

    pub(crate) fn notification_state_updated(&mut self, result: Result<bool, TransportError>) {
        if let Ok(enabled) = result {
            self.notifying = enabled;
        }
        if !self.pending_notify.resolve(result) {
            debug!(characteristic = %self.id, notifying = self.notifying, "notification state changed");
        }
    }
}

/// A discovered descriptor with its pending-operation state.
#[derive(Debug)]
pub struct Descriptor {
    handle: Handle,
    id: Identifier,
    characteristic: CharacteristicPath,
    value: Option<Vec<u8>>,
    pending_read: PendingSlot<Vec<u8>>,
    pending_write: PendingSlot<()>,
}

impl Descriptor {
    pub(crate) fn new(handle: Handle, id: Identifier, characteristic: CharacteristicPath) -> Self {
        Self {
            handle,
            id,
            characteristic,
            value: None,
            pending_read: PendingSlot::new(OperationKind::Read),
            pending_write: PendingSlot::new(OperationKind::Write),
        }
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// The owning characteristic.
    #[must_use]
    pub fn characteristic(&self) -> CharacteristicPath {
        self.characteristic
    }

    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub(crate) fn begin_read(&mut self) -> Result<Pending<Vec<u8>>, OperationError> {
        self.pending_read.begin(&self.id)
    }

    pub(crate) fn begin_write(&mut self) -> Result<Pending<()>, OperationError> {
        self.pending_write.begin(&self.id)
    }

    pub(crate) fn value_updated(&mut self, result: Result<Vec<u8>, TransportError>) {
        if let Ok(value) = &result {
            self.value = Some(value.clone());
        }
        if !self.pending_read.resolve(result) {
            warn!(descriptor = %self.id, "descriptor value arrived with no read pending");
        }
    }

    pub(crate) fn write_completed(&mut self, result: Result<(), TransportError>) {
        if !self.pending_write.resolve(result) {
            warn!(descriptor = %self.id, "descriptor write completion arrived with no write pending");
        }
    }
}
