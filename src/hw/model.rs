use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::{DiscoveryState, DiscoveryTracker, Handle};
use crate::error::{DispatchError, ErrorKind, OperationKind};
use crate::gatt::{Characteristic, Descriptor, Peripheral, Service};

/// A discovered BLE peripheral that matched a scan predicate.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Name used for the root of the entity tree.
    pub(crate) fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.device_id)
    }

    pub(crate) fn local_name_starts_with(&self, prefix: &str) -> bool {
        prefix.is_empty()
            || self
                .local_name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix))
    }
}

/// Serializable snapshot of a discovery session.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DiscoveryReport {
    device: FoundDevice,
    discovery: DiscoveryState,
    services: Vec<ServiceReport>,
    errors: Vec<ErrorReport>,
}

impl DiscoveryReport {
    pub(crate) fn new(device: FoundDevice, peripheral: &Peripheral, errors: &[DispatchError]) -> Self {
        Self {
            device,
            discovery: DiscoveryTracker::state(peripheral),
            services: peripheral.services().iter().map(ServiceReport::from).collect(),
            errors: errors.iter().map(ErrorReport::from).collect(),
        }
    }

    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }

    #[must_use]
    pub fn discovery(&self) -> DiscoveryState {
        self.discovery
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceReport] {
        &self.services
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorReport] {
        &self.errors
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceReport {
    uuid: Uuid,
    name: Option<String>,
    handle: Handle,
    characteristics: Vec<CharacteristicReport>,
}

impl ServiceReport {
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicReport] {
        &self.characteristics
    }
}

impl From<&Service> for ServiceReport {
    fn from(service: &Service) -> Self {
        Self {
            uuid: service.id().uuid(),
            name: service.id().name().map(str::to_string),
            handle: service.handle(),
            characteristics: service
                .characteristics()
                .iter()
                .map(CharacteristicReport::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicReport {
    uuid: Uuid,
    name: Option<String>,
    handle: Handle,
    notifying: bool,
    descriptors: Vec<DescriptorReport>,
}

impl CharacteristicReport {
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn notifying(&self) -> bool {
        self.notifying
    }

    #[must_use]
    pub fn descriptors(&self) -> &[DescriptorReport] {
        &self.descriptors
    }
}

impl From<&Characteristic> for CharacteristicReport {
    fn from(characteristic: &Characteristic) -> Self {
        Self {
            uuid: characteristic.id().uuid(),
            name: characteristic.id().name().map(str::to_string),
            handle: characteristic.handle(),
            notifying: characteristic.is_notifying(),
            descriptors: characteristic
                .descriptors()
                .iter()
                .map(DescriptorReport::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DescriptorReport {
    uuid: Uuid,
    handle: Handle,
}

impl DescriptorReport {
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl From<&Descriptor> for DescriptorReport {
    fn from(descriptor: &Descriptor) -> Self {
        Self {
            uuid: descriptor.id().uuid(),
            handle: descriptor.handle(),
        }
    }
}

/// A dispatch error flattened for rendering.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ErrorReport {
    kind: ErrorKind,
    message: String,
}

impl ErrorReport {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&DispatchError> for ErrorReport {
    fn from(error: &DispatchError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a characteristic read or write.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ValueReport {
    operation: OperationKind,
    service: Uuid,
    characteristic: Uuid,
    value: String,
}

impl ValueReport {
    pub(crate) fn new(
        operation: OperationKind,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Self {
        Self {
            operation,
            service,
            characteristic,
            value: hex::encode(value),
        }
    }

    #[must_use]
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    #[must_use]
    pub fn service(&self) -> Uuid {
        self.service
    }

    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    /// Lowercase hex rendering of the value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
