use std::str::FromStr;
use std::time::Duration;

use bon::Builder;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};
use uuid::Uuid;

use super::model::FoundDevice;
use crate::dispatch::{
    CharacteristicAddress, DescriptorAddress, DiscoveredAttribute, GattTransport, Handle,
    TransportEvent, WriteMode,
};
use crate::error::{FixtureError, InteractionError, TransportError};
use crate::utils;

const DEFAULT_DEVICE_ID: &str = "FA:KE:00:00:00:01";
const DEFAULT_DEVICE_NAME: &str = "Fake Peripheral";

/// Parsed fake GATT table.
///
/// Records are `service=characteristic,characteristic;service=...`. A characteristic is
/// `uuid[:hex value][+descriptor uuid...]`. UUIDs may use the 16-bit short form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct GattFixture {
    services: Vec<FakeService>,
}

impl FromStr for GattFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let services = parse_gatt_fixture(value)?;
        Ok(Self { services })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct FakeService {
    handle: Handle,
    uuid: Uuid,
    characteristics: Vec<FakeCharacteristic>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct FakeCharacteristic {
    handle: Handle,
    uuid: Uuid,
    value: Vec<u8>,
    notifying: bool,
    descriptors: Vec<FakeDescriptor>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct FakeDescriptor {
    handle: Handle,
    uuid: Uuid,
    value: Vec<u8>,
}

/// Settings for constructing a fake transport.
#[derive(Debug, Clone, Builder)]
pub(crate) struct FakeBackendConfig {
    gatt: GattFixture,
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    device_name: String,
    #[builder(default)]
    event_delay: Duration,
    #[builder(default)]
    fail_service_discovery: bool,
}

impl FakeBackendConfig {
    /// Returns the fake device when its name matches the prefix.
    pub(crate) fn matching_device(&self, name_prefix: &str) -> Result<FoundDevice, InteractionError> {
        let device = FoundDevice::new(
            "fake".to_string(),
            DEFAULT_DEVICE_ID.to_string(),
            Some(self.device_name.clone()),
            None,
        );
        if device.local_name_starts_with(name_prefix) {
            Ok(device)
        } else {
            Err(InteractionError::NoMatchingFixtureDevice {
                prefix: name_prefix.to_string(),
            })
        }
    }
}

/// In-memory transport answering requests from a fixture GATT table.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    services: Vec<FakeService>,
    events: mpsc::UnboundedSender<TransportEvent>,
    event_delay: Duration,
    delayed: Option<mpsc::UnboundedSender<(Instant, TransportEvent)>>,
    fail_service_discovery: bool,
}

impl FakeTransport {
    pub(crate) fn new(
        config: FakeBackendConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let delayed = (!config.event_delay.is_zero()).then(|| delayed_forwarder(events.clone()));
        Self {
            services: config.gatt.services,
            events,
            event_delay: config.event_delay,
            delayed,
            fail_service_discovery: config.fail_service_discovery,
        }
    }

    fn send(&self, event: TransportEvent) {
        trace!(?event, "fake transport callback");
        let sent = match &self.delayed {
            Some(delayed) => delayed
                .send((Instant::now() + self.event_delay, event))
                .is_ok(),
            None => self.events.send(event).is_ok(),
        };
        if !sent {
            debug!("fake transport event receiver was dropped");
        }
    }

    fn service(&self, handle: Handle) -> Result<&FakeService, TransportError> {
        self.services
            .iter()
            .find(|service| service.handle == handle)
            .ok_or(TransportError::UnknownHandle { handle })
    }

    fn characteristic_mut(
        &mut self,
        address: CharacteristicAddress,
    ) -> Result<&mut FakeCharacteristic, TransportError> {
        self.services
            .iter_mut()
            .find(|service| service.handle == address.service)
            .ok_or(TransportError::UnknownHandle {
                handle: address.service,
            })?
            .characteristics
            .iter_mut()
            .find(|characteristic| characteristic.handle == address.characteristic)
            .ok_or(TransportError::UnknownHandle {
                handle: address.characteristic,
            })
    }

    fn descriptor_mut(
        &mut self,
        address: DescriptorAddress,
    ) -> Result<&mut FakeDescriptor, TransportError> {
        self.characteristic_mut(address.characteristic)?
            .descriptors
            .iter_mut()
            .find(|descriptor| descriptor.handle == address.descriptor)
            .ok_or(TransportError::UnknownHandle {
                handle: address.descriptor,
            })
    }
}

/// Spawns one task that delivers delayed events in the order they were issued.
fn delayed_forwarder(
    events: mpsc::UnboundedSender<TransportEvent>,
) -> mpsc::UnboundedSender<(Instant, TransportEvent)> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<(Instant, TransportEvent)>();
    tokio::spawn(async move {
        while let Some((due, event)) = receiver.recv().await {
            sleep_until(due).await;
            if events.send(event).is_err() {
                debug!("fake transport event receiver was dropped");
                break;
            }
        }
    });
    sender
}

impl GattTransport for FakeTransport {
    fn discover_services(&mut self, uuids: Option<Vec<Uuid>>) {
        let result = if self.fail_service_discovery {
            Err(TransportError::Platform {
                message: "fake service discovery failure".to_string(),
            })
        } else {
            Ok(self
                .services
                .iter()
                .filter(|service| in_scope(uuids.as_deref(), service.uuid))
                .map(|service| DiscoveredAttribute::new(service.handle, service.uuid))
                .collect())
        };
        self.send(TransportEvent::ServicesDiscovered(result));
    }

    fn discover_characteristics(&mut self, service: Handle, uuids: Option<Vec<Uuid>>) {
        let result = self.service(service).map(|found| {
            found
                .characteristics
                .iter()
                .filter(|characteristic| in_scope(uuids.as_deref(), characteristic.uuid))
                .map(|characteristic| {
                    DiscoveredAttribute::new(characteristic.handle, characteristic.uuid)
                })
                .collect()
        });
        self.send(TransportEvent::CharacteristicsDiscovered { service, result });
    }

    fn discover_descriptors(&mut self, characteristic: CharacteristicAddress) {
        let result = self.characteristic_mut(characteristic).map(|found| {
            found
                .descriptors
                .iter()
                .map(|descriptor| DiscoveredAttribute::new(descriptor.handle, descriptor.uuid))
                .collect()
        });
        self.send(TransportEvent::DescriptorsDiscovered {
            characteristic,
            result,
        });
    }

    fn read_characteristic(&mut self, characteristic: CharacteristicAddress) {
        let result = self
            .characteristic_mut(characteristic)
            .map(|found| found.value.clone());
        self.send(TransportEvent::CharacteristicValueUpdated {
            characteristic,
            result,
        });
    }

    fn write_characteristic(
        &mut self,
        characteristic: CharacteristicAddress,
        value: Vec<u8>,
        mode: WriteMode,
    ) {
        trace!(%mode, len = value.len(), "fake characteristic write");
        let notification = match self.characteristic_mut(characteristic) {
            Ok(found) => {
                found.value.clone_from(&value);
                found.notifying.then_some(value)
            }
            Err(error) => {
                self.send(TransportEvent::CharacteristicWritten {
                    characteristic,
                    result: Err(error),
                });
                return;
            }
        };
        self.send(TransportEvent::CharacteristicWritten {
            characteristic,
            result: Ok(()),
        });
        if let Some(value) = notification {
            self.send(TransportEvent::CharacteristicValueUpdated {
                characteristic,
                result: Ok(value),
            });
        }
    }

    fn set_notify(&mut self, characteristic: CharacteristicAddress, enabled: bool) {
        let result = self.characteristic_mut(characteristic).map(|found| {
            found.notifying = enabled;
            enabled
        });
        self.send(TransportEvent::NotificationStateUpdated {
            characteristic,
            result,
        });
    }

    fn read_descriptor(&mut self, descriptor: DescriptorAddress) {
        let result = self
            .descriptor_mut(descriptor)
            .map(|found| found.value.clone());
        self.send(TransportEvent::DescriptorValueUpdated { descriptor, result });
    }

    fn write_descriptor(&mut self, descriptor: DescriptorAddress, value: Vec<u8>) {
        let result = self.descriptor_mut(descriptor).map(|found| {
            found.value = value;
        });
        self.send(TransportEvent::DescriptorWritten { descriptor, result });
    }
}

fn in_scope(scope: Option<&[Uuid]>, uuid: Uuid) -> bool {
    scope.is_none_or(|uuids| uuids.contains(&uuid))
}

fn parse_gatt_fixture(raw_fixture: &str) -> Result<Vec<FakeService>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    let mut handles = HandleAllocator::default();
    raw_fixture
        .split(';')
        .map(|record| parse_service_record(record, &mut handles))
        .collect()
}

#[derive(Debug, Default)]
struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    fn allocate(&mut self) -> Handle {
        self.next += 1;
        Handle::new(self.next)
    }
}

fn parse_service_record(
    raw_record: &str,
    handles: &mut HandleAllocator,
) -> Result<FakeService, FixtureError> {
    let (raw_service, raw_characteristics) = match raw_record.split_once('=') {
        Some((service, characteristics)) => (service, Some(characteristics)),
        None => (raw_record, None),
    };
    let uuid = parse_uuid(raw_service)?;
    let handle = handles.allocate();
    let characteristics = match raw_characteristics {
        Some(raw) => raw
            .split(',')
            .map(|characteristic| parse_characteristic(characteristic, handles))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(FakeService {
        handle,
        uuid,
        characteristics,
    })
}

fn parse_characteristic(
    raw_characteristic: &str,
    handles: &mut HandleAllocator,
) -> Result<FakeCharacteristic, FixtureError> {
    let mut parts = raw_characteristic.split('+');
    let head = parts.next().unwrap_or_default();
    let (raw_uuid, raw_value) = match head.split_once(':') {
        Some((uuid, value)) => (uuid, Some(value)),
        None => (head, None),
    };
    let uuid = parse_uuid(raw_uuid)?;
    let value = match raw_value {
        Some(value) => utils::parse_hex(value)?,
        None => Vec::new(),
    };
    let handle = handles.allocate();
    let descriptors = parts
        .map(|raw_descriptor| {
            Ok(FakeDescriptor {
                handle: handles.allocate(),
                uuid: parse_uuid(raw_descriptor)?,
                value: Vec::new(),
            })
        })
        .collect::<Result<Vec<_>, FixtureError>>()?;

    Ok(FakeCharacteristic {
        handle,
        uuid,
        value,
        notifying: false,
        descriptors,
    })
}

fn parse_uuid(raw_value: &str) -> Result<Uuid, FixtureError> {
    let value = raw_value.trim();
    if value.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }
    utils::parse_uuid(value).map_err(|source| FixtureError::InvalidUuid {
        value: value.to_string(),
        source,
    })
}
