use derive_more::{Display, From, Into};
use serde_with::SerializeDisplay;
use uuid::Uuid;

use crate::error::{DispatchError, TransportError};

/// Opaque attribute handle assigned by the transport.
///
/// Handles only need to be unique among siblings of one parent.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Display, From, Into, SerializeDisplay,
)]
#[display("#{_0}")]
pub struct Handle(u64);

impl Handle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Transport-side address of a characteristic: its service handle and its own handle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("{service}/{characteristic}")]
pub struct CharacteristicAddress {
    pub service: Handle,
    pub characteristic: Handle,
}

/// Transport-side address of a descriptor.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("{characteristic}/{descriptor}")]
pub struct DescriptorAddress {
    pub characteristic: CharacteristicAddress,
    pub descriptor: Handle,
}

/// One attribute reported by a discovery callback.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DiscoveredAttribute {
    pub handle: Handle,
    pub uuid: Uuid,
}

impl DiscoveredAttribute {
    #[must_use]
    pub fn new(handle: Handle, uuid: Uuid) -> Self {
        Self { handle, uuid }
    }
}

/// Discovery result carried by a discovery callback.
pub type DiscoveryResult = Result<Vec<DiscoveredAttribute>, TransportError>;

/// Completion callbacks delivered by the transport, in transport order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportEvent {
    ServicesDiscovered(DiscoveryResult),
    CharacteristicsDiscovered {
        service: Handle,
        result: DiscoveryResult,
    },
    DescriptorsDiscovered {
        characteristic: CharacteristicAddress,
        result: DiscoveryResult,
    },
    CharacteristicValueUpdated {
        characteristic: CharacteristicAddress,
        result: Result<Vec<u8>, TransportError>,
    },
    CharacteristicWritten {
        characteristic: CharacteristicAddress,
        result: Result<(), TransportError>,
    },
    NotificationStateUpdated {
        characteristic: CharacteristicAddress,
        result: Result<bool, TransportError>,
    },
    DescriptorValueUpdated {
        descriptor: DescriptorAddress,
        result: Result<Vec<u8>, TransportError>,
    },
    DescriptorWritten {
        descriptor: DescriptorAddress,
        result: Result<(), TransportError>,
    },
}

/// Outward events of one peripheral session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PeripheralEvent {
    /// Every subscribed branch has finished discovery. Emitted once per session.
    Ready { peripheral: String },
    Error(DispatchError),
}

/// Characteristic write acknowledgement mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, strum_macros::Display)]
pub enum WriteMode {
    #[default]
    #[strum(to_string = "with_response")]
    WithResponse,
    #[strum(to_string = "without_response")]
    WithoutResponse,
}

/// Requests the dispatcher issues to the BLE transport.
///
/// Every method returns immediately; the outcome arrives later as a [`TransportEvent`].
pub trait GattTransport {
    fn discover_services(&mut self, uuids: Option<Vec<Uuid>>);

    fn discover_characteristics(&mut self, service: Handle, uuids: Option<Vec<Uuid>>);

    fn discover_descriptors(&mut self, characteristic: CharacteristicAddress);

    fn read_characteristic(&mut self, characteristic: CharacteristicAddress);

    fn write_characteristic(
        &mut self,
        characteristic: CharacteristicAddress,
        value: Vec<u8>,
        mode: WriteMode,
    );

    fn set_notify(&mut self, characteristic: CharacteristicAddress, enabled: bool);

    fn read_descriptor(&mut self, descriptor: DescriptorAddress);

    fn write_descriptor(&mut self, descriptor: DescriptorAddress, value: Vec<u8>);
}
