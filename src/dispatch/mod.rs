mod dispatcher;
mod event;
mod tracker;

pub use self::dispatcher::Dispatcher;
pub use self::event::{
    CharacteristicAddress, DescriptorAddress, DiscoveredAttribute, DiscoveryResult, GattTransport,
    Handle, PeripheralEvent, TransportEvent, WriteMode,
};
pub use self::tracker::{DiscoveryState, DiscoveryTracker};
