mod app;
mod cli;
mod dispatch;
mod error;
mod gatt;
mod hw;
mod identifier;
mod subscription;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    SessionHandler, fake_hardware_client, real_hardware_client, run_with_clients,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use cli::{
    Args, CharacteristicArgs, Command, FakeArgs, LogLevel, OutputFormat, SessionSettings,
    WriteArgs,
};
pub use dispatch::{
    CharacteristicAddress, DescriptorAddress, DiscoveredAttribute, DiscoveryResult,
    DiscoveryState, DiscoveryTracker, Dispatcher, GattTransport, Handle, PeripheralEvent,
    TransportEvent, WriteMode,
};
pub use error::{
    DiscoveryScope, DispatchError, ErrorKind, FixtureError, InteractionError, OperationError,
    OperationKind, SubscriptionError, TransportError,
};
pub use gatt::{
    Characteristic, CharacteristicPath, DefaultEntityFactory, Descriptor, DescriptorPath,
    EntityFactory, Pending, Peripheral, PeripheralId, Service, ServiceIndex,
};
pub use hw::{
    CharacteristicReport, ConnectedDevice, DescriptorReport, DeviceSession, DiscoveryReport,
    ErrorReport, FoundDevice, HardwareClient, ServiceReport, ValueReport,
};
pub use identifier::Identifier;
pub use subscription::{
    CharacteristicMatch, CharacteristicSubscription, PeripheralSubscription,
    ServiceSubscription, default_subscription_path,
};
pub use terminal::TerminalClient;
