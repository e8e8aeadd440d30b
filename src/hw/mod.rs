mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;
mod session;

pub(crate) use self::fake_backend::{FakeBackendConfig, GattFixture};
pub use self::hardware::{ConnectedDevice, HardwareClient};
pub(crate) use self::hardware::{fake_hardware_client, real_hardware_client};
pub use self::model::{
    CharacteristicReport, DescriptorReport, DiscoveryReport, ErrorReport, FoundDevice, ServiceReport,
    ValueReport,
};
pub use self::session::DeviceSession;
