use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::btleplug_backend::{BtleplugBackend, BtleplugTransport};
use super::fake_backend::{FakeBackendConfig, FakeTransport};
use super::model::FoundDevice;
use crate::dispatch::{
    CharacteristicAddress, DescriptorAddress, GattTransport, Handle, TransportEvent, WriteMode,
};
use crate::error::InteractionError;

/// Creates a hardware client backed by the real BLE transport.
///
/// The platform manager is created on first connect.
#[must_use]
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(RealHardwareClient)
}

/// Creates a hardware client backed by the fake transport.
#[must_use]
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    info!("using fake BLE backend");
    Box::new(FakeHardwareClient { config })
}

#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Connects to the first peripheral whose local name starts with the prefix.
    async fn connect_first_device(
        self: Box<Self>,
        name_prefix: &str,
    ) -> Result<ConnectedDevice, InteractionError>;
}

#[derive(Debug)]
struct RealHardwareClient;

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        name_prefix: &str,
    ) -> Result<ConnectedDevice, InteractionError> {
        let backend = BtleplugBackend::new().await?;
        let connected = backend.connect_first_matching(name_prefix).await?;
        let (sender, events) = mpsc::unbounded_channel();
        Ok(ConnectedDevice {
            device: connected.device,
            transport: SessionTransport::Real(BtleplugTransport::new(connected.peripheral, sender)),
            events,
        })
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    config: FakeBackendConfig,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        name_prefix: &str,
    ) -> Result<ConnectedDevice, InteractionError> {
        let Self { config } = *self;
        let device = config.matching_device(name_prefix)?;
        let (sender, events) = mpsc::unbounded_channel();
        Ok(ConnectedDevice {
            device,
            transport: SessionTransport::Fake(FakeTransport::new(config, sender)),
            events,
        })
    }
}

/// A connected peripheral with its transport and completion channel.
#[derive(Debug)]
pub struct ConnectedDevice {
    pub(crate) device: FoundDevice,
    pub(crate) transport: SessionTransport,
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl ConnectedDevice {
    /// Returns details for the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }
}

#[derive(Debug)]
pub(crate) enum SessionTransport {
    Real(BtleplugTransport),
    Fake(FakeTransport),
}

impl SessionTransport {
    pub(crate) async fn close(self) -> Result<(), InteractionError> {
        match self {
            Self::Real(real) => real.close().await,
            Self::Fake(_) => Ok(()),
        }
    }
}

impl GattTransport for SessionTransport {
    fn discover_services(&mut self, uuids: Option<Vec<Uuid>>) {
        match self {
            Self::Real(real) => real.discover_services(uuids),
            Self::Fake(fake) => fake.discover_services(uuids),
        }
    }

    fn discover_characteristics(&mut self, service: Handle, uuids: Option<Vec<Uuid>>) {
        match self {
            Self::Real(real) => real.discover_characteristics(service, uuids),
            Self::Fake(fake) => fake.discover_characteristics(service, uuids),
        }
    }

    fn discover_descriptors(&mut self, characteristic: CharacteristicAddress) {
        match self {
            Self::Real(real) => real.discover_descriptors(characteristic),
            Self::Fake(fake) => fake.discover_descriptors(characteristic),
        }
    }

    fn read_characteristic(&mut self, characteristic: CharacteristicAddress) {
        match self {
            Self::Real(real) => real.read_characteristic(characteristic),
            Self::Fake(fake) => fake.read_characteristic(characteristic),
        }
    }

    fn write_characteristic(
        &mut self,
        characteristic: CharacteristicAddress,
        value: Vec<u8>,
        mode: WriteMode,
    ) {
        match self {
            Self::Real(real) => real.write_characteristic(characteristic, value, mode),
            Self::Fake(fake) => fake.write_characteristic(characteristic, value, mode),
        }
    }

    fn set_notify(&mut self, characteristic: CharacteristicAddress, enabled: bool) {
        match self {
            Self::Real(real) => real.set_notify(characteristic, enabled),
            Self::Fake(fake) => fake.set_notify(characteristic, enabled),
        }
    }

    fn read_descriptor(&mut self, descriptor: DescriptorAddress) {
        match self {
            Self::Real(real) => real.read_descriptor(descriptor),
            Self::Fake(fake) => fake.read_descriptor(descriptor),
        }
    }

    fn write_descriptor(&mut self, descriptor: DescriptorAddress, value: Vec<u8>) {
        match self {
            Self::Real(real) => real.write_descriptor(descriptor, value),
            Self::Fake(fake) => fake.write_descriptor(descriptor, value),
        }
    }
}
