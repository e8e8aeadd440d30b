mod factory;
mod pending;
mod tree;

pub use self::factory::{DefaultEntityFactory, EntityFactory};
pub use self::pending::Pending;
pub use self::tree::{
    Characteristic, CharacteristicPath, Descriptor, DescriptorPath, Peripheral, PeripheralId,
    Service, ServiceIndex,
};
