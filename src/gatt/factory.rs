use super::tree::{Characteristic, CharacteristicPath, Descriptor, PeripheralId, Service, ServiceIndex};
use crate::dispatch::Handle;
use crate::identifier::Identifier;

/// Builds entity-tree nodes from transport handles and matched identifiers.
///
/// Nodes start with every completion flag cleared. Implementations must not issue any
/// transport requests; the dispatcher does that after attaching the node.
pub trait EntityFactory {
    fn make_service(&self, handle: Handle, id: Identifier, parent: &PeripheralId) -> Service {
        Service::new(handle, id, parent.clone())
    }

    fn make_characteristic(
        &self,
        handle: Handle,
        id: Identifier,
        parent: ServiceIndex,
    ) -> Characteristic {
        Characteristic::new(handle, id, parent)
    }

    fn make_descriptor(
        &self,
        handle: Handle,
        id: Identifier,
        parent: CharacteristicPath,
    ) -> Descriptor {
        Descriptor::new(handle, id, parent)
    }
}

/// Factory producing plain entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntityFactory;

impl EntityFactory for DefaultEntityFactory {}

#[cfg(test)]
mod tests {
    use btleplug::api::bleuuid::uuid_from_u16;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::gatt::Peripheral;

    #[test]
    fn default_factory_builds_undiscovered_nodes() {
        let factory = DefaultEntityFactory;
        let mut peripheral = Peripheral::new(PeripheralId::new("fake"), "Sensor");
        let battery = Identifier::new(uuid_from_u16(0x180f), Some("Battery".to_string()));

        let service = factory.make_service(Handle::new(1), battery.clone(), peripheral.id());
        assert_eq!(&battery, service.id());
        assert_eq!(peripheral.id(), service.peripheral());
        assert_eq!(false, service.characteristics_discovered());

        let index = peripheral.push_service(service);
        let characteristic = factory.make_characteristic(
            Handle::new(2),
            Identifier::new(uuid_from_u16(0x2a19), None),
            index,
        );
        assert_eq!(index, characteristic.service());
        assert_eq!(Handle::new(2), characteristic.handle());
        assert_eq!(false, characteristic.descriptors_discovered());
        assert_eq!(None, characteristic.value());
    }
}
