use uuid::Uuid;

use super::PeripheralSubscription;
use crate::identifier::Identifier;

/// A discovered characteristic admitted by the subscription.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicMatch {
    pub id: Identifier,
    pub discover_descriptors: bool,
}

impl PeripheralSubscription {
    /// Matches a discovered service against the subscribed services.
    #[must_use]
    pub fn match_service(&self, uuid: Uuid) -> Option<Identifier> {
        self.service(uuid).map(super::ServiceSubscription::id)
    }

    /// Matches a discovered characteristic of `service_uuid`.
    ///
    /// Characteristics without their own entry are admitted only when the service allows any
    /// characteristic, in which case their descriptors are always discovered.
    #[must_use]
    pub fn match_characteristic(&self, service_uuid: Uuid, uuid: Uuid) -> Option<CharacteristicMatch> {
        let service = self.service(service_uuid)?;
        match service.characteristic(uuid) {
            Some(characteristic) => Some(CharacteristicMatch {
                id: characteristic.id(),
                discover_descriptors: characteristic.discover_descriptors(),
            }),
            None if service.allow_any_characteristic() => Some(CharacteristicMatch {
                id: Identifier::unnamed(uuid),
                discover_descriptors: true,
            }),
            None => None,
        }
    }

    /// Descriptors are never filtered by the subscription.
    #[must_use]
    pub fn match_descriptor(uuid: Uuid) -> Identifier {
        Identifier::unnamed(uuid)
    }

    /// Service UUIDs to scope the initial discovery request to.
    #[must_use]
    pub fn service_scope(&self) -> Vec<Uuid> {
        self.services().iter().map(super::ServiceSubscription::uuid).collect()
    }

    /// Characteristic UUIDs to scope discovery of one service to; `None` requests all.
    #[must_use]
    pub fn characteristic_scope(&self, service_uuid: Uuid) -> Option<Vec<Uuid>> {
        let service = self.service(service_uuid)?;
        if service.allow_any_characteristic() {
            return None;
        }
        Some(
            service
                .characteristics()
                .iter()
                .map(super::CharacteristicSubscription::uuid)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::subscription::{CharacteristicSubscription, ServiceSubscription};

    const SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
    const OPEN_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
    const MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
    const LOCATION: Uuid = Uuid::from_u128(0x00002a38_0000_1000_8000_00805f9b34fb);
    const UNKNOWN: Uuid = Uuid::from_u128(0xdead_beef);

    fn subscription() -> PeripheralSubscription {
        let heart_rate = ServiceSubscription::builder()
            .uuid(SERVICE)
            .name("Heart Rate")
            .characteristics(vec![
                CharacteristicSubscription::builder()
                    .uuid(MEASUREMENT)
                    .name("Measurement")
                    .discover_descriptors(true)
                    .build(),
                CharacteristicSubscription::builder().uuid(LOCATION).build(),
            ])
            .build()
            .expect("heart rate service should build");
        let device_info = ServiceSubscription::builder()
            .uuid(OPEN_SERVICE)
            .allow_any_characteristic(true)
            .build()
            .expect("device info service should build");
        PeripheralSubscription::new(vec![heart_rate, device_info])
            .expect("subscription should build")
    }

    #[test]
    fn match_service_returns_named_identifier() {
        let id = subscription()
            .match_service(SERVICE)
            .expect("subscribed service should match");
        assert_eq!(Some("Heart Rate"), id.name());
        assert_eq!(None, subscription().match_service(UNKNOWN));
    }

    #[rstest]
    #[case(SERVICE, MEASUREMENT, Some(true))]
    #[case(SERVICE, LOCATION, Some(false))]
    #[case(SERVICE, UNKNOWN, None)]
    #[case(OPEN_SERVICE, UNKNOWN, Some(true))]
    #[case(UNKNOWN, MEASUREMENT, None)]
    fn match_characteristic_applies_descriptor_policy(
        #[case] service: Uuid,
        #[case] characteristic: Uuid,
        #[case] expected_discover_descriptors: Option<bool>,
    ) {
        let matched = subscription().match_characteristic(service, characteristic);
        assert_eq!(
            expected_discover_descriptors,
            matched.map(|found| found.discover_descriptors)
        );
    }

    #[test]
    fn characteristic_scope_is_open_for_wildcard_services() {
        let subscription = subscription();
        assert_eq!(
            Some(vec![MEASUREMENT, LOCATION]),
            subscription.characteristic_scope(SERVICE)
        );
        assert_eq!(None, subscription.characteristic_scope(OPEN_SERVICE));
        assert_eq!(vec![SERVICE, OPEN_SERVICE], subscription.service_scope());
    }
}
