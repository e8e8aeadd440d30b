use serde::Serialize;
use strum_macros::Display;

use crate::error::{DiscoveryScope, DispatchError};
use crate::gatt::{Characteristic, Peripheral, Service};

/// Coarse discovery progress of one peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiscoveryState {
    #[strum(to_string = "awaiting services")]
    AwaitingServices,
    #[strum(
        to_string = "discovering ({pending_services} services, {pending_characteristics} characteristics pending)"
    )]
    Discovering {
        pending_services: usize,
        pending_characteristics: usize,
    },
    #[strum(to_string = "ready")]
    Ready,
}

/// Owns the completion-flag transitions and the once-only ready decision.
#[derive(Debug, Default)]
pub struct DiscoveryTracker {
    ready_signalled: bool,
}

impl DiscoveryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns a rediscovery error when the flag is already set.
    pub fn mark_services_discovered(&self, peripheral: &mut Peripheral) -> Result<(), DispatchError> {
        if peripheral.services_discovered() {
            return Err(DispatchError::Rediscovered {
                scope: DiscoveryScope::Services,
                name: peripheral.name().to_string(),
            });
        }
        peripheral.set_services_discovered();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a rediscovery error when the flag is already set.
    pub fn mark_characteristics_discovered(&self, service: &mut Service) -> Result<(), DispatchError> {
        if service.characteristics_discovered() {
            return Err(DispatchError::Rediscovered {
                scope: DiscoveryScope::Characteristics,
                name: service.id().to_string(),
            });
        }
        service.set_characteristics_discovered();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a rediscovery error when the flag is already set.
    pub fn mark_descriptors_discovered(
        &self,
        characteristic: &mut Characteristic,
    ) -> Result<(), DispatchError> {
        if characteristic.descriptors_discovered() {
            return Err(DispatchError::Rediscovered {
                scope: DiscoveryScope::Descriptors,
                name: characteristic.id().to_string(),
            });
        }
        characteristic.set_descriptors_discovered();
        Ok(())
    }

    /// Returns `true` the first time the whole tree is complete, and never again.
    pub fn ready_transition(&mut self, peripheral: &Peripheral) -> bool {
        if self.ready_signalled || !peripheral.discovery_completed() {
            return false;
        }
        self.ready_signalled = true;
        true
    }

    #[must_use]
    pub fn ready_signalled(&self) -> bool {
        self.ready_signalled
    }

    #[must_use]
    pub fn state(peripheral: &Peripheral) -> DiscoveryState {
        if !peripheral.services_discovered() {
            return DiscoveryState::AwaitingServices;
        }
        if peripheral.discovery_completed() {
            return DiscoveryState::Ready;
        }

        let pending_services = peripheral
            .services()
            .iter()
            .filter(|service| !service.characteristics_discovered())
            .count();
        let pending_characteristics = peripheral
            .services()
            .iter()
            .flat_map(Service::characteristics)
            .filter(|characteristic| !characteristic.discovery_completed())
            .count();
        DiscoveryState::Discovering {
            pending_services,
            pending_characteristics,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::gatt::PeripheralId;

    #[test]
    fn ready_transition_fires_once() {
        let mut tracker = DiscoveryTracker::new();
        let mut peripheral = Peripheral::new(PeripheralId::new("AA:BB"), "clock");
        assert_eq!(false, tracker.ready_transition(&peripheral));
        assert_eq!(DiscoveryState::AwaitingServices, DiscoveryTracker::state(&peripheral));

        tracker
            .mark_services_discovered(&mut peripheral)
            .expect("first mark should succeed");

        assert_eq!(true, tracker.ready_transition(&peripheral));
        assert_eq!(false, tracker.ready_transition(&peripheral));
        assert_eq!(DiscoveryState::Ready, DiscoveryTracker::state(&peripheral));
    }

    #[test]
    fn marking_twice_is_a_violation() {
        let tracker = DiscoveryTracker::new();
        let mut peripheral = Peripheral::new(PeripheralId::new("AA:BB"), "clock");
        tracker
            .mark_services_discovered(&mut peripheral)
            .expect("first mark should succeed");

        assert_matches!(
            tracker.mark_services_discovered(&mut peripheral),
            Err(DispatchError::Rediscovered {
                scope: DiscoveryScope::Services,
                ..
            })
        );
    }
}
