use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use uuid::Uuid;

use crate::dispatch::{CharacteristicAddress, DescriptorAddress, Handle};
use crate::identifier::Identifier;

/// A failure reported by the BLE transport for one request.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum TransportError {
    #[error("{message}")]
    Platform { message: String },
    #[error("the peripheral is disconnected")]
    Disconnected,
    #[error("the transport has no attribute with handle {handle}")]
    UnknownHandle { handle: Handle },
}

impl From<btleplug::Error> for TransportError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::NotConnected => Self::Disconnected,
            other => Self::Platform {
                message: other.to_string(),
            },
        }
    }
}

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The transport reported a discovery or operation failure.
    #[strum(to_string = "transport")]
    Transport,
    /// The peripheral disagreed with the subscription.
    #[strum(to_string = "anomaly")]
    Anomaly,
    /// A completion flag that was already set was reported again.
    #[strum(to_string = "rediscovery")]
    Rediscovery,
    /// A callback referenced a handle with no entity behind it.
    #[strum(to_string = "lookup_miss")]
    LookupMiss,
}

/// The tree level a discovery completion belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub enum DiscoveryScope {
    #[strum(to_string = "peripheral services")]
    Services,
    #[strum(to_string = "service characteristics")]
    Characteristics,
    #[strum(to_string = "characteristic descriptors")]
    Descriptors,
}

/// Errors surfaced on the outward peripheral event stream.
///
/// None of these end the session; later callbacks are still processed.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum DispatchError {
    #[error("cannot discover services of peripheral `{peripheral}`")]
    PeripheralDiscovery {
        peripheral: String,
        source: TransportError,
    },
    #[error("cannot discover characteristics of service {service}")]
    ServiceDiscovery {
        service: Identifier,
        source: TransportError,
    },
    #[error("cannot discover descriptors of characteristic {characteristic}")]
    CharacteristicDiscovery {
        characteristic: Identifier,
        source: TransportError,
    },
    #[error("service discovery reported service {uuid} which does not match the subscription")]
    UnrecognizedService { uuid: Uuid },
    #[error(
        "characteristic discovery for service {service} reported characteristic {uuid} which does not match the subscription"
    )]
    UnrecognizedCharacteristic { service: Identifier, uuid: Uuid },
    #[error("the subscription specifies services but service discovery reported none")]
    MissingServices,
    #[error(
        "the subscription specifies characteristics for service {service} but discovery reported none"
    )]
    MissingCharacteristics { service: Identifier },
    #[error("{scope} of `{name}` were rediscovered")]
    Rediscovered { scope: DiscoveryScope, name: String },
    #[error("a callback referenced unknown service handle {handle}")]
    UnknownService { handle: Handle },
    #[error("a callback referenced unknown characteristic {address}")]
    UnknownCharacteristic { address: CharacteristicAddress },
    #[error("a callback referenced unknown descriptor {address}")]
    UnknownDescriptor { address: DescriptorAddress },
}

impl DispatchError {
    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PeripheralDiscovery { .. }
            | Self::ServiceDiscovery { .. }
            | Self::CharacteristicDiscovery { .. } => ErrorKind::Transport,
            Self::UnrecognizedService { .. }
            | Self::UnrecognizedCharacteristic { .. }
            | Self::MissingServices
            | Self::MissingCharacteristics { .. } => ErrorKind::Anomaly,
            Self::Rediscovered { .. } => ErrorKind::Rediscovery,
            Self::UnknownService { .. }
            | Self::UnknownCharacteristic { .. }
            | Self::UnknownDescriptor { .. } => ErrorKind::LookupMiss,
        }
    }
}

/// The kind of a pending entity operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    #[strum(to_string = "read")]
    Read,
    #[strum(to_string = "write")]
    Write,
    #[strum(to_string = "notification state change")]
    Notify,
}

/// Errors resolving a pending characteristic or descriptor operation.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum OperationError {
    #[error("a {operation} is already pending on {entity}")]
    Busy {
        operation: OperationKind,
        entity: Identifier,
    },
    #[error("the {operation} failed")]
    Transport {
        operation: OperationKind,
        source: TransportError,
    },
    #[error("the session ended before the {operation} completed")]
    Abandoned { operation: OperationKind },
    #[error("no entity exists at {path}")]
    UnknownEntity { path: String },
}

/// Errors returned while building or loading a subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("service {uuid} is listed more than once")]
    DuplicateService { uuid: Uuid },
    #[error("characteristic {uuid} is listed more than once in service {service}")]
    DuplicateCharacteristic { service: Uuid, uuid: Uuid },
    #[error("failed to read subscription file `{}`", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("subscription document is not valid JSON")]
    Parse(#[from] serde_json::Error),
    #[error("no configuration directory is available on this platform")]
    NoConfigDirectory,
}

/// Errors returned by sessions and hardware clients.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no fake peripheral matching `{prefix}*` is configured")]
    NoMatchingFixtureDevice { prefix: String },
    #[error("the transport closed before discovery completed")]
    TransportClosed,
    #[error("discovery did not complete within {}", humantime::format_duration(*timeout))]
    DiscoveryTimedOut { timeout: Duration },
    #[error("discovery was cancelled")]
    DiscoveryCancelled,
    #[error("the peripheral is not ready; run discovery first")]
    NotReady,
    #[error("characteristic {characteristic} of service {service} is not in the entity tree")]
    UnknownCharacteristic { service: Uuid, characteristic: Uuid },
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Errors returned when parsing fake transport fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake GATT fixture is empty")]
    EmptyFixture,
    #[error("fixture records cannot contain empty fields")]
    EmptyRecordField,
    #[error("`{value}` is not a valid UUID")]
    InvalidUuid { value: String, source: uuid::Error },
    #[error("invalid hex payload")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake GATT fixture while fake mode is enabled")]
    MissingFakeGattFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DispatchError::MissingServices, ErrorKind::Anomaly)]
    #[case(DispatchError::UnknownService { handle: Handle::new(7) }, ErrorKind::LookupMiss)]
    #[case(
        DispatchError::Rediscovered { scope: DiscoveryScope::Services, name: "clock".to_string() },
        ErrorKind::Rediscovery
    )]
    #[case(
        DispatchError::PeripheralDiscovery {
            peripheral: "clock".to_string(),
            source: TransportError::Disconnected,
        },
        ErrorKind::Transport
    )]
    fn dispatch_errors_are_classified(#[case] error: DispatchError, #[case] expected: ErrorKind) {
        assert_eq!(expected, error.kind());
    }

    #[test]
    fn rediscovery_message_names_scope() {
        let error = DispatchError::Rediscovered {
            scope: DiscoveryScope::Characteristics,
            name: "Battery".to_string(),
        };
        assert_eq!(
            "service characteristics of `Battery` were rediscovered",
            error.to_string()
        );
    }
}
