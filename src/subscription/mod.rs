mod matcher;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bon::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::identifier::Identifier;
use crate::utils;

pub use self::matcher::CharacteristicMatch;

const SUBSCRIPTION_FILE_NAME: &str = "subscription.json";

/// Expected characteristic of a subscribed service.
#[derive(Debug, Clone, Eq, PartialEq, Builder, Deserialize)]
pub struct CharacteristicSubscription {
    #[serde(deserialize_with = "short_or_full_uuid")]
    uuid: Uuid,
    #[builder(into)]
    #[serde(default)]
    name: Option<String>,
    /// Whether descriptors of this characteristic are discovered.
    #[builder(default)]
    #[serde(default)]
    discover_descriptors: bool,
}

impl CharacteristicSubscription {
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn id(&self) -> Identifier {
        Identifier::new(self.uuid, self.name.clone())
    }

    #[must_use]
    pub fn discover_descriptors(&self) -> bool {
        self.discover_descriptors
    }
}

/// Expected service and its expected characteristics.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(try_from = "RawServiceSubscription")]
pub struct ServiceSubscription {
    uuid: Uuid,
    name: Option<String>,
    characteristics: Vec<CharacteristicSubscription>,
    allow_any_characteristic: bool,
    by_uuid: HashMap<Uuid, usize>,
}

#[bon::bon]
impl ServiceSubscription {
    /// Creates a service subscription.
    ///
    /// # Errors
    ///
    /// Returns an error when two characteristics share a UUID.
    #[builder]
    pub fn new(
        uuid: Uuid,
        #[builder(into)] name: Option<String>,
        #[builder(default)] characteristics: Vec<CharacteristicSubscription>,
        #[builder(default)] allow_any_characteristic: bool,
    ) -> Result<Self, SubscriptionError> {
        let mut by_uuid = HashMap::with_capacity(characteristics.len());
        for (index, characteristic) in characteristics.iter().enumerate() {
            if by_uuid.insert(characteristic.uuid, index).is_some() {
                return Err(SubscriptionError::DuplicateCharacteristic {
                    service: uuid,
                    uuid: characteristic.uuid,
                });
            }
        }

        Ok(Self {
            uuid,
            name,
            characteristics,
            allow_any_characteristic,
            by_uuid,
        })
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn id(&self) -> Identifier {
        Identifier::new(self.uuid, self.name.clone())
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicSubscription] {
        &self.characteristics
    }

    /// Whether characteristics missing from the list are still admitted.
    #[must_use]
    pub fn allow_any_characteristic(&self) -> bool {
        self.allow_any_characteristic
    }

    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicSubscription> {
        self.by_uuid
            .get(&uuid)
            .and_then(|index| self.characteristics.get(*index))
    }
}

#[derive(Debug, Deserialize)]
struct RawServiceSubscription {
    #[serde(deserialize_with = "short_or_full_uuid")]
    uuid: Uuid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    characteristics: Vec<CharacteristicSubscription>,
    #[serde(default)]
    allow_any_characteristic: bool,
}

impl TryFrom<RawServiceSubscription> for ServiceSubscription {
    type Error = SubscriptionError;

    fn try_from(raw: RawServiceSubscription) -> Result<Self, Self::Error> {
        Self::builder()
            .uuid(raw.uuid)
            .maybe_name(raw.name)
            .characteristics(raw.characteristics)
            .allow_any_characteristic(raw.allow_any_characteristic)
            .build()
    }
}

/// The application's declaration of which services and characteristics to discover.
///
/// Immutable once built; share it between sessions with an `Arc`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct PeripheralSubscription {
    services: Vec<ServiceSubscription>,
    by_uuid: HashMap<Uuid, usize>,
}

impl PeripheralSubscription {
    /// Creates a subscription from ordered service entries.
    ///
    /// # Errors
    ///
    /// Returns an error when two services share a UUID.
    pub fn new(services: Vec<ServiceSubscription>) -> Result<Self, SubscriptionError> {
        let mut by_uuid = HashMap::with_capacity(services.len());
        for (index, service) in services.iter().enumerate() {
            if by_uuid.insert(service.uuid, index).is_some() {
                return Err(SubscriptionError::DuplicateService { uuid: service.uuid });
            }
        }
        Ok(Self { services, by_uuid })
    }

    /// Parses a JSON subscription document.
    ///
    /// ```
    /// let subscription = gatt_dispatch::PeripheralSubscription::from_json(r#"{
    ///     "services": [{
    ///         "uuid": "0000180f-0000-1000-8000-00805f9b34fb",
    ///         "name": "Battery",
    ///         "characteristics": [
    ///             { "uuid": "00002a19-0000-1000-8000-00805f9b34fb", "discover_descriptors": true }
    ///         ]
    ///     }]
    /// }"#)?;
    /// assert_eq!(1, subscription.services().len());
    /// # Ok::<(), gatt_dispatch::SubscriptionError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the document is malformed or declares duplicate UUIDs.
    pub fn from_json(document: &str) -> Result<Self, SubscriptionError> {
        let raw: RawSubscription = serde_json::from_str(document)?;
        Self::new(raw.services)
    }

    /// Loads a subscription from a file, or from the default location when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    #[instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self, SubscriptionError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_subscription_path()?,
        };
        let document = fs::read_to_string(&path).map_err(|source| SubscriptionError::Io {
            path: path.clone(),
            source,
        })?;
        let subscription = Self::from_json(&document)?;
        debug!(
            path = %path.display(),
            service_count = subscription.services.len(),
            "loaded subscription"
        );
        Ok(subscription)
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceSubscription] {
        &self.services
    }

    #[must_use]
    pub fn service(&self, uuid: Uuid) -> Option<&ServiceSubscription> {
        self.by_uuid
            .get(&uuid)
            .and_then(|index| self.services.get(*index))
    }
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    #[serde(default)]
    services: Vec<ServiceSubscription>,
}

/// Returns `<config dir>/subscription.json` for this application.
///
/// # Errors
///
/// Returns an error when the platform has no configuration directory.
pub fn default_subscription_path() -> Result<PathBuf, SubscriptionError> {
    ProjectDirs::from("", "", "gatt-dispatch")
        .map(|dirs| dirs.config_dir().join(SUBSCRIPTION_FILE_NAME))
        .ok_or(SubscriptionError::NoConfigDirectory)
}

/// Accepts `180f` as well as the full 128-bit form.
fn short_or_full_uuid<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    utils::parse_uuid(&value).map_err(serde::de::Error::custom)
}
