use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::Serialize;
use uuid::Uuid;

/// A GATT UUID paired with an optional human-readable name.
///
/// Equality and hashing only consider the UUID; the name is cosmetic.
#[derive(Debug, Clone, Serialize)]
pub struct Identifier {
    uuid: Uuid,
    name: Option<String>,
}

impl Identifier {
    /// Creates an identifier.
    #[must_use]
    pub fn new(uuid: Uuid, name: Option<String>) -> Self {
        Self { uuid, name }
    }

    /// Creates an identifier without a name.
    #[must_use]
    pub fn unnamed(uuid: Uuid) -> Self {
        Self { uuid, name: None }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.uuid),
            None => write!(f, "{}", self.uuid),
        }
    }
}
