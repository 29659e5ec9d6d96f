//! Object identity.
//!
//! An [`ObjectRef`] names one stored object by `(container, key)` and is the
//! lookup key for the object store, the ledger and the schedule store alike.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Identifies a stored object.
///
/// Equality is exact string match on both fields. Containers may not contain
/// `/`, which keeps [`ObjectRef::storage_key`] unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawObjectRef")]
pub struct ObjectRef {
    container: String,
    key: String,
}

#[derive(Deserialize)]
struct RawObjectRef {
    container: String,
    key: String,
}

impl TryFrom<RawObjectRef> for ObjectRef {
    type Error = Error;

    fn try_from(raw: RawObjectRef) -> Result<Self> {
        Self::new(raw.container, raw.key)
    }
}

impl ObjectRef {
    /// Creates a validated object reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidObject`] if the container is empty, contains
    /// `/` or control characters, or if the key is empty or contains a NUL.
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let container = container.into();
        let key = key.into();

        if container.is_empty() {
            return Err(Error::invalid_object("container cannot be empty"));
        }
        if container.contains('/') {
            return Err(Error::invalid_object(format!(
                "container cannot contain '/': {container}"
            )));
        }
        if container.chars().any(char::is_control) {
            return Err(Error::invalid_object(format!(
                "container cannot contain control characters: {container:?}"
            )));
        }
        if key.is_empty() {
            return Err(Error::invalid_object(format!(
                "key cannot be empty (container {container})"
            )));
        }
        if key.contains('\0') {
            return Err(Error::invalid_object(format!(
                "key cannot contain NUL: {key:?}"
            )));
        }

        Ok(Self { container, key })
    }

    /// Parses the `container/key` form produced by [`ObjectRef::storage_key`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidObject`] if there is no `/` separator or either
    /// half fails validation.
    pub fn from_storage_key(storage_key: &str) -> Result<Self> {
        let (container, key) = storage_key.split_once('/').ok_or_else(|| {
            Error::invalid_object(format!("missing '/' in storage key: {storage_key}"))
        })?;
        Self::new(container, key)
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Flat key used by the ledger and schedule stores.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.container, self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}
