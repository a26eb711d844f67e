//! Resource addressing.

use crate::error::{CoreError, Result};
use crate::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HISTORY_SEGMENT: &str = "_history";

/// The `(type, id, version?)` address of a resource or one of its versions.
///
/// Keys are plain values: built once by the caller and never mutated by the
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    type_name: String,
    resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_id: Option<String>,
}

impl ResourceKey {
    pub fn new(type_name: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            resource_id: resource_id.into(),
            version_id: None,
        }
    }

    pub fn versioned(
        type_name: impl Into<String>,
        resource_id: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self::new(type_name, resource_id).with_version(version_id)
    }

    #[must_use]
    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into()).filter(|vid: &String| !vid.is_empty());
        self
    }

    /// The key of `resource`, including its version when it carries one.
    pub fn of(resource: &Resource) -> Result<Self> {
        let id = resource.id().ok_or_else(|| {
            CoreError::invalid_key(format!("{} resource has no id", resource.type_name()))
        })?;
        let key = Self::new(resource.type_name(), id);
        let key = match resource.version_id() {
            Some(vid) => key.with_version(vid),
            None => key,
        };
        key.require_identity()?;
        Ok(key)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    /// Checks the key can address a resource instance: both type and id set.
    pub fn require_identity(&self) -> Result<()> {
        if self.type_name.is_empty() {
            return Err(CoreError::invalid_key("resource type is empty"));
        }
        if !is_valid_type_name(&self.type_name) {
            return Err(CoreError::invalid_key(format!(
                "'{}' is not a valid resource type",
                self.type_name
            )));
        }
        if self.resource_id.is_empty() {
            return Err(CoreError::invalid_key(format!(
                "{} key has an empty id",
                self.type_name
            )));
        }
        Ok(())
    }

    /// Returns the version id, failing when the key is not version-specific.
    pub fn require_version(&self) -> Result<&str> {
        if self.type_name.is_empty() {
            return Err(CoreError::invalid_key("resource type is empty"));
        }
        self.version_id().ok_or_else(|| {
            CoreError::invalid_key(format!("{self} does not address a specific version"))
        })
    }
}

/// Resource type names start with an uppercase letter and contain only letters.
fn is_valid_type_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_name, self.resource_id)?;
        if let Some(vid) = &self.version_id {
            write!(f, "/{HISTORY_SEGMENT}/{vid}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourceKey {
    type Err = CoreError;

    /// Parses `Type/id` or `Type/id/_history/vid`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim_matches('/').split('/').collect();
        let key = match parts.as_slice() {
            [type_name, id] => Self::new(*type_name, *id),
            [type_name, id, HISTORY_SEGMENT, vid] if !vid.is_empty() => {
                Self::versioned(*type_name, *id, *vid)
            }
            _ => {
                return Err(CoreError::invalid_key(format!(
                    "'{s}' is not a Type/id[/_history/vid] reference"
                )));
            }
        };
        key.require_identity()?;
        Ok(key)
    }
}
