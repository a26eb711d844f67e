use crate::FhirDateTime;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const RESOURCE_TYPE_KEY: &str = "resourceType";
const ID_KEY: &str = "id";
const META_KEY: &str = "meta";

/// The `meta` element of a resource.
///
/// Only `versionId` and `lastUpdated` are interpreted by the client; every
/// other meta element (profiles, tags, security labels) is carried untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(rename = "versionId", default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<FhirDateTime>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResourceMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn with_last_updated(mut self, last_updated: FhirDateTime) -> Self {
        self.last_updated = Some(last_updated);
        self
    }
}

/// A FHIR resource as exchanged with the store.
///
/// The document is schema-less from the client's point of view: apart from
/// `resourceType`, `id` and `meta`, all elements live in [`Resource::data`]
/// in key order, which keeps the JSON encoding canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    #[serde(flatten)]
    pub data: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            meta: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Builder form of [`Resource::set_field`].
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Result<Self> {
        self.set_field(key, value)?;
        Ok(self)
    }

    pub fn type_name(&self) -> &str {
        &self.resource_type
    }

    /// The logical id, treating an empty string as absent.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Sets a top-level element.
    ///
    /// `resourceType`, `id` and `meta` are stored in their typed fields, never
    /// in [`Resource::data`], so the encoded document has no duplicate keys.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Decode` if a value for one of those keys has the
    /// wrong shape.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        match key.as_str() {
            RESOURCE_TYPE_KEY => {
                self.resource_type = serde_json::from_value(value)
                    .map_err(|e| CoreError::decode(RESOURCE_TYPE_KEY, e))?;
            }
            ID_KEY => {
                self.id =
                    serde_json::from_value(value).map_err(|e| CoreError::decode(ID_KEY, e))?;
            }
            META_KEY => {
                self.meta =
                    serde_json::from_value(value).map_err(|e| CoreError::decode(META_KEY, e))?;
            }
            _ => {
                self.data.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn version_id(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.version_id.as_deref())
            .filter(|vid| !vid.is_empty())
    }

    /// Whether this resource represents a persisted version.
    pub fn has_version_id(&self) -> bool {
        self.version_id().is_some()
    }

    pub fn last_updated(&self) -> Option<&FhirDateTime> {
        self.meta.as_ref().and_then(|meta| meta.last_updated.as_ref())
    }
}
