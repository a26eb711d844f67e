//! Checked narrowing from [`Resource`] to concrete resource types.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::{Bundle, Resource, ResourceMeta};

/// A concrete FHIR resource type the client can narrow to.
///
/// Narrowing is checked: a resource whose `resourceType` differs from
/// [`TypedResource::RESOURCE_TYPE`] fails with [`CoreError::TypeMismatch`]
/// instead of being coerced.
pub trait TypedResource: Serialize + DeserializeOwned {
    const RESOURCE_TYPE: &'static str;

    fn from_resource(resource: Resource) -> Result<Self> {
        if resource.resource_type != Self::RESOURCE_TYPE {
            return Err(CoreError::type_mismatch(
                Self::RESOURCE_TYPE,
                resource.resource_type,
            ));
        }
        let value =
            serde_json::to_value(resource).map_err(|e| CoreError::encode(Self::RESOURCE_TYPE, e))?;
        serde_json::from_value(value).map_err(|e| CoreError::decode(Self::RESOURCE_TYPE, e))
    }

    fn into_resource(self) -> Result<Resource> {
        let value =
            serde_json::to_value(self).map_err(|e| CoreError::encode(Self::RESOURCE_TYPE, e))?;
        serde_json::from_value(value).map_err(|e| CoreError::decode("resource", e))
    }
}

impl TypedResource for Bundle {
    const RESOURCE_TYPE: &'static str = "Bundle";
}

/// Declares a typed resource with a fixed `resourceType` and a flattened
/// remainder.
macro_rules! typed_resource {
    ($(#[$attr:meta])* $name:ident, $type_name:literal { $($(#[$field_attr:meta])* $field:ident : $ty:ty),* $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
        pub struct $name {
            #[serde(rename = "resourceType")]
            pub resource_type: String,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub id: Option<String>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub meta: Option<ResourceMeta>,
            $(
                $(#[$field_attr])*
                pub $field: $ty,
            )*
            #[serde(flatten)]
            pub extra: BTreeMap<String, Value>,
        }

        impl TypedResource for $name {
            const RESOURCE_TYPE: &'static str = $type_name;
        }
    };
}

typed_resource!(
    /// The store's capability statement (`Conformance` in DSTU2).
    Conformance, "Conformance" {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "fhirVersion", default, skip_serializing_if = "Option::is_none")]
        fhir_version: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rest: Vec<Value>,
    }
);

typed_resource!(
    /// Structure definition of a single resource type.
    StructureDefinition, "StructureDefinition" {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Value>,
    }
);

typed_resource!(
    /// Error or warning report produced by the store instead of a resource.
    OperationOutcome, "OperationOutcome" {
        #[serde(default)]
        issue: Vec<Value>,
    }
);

impl OperationOutcome {
    /// Code of the first issue, e.g. `not-found`.
    pub fn code(&self) -> Option<&str> {
        self.issue.first()?.get("code")?.as_str()
    }

    /// Human readable summary of all issues.
    pub fn diagnostics(&self) -> String {
        self.issue
            .iter()
            .filter_map(|issue| {
                issue
                    .get("diagnostics")
                    .or_else(|| issue.get("details").and_then(|d| d.get("text")))
                    .and_then(Value::as_str)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_not_found(&self) -> bool {
        self.issue
            .iter()
            .any(|issue| issue.get("code").and_then(Value::as_str) == Some("not-found"))
    }
}
