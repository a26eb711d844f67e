use crate::{Resource, ResourceKey, ResourceMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const BUNDLE: &str = "Bundle";

fn bundle_resource_type() -> String {
    BUNDLE.to_string()
}

/// An ordered collection of resources returned by history, search and
/// transaction, or submitted as a transaction.
///
/// Entry order is assigned by the store and is never rearranged by the
/// client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "resourceType", default = "bundle_resource_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One `(resource, metadata)` entry of a [`Bundle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleResponse>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `Bundle.entry.request`: the interaction a transaction entry asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BundleRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// `Bundle.entry.response`: the outcome of one transaction entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BundleEntry {
    pub fn with_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            ..Default::default()
        }
    }
}

impl Bundle {
    pub fn new(bundle_type: impl Into<String>) -> Self {
        Self {
            resource_type: bundle_resource_type(),
            id: None,
            meta: None,
            bundle_type: Some(bundle_type.into()),
            total: None,
            link: Vec::new(),
            entry: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// An empty bundle of type `transaction`.
    pub fn transaction() -> Self {
        Self::new("transaction")
    }

    /// Appends a `POST <type>` entry creating `resource`.
    pub fn push_create(&mut self, resource: Resource) {
        let url = resource.type_name().to_string();
        self.entry.push(BundleEntry {
            resource: Some(resource),
            request: Some(BundleRequest::new("POST", url)),
            ..Default::default()
        });
    }

    /// Appends a `PUT <type>/<id>` entry updating `resource`.
    pub fn push_update(&mut self, resource: Resource) {
        let url = match resource.id() {
            Some(id) => format!("{}/{id}", resource.type_name()),
            None => resource.type_name().to_string(),
        };
        self.entry.push(BundleEntry {
            resource: Some(resource),
            request: Some(BundleRequest::new("PUT", url)),
            ..Default::default()
        });
    }

    /// Appends a `DELETE <type>/<id>` entry.
    pub fn push_delete(&mut self, key: &ResourceKey) {
        self.entry.push(BundleEntry {
            request: Some(BundleRequest::new(
                "DELETE",
                format!("{}/{}", key.type_name(), key.resource_id()),
            )),
            ..Default::default()
        });
    }

    /// Resources of all entries that carry one, in entry order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entry.iter().filter_map(|entry| entry.resource.as_ref())
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.entry
            .into_iter()
            .filter_map(|entry| entry.resource)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_decoding_preserves_entry_order() {
        let bundle: Bundle = serde_json::from_value(json!({
            "resourceType": "Bundle",
            "type": "history",
            "total": 3,
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "c"}},
                {"resource": {"resourceType": "Patient", "id": "a"}},
                {"request": {"method": "DELETE", "url": "Patient/b"}}
            ]
        }))
        .unwrap();

        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.total, Some(3));
        let ids: Vec<_> = bundle.resources().filter_map(Resource::id).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(bundle.entry[2].request.as_ref().unwrap().method, "DELETE");
    }

    #[test]
    fn test_transaction_builder() {
        let mut bundle = Bundle::transaction();
        bundle.push_create(Resource::new("Patient"));
        bundle.push_update(Resource::new("Patient").with_id("7"));
        bundle.push_delete(&ResourceKey::new("Observation", "9"));

        let requests: Vec<_> = bundle
            .entry
            .iter()
            .map(|e| {
                let r = e.request.as_ref().unwrap();
                format!("{} {}", r.method, r.url)
            })
            .collect();
        assert_eq!(
            requests,
            vec!["POST Patient", "PUT Patient/7", "DELETE Observation/9"]
        );
        assert_eq!(bundle.bundle_type.as_deref(), Some("transaction"));
        assert_eq!(bundle.resources().count(), 2);
    }

    #[test]
    fn test_bundle_serializes_resource_type() {
        let value = serde_json::to_value(Bundle::new("searchset")).unwrap();
        assert_eq!(value, json!({"resourceType": "Bundle", "type": "searchset"}));
    }
}
