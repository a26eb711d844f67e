//! Canonical JSON encoding of resources and bundles.
//!
//! Encoding is deterministic: object keys of the resource model are kept in
//! sorted order, so the same logical resource always produces the same bytes.

use serde::Serialize;
use tracing::trace;

use crate::error::{CoreError, Result};
use crate::typed::TypedResource;
use crate::{Bundle, Resource};

/// Serializes a resource, bundle or configuration document to JSON text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CoreError::encode("resource", e))
}

/// Parses JSON text into a [`Resource`].
pub fn decode(json: &str) -> Result<Resource> {
    let resource: Resource =
        serde_json::from_str(json).map_err(|e| CoreError::decode("resource", e))?;
    trace!(resource_type = %resource.resource_type, "decoded resource");
    Ok(resource)
}

/// Parses JSON text into a [`Bundle`], keeping entries in server order.
pub fn decode_bundle(json: &str) -> Result<Bundle> {
    decode(json).and_then(Bundle::from_resource)
}
