//! # fhirbase-core
//!
//! Resource model and JSON codec shared by the FHIRbase client crates.
//!
//! The store speaks FHIR JSON. This crate owns the shapes that cross that
//! boundary:
//!
//! - [`Resource`]: an opaque FHIR document with the handful of attributes the
//!   client needs to reason about (type, id, `meta.versionId`,
//!   `meta.lastUpdated`)
//! - [`Bundle`]: ordered entries returned by history, search and transaction
//! - [`ResourceKey`]: the `(type, id, version?)` address of a resource
//! - [`codec`]: canonical JSON encoding and decoding
//! - [`TypedResource`]: checked narrowing from [`Resource`] to concrete types

pub mod bundle;
pub mod codec;
pub mod error;
pub mod key;
pub mod resource;
pub mod time;
pub mod typed;

pub use bundle::{Bundle, BundleEntry, BundleRequest, BundleResponse};
pub use error::{CoreError, Result};
pub use key::ResourceKey;
pub use resource::{Resource, ResourceMeta};
pub use time::{FhirDateTime, now_utc};
pub use typed::{Conformance, OperationOutcome, StructureDefinition, TypedResource};
