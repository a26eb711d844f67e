//! Versioned FHIR resource access over FHIRbase.
//!
//! FHIRbase keeps FHIR resources in PostgreSQL and exposes create, read,
//! versioned read, update, delete, history, search and transactions as
//! stored functions. [`FhirbaseStorage`] wraps each of them in a typed async
//! operation: parameters are encoded, exactly one function is invoked and
//! its result decoded into resources or bundles.
//!
//! # Example
//!
//! ```ignore
//! use fhirbase_storage::prelude::*;
//!
//! # async fn example() -> StorageResult<()> {
//! let config = PostgresConfig::resolve("FHIRBASE_URL")?;
//! let storage = FhirbaseStorage::connect(&config)?;
//!
//! let created = storage
//!     .create(&Resource::new("Patient").with_field("active", serde_json::json!(true))?)
//!     .await?;
//! let key = ResourceKey::of(&created)?;
//! let current = storage.read(&key).await?;
//!
//! let smiths = storage
//!     .search("Patient", &SearchParameters::by("name", "Smith"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`storage`]: the [`FhirbaseStorage`] client
//! - [`functions`]: names of the stored functions it invokes
//! - [`params`]: history and search parameter serialization
//! - [`error`]: [`StorageError`] and its categories

pub mod error;
pub mod functions;
pub mod params;
pub mod storage;

pub use error::{ErrorCategory, StorageError};
pub use functions::{FHIR_SCHEMA, FhirFunction};
pub use params::{HistoryParameters, SearchParameters};
pub use storage::FhirbaseStorage;

pub use fhirbase_core::{
    Bundle, BundleEntry, Conformance, FhirDateTime, OperationOutcome, Resource, ResourceKey,
    ResourceMeta, StructureDefinition, TypedResource,
};
pub use fhirbase_postgres::{DynExecutor, FunctionExecutor, PostgresConfig};

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::{
        Bundle, FhirbaseStorage, HistoryParameters, PostgresConfig, Resource, ResourceKey,
        SearchParameters, StorageError, StorageResult, TypedResource,
    };
}
