//! The FHIRbase resource access API.
//!
//! Every operation is one stored-function call: build a [`FunctionCall`]
//! against the function table, attach the encoded parameters, execute once
//! and decode the scalar the store returns.

use std::fmt;
use std::sync::Arc;

use fhirbase_core::{
    Bundle, Conformance, OperationOutcome, Resource, ResourceKey, StructureDefinition,
    TypedResource, codec,
};
use fhirbase_postgres::{
    DynExecutor, FunctionCall, FunctionExecutor, PostgresConfig, PostgresExecutor,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::functions::{FHIR_SCHEMA, FhirFunction};
use crate::params::{HistoryParameters, SearchParameters};

type Result<T> = std::result::Result<T, StorageError>;

/// Client for the FHIRbase stored-function API.
///
/// Holds no per-request state: cloning is cheap and every clone may be used
/// concurrently, each call acquiring its own connection from the executor.
#[derive(Clone)]
pub struct FhirbaseStorage {
    executor: DynExecutor,
    schema: String,
}

impl fmt::Debug for FhirbaseStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FhirbaseStorage")
            .field("backend", &self.executor.backend_name())
            .field("schema", &self.schema)
            .finish()
    }
}

impl FhirbaseStorage {
    /// Creates a client over `executor`, calling functions in the `fhir`
    /// schema.
    #[must_use]
    pub fn new(executor: DynExecutor) -> Self {
        Self {
            executor,
            schema: FHIR_SCHEMA.to_string(),
        }
    }

    /// Creates a client over a PostgreSQL pool described by `config`.
    ///
    /// Connections are opened on first use, so an unreachable store surfaces
    /// from the first operation as `StorageError::RemoteCall`. Must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if `config` cannot produce a pool.
    pub fn connect(config: &PostgresConfig) -> Result<Self> {
        let executor = PostgresExecutor::connect(config)?;
        Ok(Self::new(Arc::new(executor)).with_schema(config.schema.clone()))
    }

    /// Overrides the schema the stored functions are called in.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn call(&self, function: FhirFunction) -> FunctionCall {
        FunctionCall::qualified(&self.schema, function.as_str())
    }

    async fn execute<T: fhirbase_postgres::FromScalar>(&self, call: FunctionCall) -> Result<T> {
        Ok(call.execute(self.executor.as_ref()).await?)
    }

    // ==================== CRUD ====================

    /// Creates a new resource with a server-assigned id.
    ///
    /// Returns the stored resource carrying its new id and version.
    #[instrument(skip_all, fields(resource_type = %resource.resource_type))]
    pub async fn create(&self, resource: &Resource) -> Result<Resource> {
        let json: String = self
            .execute(self.call(FhirFunction::Create).with_json(codec::encode(resource)?))
            .await?;
        let created = resource_response(&json, None)?;
        debug!(id = ?created.id(), version = ?created.version_id(), "resource created");
        Ok(created)
    }

    /// Reads the current state of the resource addressed by `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the resource does not exist.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn read(&self, key: &ResourceKey) -> Result<Resource> {
        key.require_identity()?;
        let json: Option<String> = self
            .execute(
                self.call(FhirFunction::Read)
                    .with_text(key.type_name())
                    .with_text(key.resource_id()),
            )
            .await?;
        optional_resource_response(json, key)
    }

    /// Reads the version of a resource addressed by `key.version_id()`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` if `key` carries no version and
    /// `StorageError::NotFound` if the version does not exist.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn vread(&self, key: &ResourceKey) -> Result<Resource> {
        let version_id = key.require_version()?;
        let json: Option<String> = self
            .execute(
                self.call(FhirFunction::VRead)
                    .with_text(key.type_name())
                    .with_text(version_id),
            )
            .await?;
        optional_resource_response(json, key)
    }

    /// Updates a resource by its id, creating it if it is new.
    ///
    /// The resource is sent as-is. A resource without an id is not rejected
    /// here; the store treats the call as an upsert and assigns the identity.
    #[instrument(skip_all, fields(resource_type = %resource.resource_type, id = ?resource.id()))]
    pub async fn update(&self, resource: &Resource) -> Result<Resource> {
        let json: String = self
            .execute(self.call(FhirFunction::Update).with_json(codec::encode(resource)?))
            .await?;
        let updated = resource_response(&json, None)?;
        debug!(version = ?updated.version_id(), "resource updated");
        Ok(updated)
    }

    /// Logically deletes a resource, returning its last state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the resource does not exist.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn delete(&self, key: &ResourceKey) -> Result<Resource> {
        key.require_identity()?;
        let json: Option<String> = self
            .execute(
                self.call(FhirFunction::Delete)
                    .with_text(key.type_name())
                    .with_text(key.resource_id()),
            )
            .await?;
        optional_resource_response(json, key)
    }

    /// [`FhirbaseStorage::create`] narrowed to `T`.
    pub async fn create_as<T: TypedResource>(&self, resource: T) -> Result<T> {
        let created = self.create(&resource.into_resource()?).await?;
        Ok(T::from_resource(created)?)
    }

    /// [`FhirbaseStorage::read`] narrowed to `T`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TypeMismatch` if the stored resource is not a `T`.
    pub async fn read_as<T: TypedResource>(&self, key: &ResourceKey) -> Result<T> {
        Ok(T::from_resource(self.read(key).await?)?)
    }

    /// [`FhirbaseStorage::vread`] narrowed to `T`.
    pub async fn vread_as<T: TypedResource>(&self, key: &ResourceKey) -> Result<T> {
        Ok(T::from_resource(self.vread(key).await?)?)
    }

    /// [`FhirbaseStorage::update`] narrowed to `T`.
    pub async fn update_as<T: TypedResource>(&self, resource: T) -> Result<T> {
        let updated = self.update(&resource.into_resource()?).await?;
        Ok(T::from_resource(updated)?)
    }

    /// [`FhirbaseStorage::delete`] narrowed to `T`.
    pub async fn delete_as<T: TypedResource>(&self, key: &ResourceKey) -> Result<T> {
        Ok(T::from_resource(self.delete(key).await?)?)
    }

    // ==================== History ====================

    /// History of every resource in the store.
    #[instrument(skip_all, fields(params = %params))]
    pub async fn history(&self, params: &HistoryParameters) -> Result<Bundle> {
        let json: String = self
            .execute(self.call(FhirFunction::History).with_text(params.to_query_string()))
            .await?;
        bundle_response(&json)
    }

    /// History of every resource of `resource_type`.
    #[instrument(skip_all, fields(resource_type = %resource_type, params = %params))]
    pub async fn type_history(
        &self,
        resource_type: &str,
        params: &HistoryParameters,
    ) -> Result<Bundle> {
        let json: String = self
            .execute(
                self.call(FhirFunction::History)
                    .with_text(resource_type)
                    .with_text(params.to_query_string()),
            )
            .await?;
        bundle_response(&json)
    }

    /// Every version of one resource instance.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the store reports no such instance.
    #[instrument(skip_all, fields(resource_type = %resource_type, id = %id, params = %params))]
    pub async fn instance_history(
        &self,
        resource_type: &str,
        id: &str,
        params: &HistoryParameters,
    ) -> Result<Bundle> {
        let key = ResourceKey::new(resource_type, id);
        let json: Option<String> = self
            .execute(
                self.call(FhirFunction::History)
                    .with_text(resource_type)
                    .with_text(id)
                    .with_text(params.to_query_string()),
            )
            .await?;
        match json {
            Some(json) => typed_response(&json, Some(&key)),
            None => Err(StorageError::not_found(resource_type, id)),
        }
    }

    // ==================== Search ====================

    /// Searches `resource_type` with the given filters.
    #[instrument(skip_all, fields(resource_type = %resource_type, query = %params))]
    pub async fn search(&self, resource_type: &str, params: &SearchParameters) -> Result<Bundle> {
        let json: String = self
            .execute(
                self.call(FhirFunction::Search)
                    .with_text(resource_type)
                    .with_text(params.to_query_string()),
            )
            .await?;
        let bundle = bundle_response(&json)?;
        debug!(matches = bundle.len(), "search completed");
        Ok(bundle)
    }

    // ==================== Transactions ====================

    /// Applies every entry of a transaction bundle atomically.
    ///
    /// The store applies all entries or none; a rejected transaction surfaces
    /// as a single error and nothing is retried.
    #[instrument(skip_all, fields(entries = bundle.len()))]
    pub async fn transaction(&self, bundle: &Bundle) -> Result<Bundle> {
        let json: String = self
            .execute(self.call(FhirFunction::Transaction).with_json(codec::encode(bundle)?))
            .await?;
        bundle_response(&json)
    }

    // ==================== Generation ====================

    /// Generates storage tables for the store's default resource set.
    #[instrument(skip_all)]
    pub async fn generate_tables(&self) -> Result<String> {
        self.execute(self.call(FhirFunction::GenerateTables)).await
    }

    /// Generates storage tables for the named resource types.
    #[instrument(skip_all)]
    pub async fn generate_tables_for<I, S>(&self, resources: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execute(self.call(FhirFunction::GenerateTables).with_text_array(resources))
            .await
    }

    // ==================== Conformance ====================

    /// The store's conformance statement, built from `cfg`.
    #[instrument(skip_all)]
    pub async fn conformance(&self, cfg: &Value) -> Result<Conformance> {
        let json: String = self
            .execute(self.call(FhirFunction::Conformance).with_json(codec::encode(cfg)?))
            .await?;
        typed_response(&json, None)
    }

    /// Structure definition of `resource_name`, built from `cfg`.
    #[instrument(skip_all, fields(resource_name = %resource_name))]
    pub async fn structure_definition(
        &self,
        resource_name: &str,
        cfg: &Value,
    ) -> Result<StructureDefinition> {
        let json: String = self
            .execute(
                self.call(FhirFunction::StructureDefinition)
                    .with_json(codec::encode(cfg)?)
                    .with_text(resource_name),
            )
            .await?;
        typed_response(&json, None)
    }

    // ==================== Indexing ====================

    /// Creates the index backing search parameter `name` of `resource`.
    #[instrument(skip_all, fields(resource = %resource, name = %name))]
    pub async fn index_search_param(&self, resource: &str, name: &str) -> Result<String> {
        self.execute(
            self.call(FhirFunction::IndexSearchParam)
                .with_text(resource)
                .with_text(name),
        )
        .await
    }

    /// Drops the index of search parameter `name`, returning how many were
    /// dropped.
    #[instrument(skip_all, fields(resource = %resource, name = %name))]
    pub async fn drop_index_search_param(&self, resource: &str, name: &str) -> Result<i64> {
        self.execute(
            self.call(FhirFunction::DropIndexSearchParam)
                .with_text(resource)
                .with_text(name),
        )
        .await
    }

    /// Indexes every search parameter of `resource`, returning the index names.
    #[instrument(skip_all, fields(resource = %resource))]
    pub async fn index_resource(&self, resource: &str) -> Result<Vec<String>> {
        self.execute(self.call(FhirFunction::IndexResource).with_text(resource))
            .await
    }

    #[instrument(skip_all, fields(resource = %resource))]
    pub async fn drop_resource_indexes(&self, resource: &str) -> Result<i64> {
        self.execute(self.call(FhirFunction::DropResourceIndexes).with_text(resource))
            .await
    }

    #[instrument(skip_all)]
    pub async fn index_all_resources(&self) -> Result<Vec<String>> {
        self.execute(self.call(FhirFunction::IndexAllResources)).await
    }

    #[instrument(skip_all)]
    pub async fn drop_all_resource_indexes(&self) -> Result<i64> {
        self.execute(self.call(FhirFunction::DropAllResourceIndexes))
            .await
    }

    // ==================== Admin ====================

    /// Report of the `limit` largest relations.
    #[instrument(skip_all, fields(limit = limit))]
    pub async fn admin_disk_usage_top(&self, limit: i32) -> Result<String> {
        self.execute(self.call(FhirFunction::AdminDiskUsageTop).with_int(limit))
            .await
    }

    // ==================== Resource utility ====================

    /// Whether the resource addressed by `key` exists.
    pub async fn is_exists(&self, key: &ResourceKey) -> Result<bool> {
        self.is_exists_parts(key.type_name(), key.resource_id()).await
    }

    /// Whether `resource` exists in the store.
    ///
    /// A resource without a type or id has never been stored and yields
    /// `false` without a remote call.
    pub async fn is_resource_exists(&self, resource: &Resource) -> Result<bool> {
        match resource.id() {
            Some(id) if !resource.type_name().is_empty() => {
                self.is_exists_parts(resource.type_name(), id).await
            }
            _ => Ok(false),
        }
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, id = %id))]
    pub async fn is_exists_parts(&self, resource_type: &str, id: &str) -> Result<bool> {
        ResourceKey::new(resource_type, id).require_identity()?;
        self.execute(
            self.call(FhirFunction::IsExists)
                .with_text(resource_type)
                .with_text(id),
        )
        .await
    }

    /// Whether the resource addressed by `key` has been deleted.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn is_deleted(&self, key: &ResourceKey) -> Result<bool> {
        key.require_identity()?;
        self.execute(
            self.call(FhirFunction::IsDeleted)
                .with_text(key.type_name())
                .with_text(key.resource_id()),
        )
        .await
    }

    /// Whether `key` addresses the latest version of its resource.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` if `key` carries no version.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn is_latest(&self, key: &ResourceKey) -> Result<bool> {
        key.require_identity()?;
        let version_id = key.require_version()?;
        self.execute(
            self.call(FhirFunction::IsLatest)
                .with_text(key.type_name())
                .with_text(key.resource_id())
                .with_text(version_id),
        )
        .await
    }

    /// The most recent persisted version of the resource addressed by `key`.
    ///
    /// Derived from the instance history alone: entries without a version id
    /// are skipped and the one updated last wins. Returns `None` if no
    /// versioned entry exists or the store does not know the instance.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn read_last_version(&self, key: &ResourceKey) -> Result<Option<Resource>> {
        key.require_identity()?;
        let history = self
            .instance_history(
                key.type_name(),
                key.resource_id(),
                &HistoryParameters::EMPTY,
            )
            .await;
        match history {
            Ok(history) => Ok(last_version(history)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Picks the versioned entry with the greatest `lastUpdated`.
///
/// Ties keep the entry that appears later in the bundle.
fn last_version(history: Bundle) -> Option<Resource> {
    let mut versions: Vec<Resource> = history
        .into_resources()
        .into_iter()
        .filter(Resource::has_version_id)
        .collect();
    versions.sort_by(|a, b| a.last_updated().cmp(&b.last_updated()));
    versions.pop()
}

/// Maps an OperationOutcome returned in place of a resource to an error.
fn reject_outcome(resource: Resource, key: Option<&ResourceKey>) -> Result<Resource> {
    if resource.resource_type != OperationOutcome::RESOURCE_TYPE {
        return Ok(resource);
    }
    let outcome = OperationOutcome::from_resource(resource)?;
    match key {
        Some(key) if outcome.is_not_found() => Err(StorageError::not_found(
            key.type_name(),
            key.resource_id(),
        )),
        _ => Err(StorageError::operation_outcome(
            outcome.code().unwrap_or("unknown"),
            outcome.diagnostics(),
        )),
    }
}

fn resource_response(json: &str, key: Option<&ResourceKey>) -> Result<Resource> {
    reject_outcome(codec::decode(json)?, key)
}

fn optional_resource_response(json: Option<String>, key: &ResourceKey) -> Result<Resource> {
    match json {
        Some(json) => resource_response(&json, Some(key)),
        None => Err(StorageError::not_found(key.type_name(), key.resource_id())),
    }
}

fn typed_response<T: TypedResource>(json: &str, key: Option<&ResourceKey>) -> Result<T> {
    Ok(T::from_resource(resource_response(json, key)?)?)
}

fn bundle_response(json: &str) -> Result<Bundle> {
    typed_response(json, None)
}
