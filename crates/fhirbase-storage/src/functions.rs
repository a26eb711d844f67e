//! The FHIRbase stored-function surface.

use std::fmt;

/// Schema holding every FHIRbase function.
pub const FHIR_SCHEMA: &str = "fhir";

/// Stored functions invoked by [`crate::FhirbaseStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FhirFunction {
    Create,
    Read,
    VRead,
    Update,
    Delete,
    History,
    Search,
    GenerateTables,
    Conformance,
    StructureDefinition,
    Transaction,
    IndexSearchParam,
    DropIndexSearchParam,
    IndexResource,
    DropResourceIndexes,
    IndexAllResources,
    DropAllResourceIndexes,
    AdminDiskUsageTop,
    IsExists,
    IsDeleted,
    IsLatest,
}

impl FhirFunction {
    pub const ALL: [FhirFunction; 21] = [
        Self::Create,
        Self::Read,
        Self::VRead,
        Self::Update,
        Self::Delete,
        Self::History,
        Self::Search,
        Self::GenerateTables,
        Self::Conformance,
        Self::StructureDefinition,
        Self::Transaction,
        Self::IndexSearchParam,
        Self::DropIndexSearchParam,
        Self::IndexResource,
        Self::DropResourceIndexes,
        Self::IndexAllResources,
        Self::DropAllResourceIndexes,
        Self::AdminDiskUsageTop,
        Self::IsExists,
        Self::IsDeleted,
        Self::IsLatest,
    ];

    /// Unqualified function name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::VRead => "vread",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::History => "history",
            Self::Search => "search",
            Self::GenerateTables => "generate_tables",
            Self::Conformance => "conformance",
            Self::StructureDefinition => "structuredefinition",
            Self::Transaction => "transaction",
            Self::IndexSearchParam => "index_search_param",
            Self::DropIndexSearchParam => "drop_index_search_param",
            Self::IndexResource => "index_resource",
            Self::DropResourceIndexes => "drop_resource_indexes",
            Self::IndexAllResources => "index_all_resources",
            Self::DropAllResourceIndexes => "drop_all_resource_indexes",
            Self::AdminDiskUsageTop => "admin_disk_usage_top",
            Self::IsExists => "is_exists",
            Self::IsDeleted => "is_deleted",
            Self::IsLatest => "is_latest",
        }
    }

    /// Looks up a function by its unqualified name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for FhirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
