//! Query parameters for history and search.
//!
//! Both serialize to `application/x-www-form-urlencoded` text, the form the
//! stored functions parse. Serialization is deterministic for a given
//! parameter set, and an empty set serializes to the empty string.

use fhirbase_core::FhirDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// `_count` and `_since` for history queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryParameters {
    /// Maximum number of entries to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Only include versions updated after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<FhirDateTime>,
}

impl HistoryParameters {
    /// No restrictions: the full history.
    pub const EMPTY: HistoryParameters = HistoryParameters {
        count: None,
        since: None,
    };

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn since(mut self, since: FhirDateTime) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count.is_none() && self.since.is_none()
    }

    /// Serializes as `_count=..&_since=..`, omitting absent parameters.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if let Some(count) = self.count {
            serializer.append_pair("_count", &count.to_string());
        }
        if let Some(since) = &self.since {
            serializer.append_pair("_since", &since.to_string());
        }
        serializer.finish()
    }
}

impl fmt::Display for HistoryParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Search filters as key/value pairs.
///
/// Keys serialize in sorted order; repeated values for one key keep the order
/// they were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl SearchParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter set with a single filter.
    #[must_use]
    pub fn by(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().with_param(key, value)
    }

    /// Adds a search parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Values of `key`, in insertion order.
    pub fn get(&self, key: &str) -> &[String] {
        self.parameters.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Serializes as a query string, e.g. `family=Smith&given=Al`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.parameters {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }
}

impl fmt::Display for SearchParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |params, (k, v)| params.with_param(k, v))
    }
}
