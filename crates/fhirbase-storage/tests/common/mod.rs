//! In-memory stand-in for the FHIRbase stored functions.
//!
//! Implements just enough of the store's behavior to drive the client end to
//! end: versioned resources with soft delete, history, simple search, atomic
//! transactions, existence checks and the indexing/introspection functions.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fhirbase_core::{Bundle, BundleEntry, BundleResponse, FhirDateTime, Resource, ResourceMeta};
use fhirbase_postgres::{FunctionCall, FunctionExecutor, RemoteCallError, ScalarValue, SqlParam};
use fhirbase_storage::FhirbaseStorage;
use serde_json::{Value, json};
use time::Duration;
use time::macros::datetime;
use url::form_urlencoded;

type CallResult = Result<ScalarValue, RemoteCallError>;

/// One stored version of a resource.
#[derive(Debug, Clone)]
struct Version {
    resource: Resource,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct State {
    /// Storage key (`Type/id`) in creation order.
    order: Vec<String>,
    /// Versions per storage key, oldest first.
    versions: HashMap<String, Vec<Version>>,
    indexes: BTreeSet<String>,
}

impl State {
    fn current(&self, key: &str) -> Option<&Version> {
        self.versions.get(key).and_then(|versions| versions.last())
    }

    fn live(&self, key: &str) -> Option<&Resource> {
        self.current(key)
            .filter(|v| !v.deleted)
            .map(|v| &v.resource)
    }
}

/// In-memory FHIRbase.
#[derive(Debug)]
pub struct MemoryFhirbase {
    state: Mutex<State>,
    version_counter: AtomicU64,
    id_counter: AtomicU64,
    tick: AtomicU64,
    calls: AtomicU64,
    offline: AtomicBool,
}

impl Default for MemoryFhirbase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFhirbase {
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            version_counter: AtomicU64::new(1),
            id_counter: AtomicU64::new(1),
            tick: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Number of function calls received so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every following call fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored versions across all resources.
    pub fn version_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.versions.values().map(Vec::len).sum()
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    fn next_id(&self) -> String {
        format!("res-{}", self.id_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Strictly increasing timestamps, one second apart.
    fn next_timestamp(&self) -> FhirDateTime {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) as i64;
        FhirDateTime(datetime!(2016-02-15 12:00:00 UTC) + Duration::seconds(tick))
    }

    fn stamp(&self, mut resource: Resource) -> Resource {
        let meta = resource.meta.take().unwrap_or_default();
        resource.meta = Some(ResourceMeta {
            version_id: Some(self.next_version()),
            last_updated: Some(self.next_timestamp()),
            ..meta
        });
        resource
    }

    fn put_version(&self, state: &mut State, resource: Resource, deleted: bool) -> Resource {
        let resource = self.stamp(resource);
        let key = storage_key(resource.type_name(), resource.id().unwrap_or_default());
        if !state.versions.contains_key(&key) {
            state.order.push(key.clone());
        }
        state.versions.entry(key).or_default().push(Version {
            resource: resource.clone(),
            deleted,
        });
        resource
    }

    fn upsert(&self, state: &mut State, mut resource: Resource) -> Resource {
        if resource.id().is_none() {
            resource.id = Some(self.next_id());
        }
        self.put_version(state, resource, false)
    }

    fn dispatch(&self, function: &str, name: &str, params: &[SqlParam]) -> CallResult {
        let fail = |reason: &str| Err(RemoteCallError::execution(name, reason));
        let mut state = self.state.lock().unwrap();

        match (function, params) {
            ("create", [SqlParam::Json(json)]) => {
                let mut resource = parse_resource(name, json)?;
                resource.id = None;
                Ok(to_json(&self.upsert(&mut state, resource)))
            }
            ("update", [SqlParam::Json(json)]) => {
                let resource = parse_resource(name, json)?;
                Ok(to_json(&self.upsert(&mut state, resource)))
            }
            ("read", [SqlParam::Text(ty), SqlParam::Text(id)]) => {
                let key = storage_key(ty, id);
                Ok(match state.current(&key) {
                    None => ScalarValue::Null,
                    Some(v) if v.deleted => not_found_outcome(&format!("{key} is deleted")),
                    Some(v) => to_json(&v.resource),
                })
            }
            ("vread", [SqlParam::Text(ty), SqlParam::Text(vid)]) => {
                let found = state
                    .versions
                    .values()
                    .flatten()
                    .find(|v| {
                        v.resource.type_name() == ty.as_str()
                            && v.resource.version_id() == Some(vid.as_str())
                    });
                Ok(found.map_or(ScalarValue::Null, |v| to_json(&v.resource)))
            }
            ("delete", [SqlParam::Text(ty), SqlParam::Text(id)]) => {
                let key = storage_key(ty, id);
                match state.live(&key).cloned() {
                    None => Ok(ScalarValue::Null),
                    Some(resource) => Ok(to_json(&self.put_version(&mut state, resource, true))),
                }
            }
            ("history", params) => {
                let (ty, id, query) = match params {
                    [SqlParam::Text(q)] => (None, None, q),
                    [SqlParam::Text(ty), SqlParam::Text(q)] => (Some(ty), None, q),
                    [SqlParam::Text(ty), SqlParam::Text(id), SqlParam::Text(q)] => {
                        (Some(ty), Some(id), q)
                    }
                    _ => return fail("function history has no such signature"),
                };
                history(&state, ty, id, query)
            }
            ("search", [SqlParam::Text(ty), SqlParam::Text(query)]) => {
                Ok(search(&state, ty, query))
            }
            ("transaction", [SqlParam::Json(json)]) => {
                let bundle: Bundle = serde_json::from_str(json)
                    .map_err(|e| RemoteCallError::execution(name, e.to_string()))?;
                let mut staged = (*state).clone();
                let response = self.apply_transaction(name, &mut staged, bundle)?;
                *state = staged;
                Ok(to_json(&response))
            }
            ("generate_tables", []) => Ok(ScalarValue::Text("generated default tables".into())),
            ("generate_tables", [SqlParam::TextArray(types)]) => Ok(ScalarValue::Text(format!(
                "generated {} tables",
                types.len()
            ))),
            ("conformance", [SqlParam::Json(cfg)]) => {
                let cfg: Value = serde_json::from_str(cfg)
                    .map_err(|e| RemoteCallError::execution(name, e.to_string()))?;
                Ok(ScalarValue::Json(json!({
                    "resourceType": "Conformance",
                    "name": "FHIRbase",
                    "version": cfg.get("version").cloned().unwrap_or(Value::Null),
                    "fhirVersion": "1.0.2",
                    "rest": [{"mode": "server"}]
                })))
            }
            ("structuredefinition", [SqlParam::Json(_), SqlParam::Text(resource)]) => {
                Ok(ScalarValue::Json(json!({
                    "resourceType": "StructureDefinition",
                    "id": resource,
                    "name": resource,
                    "url": format!("http://hl7.org/fhir/StructureDefinition/{resource}")
                })))
            }
            ("index_search_param", [SqlParam::Text(ty), SqlParam::Text(param)]) => {
                let index = index_name(ty, param);
                state.indexes.insert(index.clone());
                Ok(ScalarValue::Text(format!("CREATE INDEX {index}")))
            }
            ("drop_index_search_param", [SqlParam::Text(ty), SqlParam::Text(param)]) => {
                let dropped = state.indexes.remove(&index_name(ty, param));
                Ok(ScalarValue::Int(i64::from(dropped)))
            }
            ("index_resource", [SqlParam::Text(ty)]) => {
                let created: Vec<String> = ["name", "identifier"]
                    .iter()
                    .map(|param| index_name(ty, param))
                    .collect();
                state.indexes.extend(created.iter().cloned());
                Ok(ScalarValue::TextArray(created))
            }
            ("drop_resource_indexes", [SqlParam::Text(ty)]) => {
                let prefix = format!("{}_", ty.to_lowercase());
                let before = state.indexes.len();
                state.indexes.retain(|index| !index.starts_with(&prefix));
                Ok(ScalarValue::Int((before - state.indexes.len()) as i64))
            }
            ("index_all_resources", []) => {
                let types: BTreeSet<String> = state
                    .order
                    .iter()
                    .filter_map(|key| key.split('/').next())
                    .map(str::to_string)
                    .collect();
                let created: Vec<String> =
                    types.iter().map(|ty| index_name(ty, "name")).collect();
                state.indexes.extend(created.iter().cloned());
                Ok(ScalarValue::TextArray(created))
            }
            ("drop_all_resource_indexes", []) => {
                let dropped = state.indexes.len() as i64;
                state.indexes.clear();
                Ok(ScalarValue::Int(dropped))
            }
            ("admin_disk_usage_top", [SqlParam::Int(limit)]) => {
                let rows: Vec<Value> = state
                    .order
                    .iter()
                    .take(usize::try_from(*limit).unwrap_or(0))
                    .map(|key| json!({"relname": key, "size": "8192 bytes"}))
                    .collect();
                Ok(ScalarValue::Text(Value::Array(rows).to_string()))
            }
            ("is_exists", [SqlParam::Text(ty), SqlParam::Text(id)]) => {
                Ok(ScalarValue::Bool(state.live(&storage_key(ty, id)).is_some()))
            }
            ("is_deleted", [SqlParam::Text(ty), SqlParam::Text(id)]) => Ok(ScalarValue::Bool(
                state
                    .current(&storage_key(ty, id))
                    .is_some_and(|v| v.deleted),
            )),
            ("is_latest", [SqlParam::Text(ty), SqlParam::Text(id), SqlParam::Text(vid)]) => {
                Ok(ScalarValue::Bool(
                    state
                        .current(&storage_key(ty, id))
                        .is_some_and(|v| v.resource.version_id() == Some(vid.as_str())),
                ))
            }
            _ => fail(&format!("function {name} with {} arguments does not exist", params.len())),
        }
    }

    /// Validates every entry before applying any of them.
    fn apply_transaction(
        &self,
        name: &str,
        state: &mut State,
        bundle: Bundle,
    ) -> Result<Bundle, RemoteCallError> {
        let reject = |reason: String| RemoteCallError::execution(name, reason);

        for (i, entry) in bundle.entry.iter().enumerate() {
            let request = entry
                .request
                .as_ref()
                .ok_or_else(|| reject(format!("entry {i} has no request")))?;
            match request.method.as_str() {
                "POST" | "PUT" if entry.resource.is_none() => {
                    return Err(reject(format!("entry {i} has no resource")));
                }
                "POST" | "PUT" => {}
                "DELETE" => {
                    if state.live(&request.url).is_none() {
                        return Err(reject(format!("entry {i}: {} not found", request.url)));
                    }
                }
                other => return Err(reject(format!("entry {i}: unsupported method {other}"))),
            }
        }

        let mut response = Bundle::new("transaction-response");
        for entry in bundle.entry {
            let (Some(request), resource) = (entry.request, entry.resource) else {
                continue;
            };
            let (stored, status) = match (request.method.as_str(), resource) {
                ("POST", Some(mut resource)) => {
                    resource.id = None;
                    (Some(self.upsert(state, resource)), "201 Created")
                }
                ("PUT", Some(resource)) => (Some(self.upsert(state, resource)), "200 OK"),
                _ => {
                    if let Some(resource) = state.live(&request.url).cloned() {
                        self.put_version(state, resource, true);
                    }
                    (None, "204 No Content")
                }
            };
            let location = stored
                .as_ref()
                .and_then(|r| r.id().map(|id| storage_key(r.type_name(), id)));
            response.entry.push(BundleEntry {
                resource: stored,
                response: Some(BundleResponse {
                    status: Some(status.to_string()),
                    location,
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FunctionExecutor for MemoryFhirbase {
    async fn invoke(&self, call: &FunctionCall) -> CallResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteCallError::connection(call.name(), "connection refused"));
        }
        let function = call
            .name()
            .rsplit_once('.')
            .map_or(call.name(), |(_, function)| function);
        self.dispatch(function, call.name(), call.params())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// A client over a fresh in-memory store.
pub fn storage() -> (FhirbaseStorage, Arc<MemoryFhirbase>) {
    let fhirbase = Arc::new(MemoryFhirbase::new());
    (FhirbaseStorage::new(fhirbase.clone()), fhirbase)
}

/// Installs a test subscriber so `RUST_LOG` shows client logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn patient(family: &str, given: &str) -> Resource {
    Resource::new("Patient")
        .with_field("name", json!([{"family": family, "given": [given]}]))
        .unwrap()
}

fn storage_key(ty: &str, id: &str) -> String {
    format!("{ty}/{id}")
}

fn index_name(ty: &str, param: &str) -> String {
    format!("{}_{param}_idx", ty.to_lowercase())
}

fn parse_resource(name: &str, json: &str) -> Result<Resource, RemoteCallError> {
    serde_json::from_str(json).map_err(|e| RemoteCallError::execution(name, e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> ScalarValue {
    ScalarValue::Json(serde_json::to_value(value).unwrap())
}

fn not_found_outcome(diagnostics: &str) -> ScalarValue {
    ScalarValue::Json(json!({
        "resourceType": "OperationOutcome",
        "issue": [{"severity": "error", "code": "not-found", "diagnostics": diagnostics}]
    }))
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Newest version first, like FHIRbase.
fn history(state: &State, ty: Option<&String>, id: Option<&String>, query: &str) -> CallResult {
    let mut count = None;
    let mut since = None;
    for (key, value) in query_pairs(query) {
        match key.as_str() {
            "_count" => count = value.parse::<usize>().ok(),
            "_since" => since = value.parse::<FhirDateTime>().ok(),
            _ => {}
        }
    }

    let mut versions: Vec<&Resource> = state
        .order
        .iter()
        .filter(|key| {
            let (key_ty, key_id) = key.split_once('/').unwrap_or_default();
            ty.is_none_or(|ty| ty == key_ty) && id.is_none_or(|id| id == key_id)
        })
        .flat_map(|key| state.versions[key].iter().map(|v| &v.resource))
        .filter(|r| since.is_none_or(|since| r.last_updated().is_some_and(|t| *t > since)))
        .collect();
    versions.sort_by(|a, b| b.last_updated().cmp(&a.last_updated()));
    versions.truncate(count.unwrap_or(usize::MAX));

    Ok(to_json(&bundle_of("history", versions.into_iter().cloned())))
}

/// Matches `key=value` against a top-level string, a top-level array of
/// strings or objects, or a field of the objects in any top-level array.
fn matches(resource: &Resource, key: &str, value: &str) -> bool {
    let is_value = |v: &Value| v.as_str() == Some(value);
    let in_object = |v: &Value| v.as_object().is_some_and(|o| o.values().any(is_value));

    if let Some(field) = resource.field(key) {
        return match field {
            Value::Array(items) => items.iter().any(|item| is_value(item) || in_object(item)),
            other => is_value(other),
        };
    }
    resource.data.values().any(|field| {
        field.as_array().is_some_and(|items| {
            items.iter().any(|item| {
                item.get(key).is_some_and(|v| {
                    is_value(v) || v.as_array().is_some_and(|vs| vs.iter().any(is_value))
                })
            })
        })
    })
}

/// Live resources of `ty` in creation order.
fn search(state: &State, ty: &str, query: &str) -> ScalarValue {
    let pairs = query_pairs(query);
    let count = pairs
        .iter()
        .find(|(k, _)| k == "_count")
        .and_then(|(_, v)| v.parse::<usize>().ok());

    let found: Vec<Resource> = state
        .order
        .iter()
        .filter(|key| key.split_once('/').is_some_and(|(key_ty, _)| key_ty == ty))
        .filter_map(|key| state.live(key))
        .filter(|r| {
            pairs
                .iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .all(|(k, v)| matches(r, k, v))
        })
        .take(count.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    to_json(&bundle_of("searchset", found))
}

fn bundle_of(bundle_type: &str, resources: impl IntoIterator<Item = Resource>) -> Bundle {
    let mut bundle = Bundle::new(bundle_type);
    bundle.entry = resources.into_iter().map(BundleEntry::with_resource).collect();
    bundle.total = Some(bundle.entry.len() as u64);
    bundle
}
