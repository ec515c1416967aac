// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock HTTP service for kube clients and in-memory fakes
//! for the seams of the sync controller.

use crate::cluster::{ClusterClient, ClusterRegistry};
use crate::constants::labels;
use crate::diagnostics::{Diagnostics, EventKind, EventSink};
use crate::error::{Result as SyncResult, SyncError};
use crate::federated::{
    FederatedResource, FederatedResourceAccessor, HostClient, ResourceLookup, TypeConfig,
    VersionStore,
};
use crate::types::version::PropagatedVersionSpec;
use crate::types::{ClusterSnapshot, QualifiedName};
use async_trait::async_trait;
use http::{Request, Response};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use kube::client::Body;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for requests with the given method matching the path
    pub fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        // Try exact match first
        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Then prefix match, e.g. a status subresource below an object path
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) =
                response.unwrap_or_else(|| (404, status_json(404, "NotFound", "not found")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A Kubernetes `Status` failure body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

pub fn config_map_types() -> TypeConfig {
    TypeConfig::new("types.kubefed.io/v1beta1", "FederatedConfigMap", "v1", "ConfigMap")
}

pub fn namespace_types() -> TypeConfig {
    TypeConfig::new("types.kubefed.io/v1beta1", "FederatedNamespace", "v1", "Namespace")
}

fn metadata(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

/// A `FederatedConfigMap` at generation 1 with the given spec
pub fn federated_object(namespace: &str, name: &str, spec: serde_json::Value) -> DynamicObject {
    let resource = &config_map_types().federated;
    let mut obj = DynamicObject::new(name, resource).data(serde_json::json!({ "spec": spec }));
    obj.metadata = ObjectMeta {
        generation: Some(1),
        uid: Some("fed-uid".to_string()),
        ..metadata(namespace, name)
    };
    obj
}

/// `apps/web` as a federated resource with the given spec and recorded versions
pub fn federated_resource(
    spec: serde_json::Value,
    recorded: Option<PropagatedVersionSpec>,
) -> FederatedResource {
    let (diagnostics, _) = recording_diagnostics();
    FederatedResource::new(
        federated_object("apps", "web", spec),
        config_map_types(),
        None,
        recorded,
        Arc::new(FakeVersionStore::default()),
        diagnostics,
    )
}

/// A ConfigMap as found in a member cluster
pub fn member_object(namespace: &str, name: &str, managed: bool) -> DynamicObject {
    let resource = ApiResource::from_gvk(&GroupVersionKind::gvk("", "v1", "ConfigMap"));
    let mut obj = DynamicObject::new(name, &resource).data(serde_json::json!({ "data": { "key": "old" } }));
    obj.metadata = ObjectMeta {
        uid: Some(format!("{}-uid", name)),
        ..metadata(namespace, name)
    };
    if managed {
        obj.labels_mut()
            .insert(labels::MANAGED.to_string(), labels::MANAGED_VALUE.to_string());
    }
    obj
}

pub fn terminating(mut obj: DynamicObject) -> DynamicObject {
    obj.metadata.deletion_timestamp = Some(Time(Utc::now()));
    obj
}

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<QualifiedName, DynamicObject>,
    operations: Vec<String>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    next_version: u64,
}

impl ClusterState {
    fn store(&mut self, mut obj: DynamicObject) -> DynamicObject {
        self.next_version += 1;
        obj.metadata.resource_version = Some(format!("{}", 100 + self.next_version));
        self.objects.insert(QualifiedName::of(&obj), obj.clone());
        obj
    }
}

/// In-memory member cluster holding objects of the target type
#[derive(Default)]
pub struct FakeClusterClient {
    state: Mutex<ClusterState>,
}

impl FakeClusterClient {
    /// Place an object in the cluster, returning it with its assigned resourceVersion
    pub fn insert(&self, obj: DynamicObject) -> DynamicObject {
        self.state.lock().unwrap().store(obj)
    }

    pub fn object(&self, name: &QualifiedName) -> Option<DynamicObject> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }

    /// Make every following call of `operation` fail
    pub fn fail_on(&self, operation: &str) {
        self.state.lock().unwrap().failing.insert(operation.to_string());
    }

    /// Delay every following call
    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Calls made so far, in order
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    async fn begin(&self, operation: &str) -> SyncResult<()> {
        let (delay, failing) = {
            let mut state = self.state.lock().unwrap();
            state.operations.push(operation.to_string());
            (state.delay, state.failing.contains(operation))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(SyncError::ClusterOperation(format!("{} rejected", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get(&self, name: &QualifiedName) -> SyncResult<Option<DynamicObject>> {
        self.begin("get").await?;
        Ok(self.object(name))
    }

    async fn create(&self, obj: &DynamicObject) -> SyncResult<DynamicObject> {
        self.begin("create").await?;
        let mut state = self.state.lock().unwrap();
        let name = QualifiedName::of(obj);
        if state.objects.contains_key(&name) {
            return Err(SyncError::AlreadyExists(name.to_string()));
        }
        Ok(state.store(obj.clone()))
    }

    async fn update(&self, obj: &DynamicObject) -> SyncResult<DynamicObject> {
        self.begin("update").await?;
        let mut state = self.state.lock().unwrap();
        let name = QualifiedName::of(obj);
        if !state.objects.contains_key(&name) {
            return Err(SyncError::NotFound(name.to_string()));
        }
        Ok(state.store(obj.clone()))
    }

    async fn delete(&self, name: &QualifiedName) -> SyncResult<()> {
        self.begin("delete").await?;
        self.state.lock().unwrap().objects.remove(name);
        Ok(())
    }
}

/// Registry over fake member clusters.
///
/// Like the label-filtered member caches, the cache view only shows copies
/// carrying the managed label.
pub struct FakeRegistry {
    clusters: Mutex<Vec<ClusterSnapshot>>,
    clients: Mutex<BTreeMap<String, Arc<FakeClusterClient>>>,
    unsynced_caches: Mutex<HashSet<String>>,
    hidden: Mutex<HashSet<String>>,
    list_fails: AtomicBool,
}

impl FakeRegistry {
    pub fn new(clusters: Vec<ClusterSnapshot>) -> Self {
        Self {
            clusters: Mutex::new(clusters),
            clients: Mutex::new(BTreeMap::new()),
            unsynced_caches: Mutex::new(HashSet::new()),
            hidden: Mutex::new(HashSet::new()),
            list_fails: AtomicBool::new(false),
        }
    }

    pub fn client(&self, cluster: &str) -> Arc<FakeClusterClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(cluster.to_string())
            .or_default()
            .clone()
    }

    pub fn set_ready(&self, cluster: &str, ready: bool) {
        for snapshot in self.clusters.lock().unwrap().iter_mut() {
            if snapshot.name == cluster {
                snapshot.ready = ready;
            }
        }
    }

    pub fn set_cache_synced(&self, cluster: &str, synced: bool) {
        let mut unsynced = self.unsynced_caches.lock().unwrap();
        if synced {
            unsynced.remove(cluster);
        } else {
            unsynced.insert(cluster.to_string());
        }
    }

    /// Keep objects of `cluster` out of the cache view, as if it lagged behind
    pub fn hide_from_cache(&self, cluster: &str) {
        self.hidden.lock().unwrap().insert(cluster.to_string());
    }

    pub fn fail_cluster_list(&self) {
        self.list_fails.store(true, Ordering::SeqCst);
    }

    fn is_known(&self, cluster: &str) -> bool {
        self.clusters.lock().unwrap().iter().any(|c| c.name == cluster)
    }
}

#[async_trait]
impl ClusterRegistry for FakeRegistry {
    fn clusters_synced(&self) -> bool {
        true
    }

    fn get_clusters(&self) -> SyncResult<Vec<ClusterSnapshot>> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(SyncError::ClusterOperation("cluster list unavailable".to_string()));
        }
        Ok(self.clusters.lock().unwrap().clone())
    }

    fn target_caches_synced(&self, clusters: &[ClusterSnapshot]) -> bool {
        let unsynced = self.unsynced_caches.lock().unwrap();
        clusters.iter().all(|c| !unsynced.contains(&c.name))
    }

    fn cached_object(&self, cluster: &str, name: &QualifiedName) -> SyncResult<Option<DynamicObject>> {
        if self.hidden.lock().unwrap().contains(cluster) {
            return Ok(None);
        }
        Ok(self
            .client(cluster)
            .object(name)
            .filter(|obj| obj.labels().contains_key(labels::MANAGED)))
    }

    async fn client_for_cluster(&self, cluster: &str) -> SyncResult<Arc<dyn ClusterClient>> {
        if !self.is_known(cluster) {
            return Err(SyncError::UnknownCluster(cluster.to_string()));
        }
        Ok(self.client(cluster))
    }
}

#[derive(Default)]
struct HostState {
    object: Option<DynamicObject>,
    conflicts: usize,
    status_writes: usize,
    gets: usize,
    updates_fail: bool,
    next_version: u64,
}

impl HostState {
    fn store(&mut self, mut obj: DynamicObject) -> DynamicObject {
        self.next_version += 1;
        obj.metadata.resource_version = Some(format!("{}", 1 + self.next_version));
        self.object = Some(obj.clone());
        obj
    }
}

fn status_of(obj: &DynamicObject) -> Option<serde_json::Value> {
    obj.data.get("status").cloned()
}

fn set_status(obj: &mut DynamicObject, status: Option<serde_json::Value>) {
    if let Some(data) = obj.data.as_object_mut() {
        match status {
            Some(status) => data.insert("status".to_string(), status),
            None => data.remove("status"),
        };
    }
}

/// Host store holding a single federated object
pub struct FakeHostClient {
    state: Mutex<HostState>,
}

impl FakeHostClient {
    pub fn new(object: DynamicObject) -> Self {
        Self {
            state: Mutex::new(HostState {
                object: Some(object),
                ..Default::default()
            }),
        }
    }

    /// Reject the next `times` status writes with a conflict
    pub fn conflict_times(&self, times: usize) {
        self.state.lock().unwrap().conflicts = times;
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().updates_fail = true;
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    pub fn current(&self) -> Option<DynamicObject> {
        self.state.lock().unwrap().object.clone()
    }
}

#[async_trait]
impl HostClient for FakeHostClient {
    async fn get(&self, name: &QualifiedName) -> SyncResult<Option<DynamicObject>> {
        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        Ok(state
            .object
            .clone()
            .filter(|obj| QualifiedName::of(obj) == *name))
    }

    async fn update(&self, obj: &DynamicObject) -> SyncResult<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        if state.updates_fail {
            return Err(SyncError::ClusterOperation("update rejected".to_string()));
        }
        let mut updated = obj.clone();
        set_status(&mut updated, state.object.as_ref().and_then(status_of));
        Ok(state.store(updated))
    }

    async fn update_status(&self, obj: &DynamicObject) -> SyncResult<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        let Some(mut current) = state.object.clone() else {
            return Err(SyncError::NotFound(QualifiedName::of(obj).to_string()));
        };
        if state.conflicts > 0 {
            state.conflicts -= 1;
            // Someone else wrote in between
            state.store(current);
            return Err(SyncError::Conflict("the object has been modified".to_string()));
        }
        state.status_writes += 1;
        set_status(&mut current, status_of(obj));
        Ok(state.store(current))
    }
}

#[derive(Default)]
pub struct FakeVersionStore {
    records: Mutex<BTreeMap<QualifiedName, PropagatedVersionSpec>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl FakeVersionStore {
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following update and delete fail
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self, name: &QualifiedName) -> Option<PropagatedVersionSpec> {
        self.records.lock().unwrap().get(name).cloned()
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::ClusterOperation("version store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionStore for FakeVersionStore {
    async fn get(&self, _kind: &str, name: &QualifiedName) -> SyncResult<Option<PropagatedVersionSpec>> {
        Ok(self.recorded(name))
    }

    async fn update(&self, _kind: &str, name: &QualifiedName, spec: &PropagatedVersionSpec) -> SyncResult<()> {
        self.check_writable()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(name.clone(), spec.clone());
        Ok(())
    }

    async fn delete(&self, _kind: &str, name: &QualifiedName) -> SyncResult<()> {
        self.check_writable()?;
        self.records.lock().unwrap().remove(name);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(
        &self,
        _reference: &ObjectReference,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> SyncResult<()> {
        self.events.lock().unwrap().push(RecordedEvent {
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

pub fn recording_diagnostics() -> (Diagnostics, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::default());
    (Diagnostics::new(sink.clone()), sink)
}

/// Accessor resolving names against the object held by a [`FakeHostClient`]
pub struct FakeAccessor {
    host: Arc<FakeHostClient>,
    types: TypeConfig,
    host_namespace_uid: Option<String>,
    versions: Arc<FakeVersionStore>,
    diagnostics: Diagnostics,
    synced: AtomicBool,
    orphans: Mutex<BTreeSet<QualifiedName>>,
}

impl FakeAccessor {
    pub fn new(host: Arc<FakeHostClient>) -> Self {
        let (diagnostics, _) = recording_diagnostics();
        Self {
            host,
            types: config_map_types(),
            host_namespace_uid: None,
            versions: Arc::new(FakeVersionStore::default()),
            diagnostics,
            synced: AtomicBool::new(true),
            orphans: Mutex::new(BTreeSet::new()),
        }
    }

    /// Resolve names as federated namespaces; the host cluster's own
    /// namespace carries `host_uid`
    pub fn federating_namespaces(host: Arc<FakeHostClient>, host_uid: &str) -> Self {
        Self {
            types: namespace_types(),
            host_namespace_uid: Some(host_uid.to_string()),
            ..Self::new(host)
        }
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Resolve `name` as a resource whose federated object is gone
    pub fn mark_orphan(&self, name: QualifiedName) {
        self.orphans.lock().unwrap().insert(name);
    }

    pub fn versions(&self) -> Arc<FakeVersionStore> {
        self.versions.clone()
    }

    /// The federated resource as it is currently stored
    pub fn resource(&self) -> FederatedResource {
        let object = self.host.current().unwrap();
        let recorded = self.versions.recorded(&QualifiedName::of(&object));
        FederatedResource::new(
            object,
            self.types.clone(),
            self.host_namespace_uid.clone(),
            recorded,
            self.versions.clone(),
            self.diagnostics.clone(),
        )
    }
}

#[async_trait]
impl FederatedResourceAccessor for FakeAccessor {
    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    async fn federated_resource(&self, name: &QualifiedName) -> SyncResult<ResourceLookup> {
        if self.orphans.lock().unwrap().contains(name) {
            return Ok(ResourceLookup::PossibleOrphan(name.clone()));
        }
        if self.contains(name) {
            return Ok(ResourceLookup::Found(Box::new(self.resource())));
        }
        Ok(ResourceLookup::Absent)
    }

    fn contains(&self, name: &QualifiedName) -> bool {
        self.host
            .current()
            .is_some_and(|obj| QualifiedName::of(&obj) == *name)
    }

    fn federated_names(&self) -> Vec<QualifiedName> {
        self.host
            .current()
            .map(|obj| QualifiedName::of(&obj))
            .into_iter()
            .collect()
    }
}
