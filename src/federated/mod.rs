// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Federated resources: the host-cluster template objects and everything the
//! sync controller derives from them.

pub mod accessor;
pub mod placement;
pub mod render;
pub mod versions;

pub use accessor::KubeFederatedAccessor;
pub use versions::{KubeVersionStore, VersionStore};

use crate::config::Config;
use crate::constants::{annotations, FINALIZER};
use crate::diagnostics::{Diagnostics, EventKind};
use crate::error::Result;
use crate::types::{ClusterSnapshot, QualifiedName, VersionMap};
use crate::types::version::PropagatedVersionSpec;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error};

/// The federated type handled by a controller instance and the type it
/// propagates to member clusters
#[derive(Clone, Debug)]
pub struct TypeConfig {
    pub federated: ApiResource,
    pub target: ApiResource,
}

impl TypeConfig {
    pub fn new(
        federated_api_version: &str,
        federated_kind: &str,
        target_api_version: &str,
        target_kind: &str,
    ) -> Self {
        Self {
            federated: api_resource(federated_api_version, federated_kind),
            target: api_resource(target_api_version, target_kind),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.federated_api_version,
            &config.federated_kind,
            &config.target_api_version,
            &config.target_kind,
        )
    }

    pub fn target_is_namespace(&self) -> bool {
        self.target.group.is_empty() && self.target.kind == "Namespace"
    }

    /// Name of the member cluster object managed by a federated resource.
    /// A federated namespace lives inside the namespace it federates.
    pub fn target_name(&self, federated: &QualifiedName) -> QualifiedName {
        if self.target_is_namespace() {
            QualifiedName::cluster_scoped(federated.namespace.clone())
        } else {
            federated.clone()
        }
    }

    /// Name of the federated resource managing a member cluster object
    pub fn federated_name(&self, target: &QualifiedName) -> QualifiedName {
        if self.target_is_namespace() {
            QualifiedName::new(target.name.clone(), target.name.clone())
        } else {
            target.clone()
        }
    }
}

fn api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind))
}

/// Result of resolving a qualified name to a federated resource
pub enum ResourceLookup {
    Found(Box<FederatedResource>),
    /// The federated resource is gone but member clusters may still hold
    /// labeled copies of the named target
    PossibleOrphan(QualifiedName),
    Absent,
}

/// Resolves qualified names to federated resources
#[async_trait]
pub trait FederatedResourceAccessor: Send + Sync {
    fn has_synced(&self) -> bool;

    async fn federated_resource(&self, name: &QualifiedName) -> Result<ResourceLookup>;

    /// Whether the federated resource is currently known
    fn contains(&self, name: &QualifiedName) -> bool;

    /// Names of every federated resource currently known
    fn federated_names(&self) -> Vec<QualifiedName>;
}

/// Client for federated resources in the host cluster.
/// Writes based on a stale object fail with `SyncError::Conflict`.
#[async_trait]
pub trait HostClient: Send + Sync {
    async fn get(&self, name: &QualifiedName) -> Result<Option<DynamicObject>>;

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject>;
}

/// A federated resource for the duration of one reconcile
pub struct FederatedResource {
    object: DynamicObject,
    type_config: TypeConfig,
    host_namespace_uid: Option<String>,
    recorded_versions: Option<PropagatedVersionSpec>,
    versions: Arc<dyn VersionStore>,
    diagnostics: Diagnostics,
}

impl FederatedResource {
    pub fn new(
        object: DynamicObject,
        type_config: TypeConfig,
        host_namespace_uid: Option<String>,
        recorded_versions: Option<PropagatedVersionSpec>,
        versions: Arc<dyn VersionStore>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            object,
            type_config,
            host_namespace_uid,
            recorded_versions,
            versions,
            diagnostics,
        }
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut DynamicObject {
        &mut self.object
    }

    pub fn set_object(&mut self, object: DynamicObject) {
        self.object = object;
    }

    pub fn federated_kind(&self) -> &str {
        &self.type_config.federated.kind
    }

    pub fn federated_name(&self) -> QualifiedName {
        QualifiedName::of(&self.object)
    }

    pub fn target_kind(&self) -> &str {
        &self.type_config.target.kind
    }

    pub fn target_name(&self) -> QualifiedName {
        self.type_config.target_name(&self.federated_name())
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(self.type_config.federated.api_version.clone()),
            kind: Some(self.type_config.federated.kind.clone()),
            name: self.object.metadata.name.clone(),
            namespace: self.object.metadata.namespace.clone(),
            uid: self.object.metadata.uid.clone(),
            resource_version: self.object.metadata.resource_version.clone(),
            ..Default::default()
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.object.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.object.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Add the sync finalizer, returning whether the object changed
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.object.finalizers_mut().push(FINALIZER.to_string());
        true
    }

    /// Remove the sync finalizer, returning whether the object changed
    pub fn remove_finalizer(&mut self) -> bool {
        if !self.has_finalizer() {
            return false;
        }
        self.object.finalizers_mut().retain(|f| f != FINALIZER);
        true
    }

    /// Whether managed copies should be detached rather than deleted
    pub fn orphan_requested(&self) -> bool {
        self.object
            .annotations()
            .get(annotations::ORPHAN)
            .is_some_and(|v| v == "true")
    }

    pub fn compute_placement(&self, clusters: &[ClusterSnapshot]) -> Result<BTreeSet<String>> {
        let directive = placement::Placement::from_object(&self.object)?;
        directive.select(clusters)
    }

    /// Render the object that should exist in the given cluster
    pub fn object_for_cluster(&self, cluster: &str) -> Result<DynamicObject> {
        render::render_for_cluster(
            &self.object,
            &self.type_config.target,
            &self.target_name(),
            cluster,
        )
    }

    /// Version of the template, bumped by the API server on every spec change
    pub fn template_version(&self) -> String {
        self.object.metadata.generation.unwrap_or_default().to_string()
    }

    /// Version last written to a cluster, if it was written for the current template
    pub fn version_for_cluster(&self, cluster: &str) -> Option<String> {
        self.current_versions().get(cluster).cloned()
    }

    fn current_versions(&self) -> VersionMap {
        match &self.recorded_versions {
            Some(recorded) if recorded.template_version == self.template_version() => {
                recorded.version_map()
            }
            _ => VersionMap::new(),
        }
    }

    /// Persist the versions written to the selected clusters
    pub async fn update_versions(
        &mut self,
        selected: &BTreeSet<String>,
        updated: &VersionMap,
    ) -> Result<()> {
        let merged = merge_versions(&self.current_versions(), selected, updated);
        let spec = PropagatedVersionSpec::new(&self.template_version(), &merged);
        if self.recorded_versions.as_ref() == Some(&spec) {
            return Ok(());
        }

        debug!(
            "Recording versions for {} {}: {:?}",
            self.federated_kind(),
            self.federated_name(),
            merged
        );
        self.versions
            .update(self.federated_kind(), &self.federated_name(), &spec)
            .await?;
        self.recorded_versions = Some(spec);
        Ok(())
    }

    /// Forget recorded versions, logging failures since versions are advisory
    pub async fn delete_versions(&mut self) {
        if let Err(e) = self
            .versions
            .delete(self.federated_kind(), &self.federated_name())
            .await
        {
            self.diagnostics.handle_error(
                &format!(
                    "Failed to delete propagated versions for {} {}",
                    self.federated_kind(),
                    self.federated_name()
                ),
                e,
            );
        }
        self.recorded_versions = None;
    }

    /// UID of the host cluster namespace, when the target type is `Namespace`
    pub fn host_namespace_uid(&self) -> Option<&str> {
        if self.type_config.target_is_namespace() {
            self.host_namespace_uid.as_deref()
        } else {
            None
        }
    }

    /// Whether a member object is the host cluster's own copy of a federated namespace.
    /// The sync controller never deletes such namespaces.
    pub fn is_namespace_in_host_cluster(&self, cluster_obj: &DynamicObject) -> bool {
        is_host_namespace(self.host_namespace_uid(), cluster_obj)
    }

    /// Log an error and publish it as a warning event on the federated resource
    pub async fn record_error(&self, reason: &str, err: impl Display) {
        let message = err.to_string();
        error!(
            "{} {}: {}: {}",
            self.federated_kind(),
            self.federated_name(),
            reason,
            message
        );
        self.diagnostics
            .record_event(&self.object_reference(), EventKind::Warning, reason, &message)
            .await;
    }
}

/// Whether `obj` is the namespace with the given host cluster UID
pub fn is_host_namespace(host_namespace_uid: Option<&str>, obj: &DynamicObject) -> bool {
    host_namespace_uid.is_some() && obj.metadata.uid.as_deref() == host_namespace_uid
}

/// Versions for the selected clusters, preferring those written in this round
pub fn merge_versions(
    previous: &VersionMap,
    selected: &BTreeSet<String>,
    updated: &VersionMap,
) -> VersionMap {
    selected
        .iter()
        .filter_map(|cluster| {
            updated
                .get(cluster)
                .or_else(|| previous.get(cluster))
                .map(|version| (cluster.clone(), version.clone()))
        })
        .collect()
}
