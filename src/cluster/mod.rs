// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Access to member clusters: the cluster list, cached target objects and
//! per-cluster clients.

pub mod informer;

pub use informer::KubeClusterRegistry;

use crate::error::Result;
use crate::types::{ClusterSnapshot, QualifiedName};
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::sync::Arc;

/// Client for the target type in a single member cluster.
/// Reads are authoritative, they never go through a cache.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(&self, name: &QualifiedName) -> Result<Option<DynamicObject>>;

    /// Fails with `SyncError::AlreadyExists` when the object is already present
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Deleting an object that is already gone succeeds
    async fn delete(&self, name: &QualifiedName) -> Result<()>;
}

/// View of the registered member clusters and their cached target objects
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Whether the cluster list has been populated
    fn clusters_synced(&self) -> bool;

    fn get_clusters(&self) -> Result<Vec<ClusterSnapshot>>;

    fn get_ready_clusters(&self) -> Result<Vec<ClusterSnapshot>> {
        Ok(self
            .get_clusters()?
            .into_iter()
            .filter(|c| c.ready)
            .collect())
    }

    /// Whether the target object caches of the given clusters are populated
    fn target_caches_synced(&self, clusters: &[ClusterSnapshot]) -> bool;

    /// Last observed copy of the target object in a cluster, if any
    fn cached_object(&self, cluster: &str, name: &QualifiedName) -> Result<Option<DynamicObject>>;

    async fn client_for_cluster(&self, cluster: &str) -> Result<Arc<dyn ClusterClient>>;
}
