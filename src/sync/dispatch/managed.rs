// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Propagation of a federated resource: create, update and remove its copies
//! while tracking per-cluster status and written versions.

use super::{OperationDispatcher, Recorder, UnmanagedDispatcher, WaitOutcome};
use crate::cluster::{ClusterClient, ClusterRegistry};
use crate::constants::labels;
use crate::error::SyncError;
use crate::federated::render::retain_cluster_fields;
use crate::federated::FederatedResource;
use crate::types::{PropagationStatus, PropagationStatusMap, QualifiedName, VersionMap};
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct ManagedDispatcher {
    unmanaged: UnmanagedDispatcher,
    recorder: Recorder,
    target_name: QualifiedName,
    skip_adopting_resources: bool,
}

impl ManagedDispatcher {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        timeout: Duration,
        target_name: QualifiedName,
        skip_adopting_resources: bool,
    ) -> Self {
        let recorder = Recorder::default();
        Self {
            unmanaged: UnmanagedDispatcher::with_recorder(
                OperationDispatcher::new(registry, timeout),
                target_name.clone(),
                recorder.clone(),
            ),
            recorder,
            target_name,
            skip_adopting_resources,
        }
    }

    pub async fn record_cluster_error(
        &self,
        cluster: &str,
        status: PropagationStatus,
        err: impl std::fmt::Display,
    ) {
        self.recorder.record_error(cluster, status, err).await;
    }

    pub async fn record_status(&self, cluster: &str, status: PropagationStatus) {
        self.recorder.record_status(cluster, status).await;
    }

    /// Render the object for `cluster` or record why it could not be rendered
    async fn render(&mut self, fed: &FederatedResource, cluster: &str) -> Option<DynamicObject> {
        match fed.object_for_cluster(cluster) {
            Ok(obj) => Some(obj),
            Err(e) => {
                self.recorder
                    .record_error(cluster, PropagationStatus::ComputeResourceFailed, e)
                    .await;
                self.unmanaged.core_mut().record_failure();
                None
            }
        }
    }

    #[instrument(skip(self, fed), fields(resource = %self.target_name))]
    pub async fn create(&mut self, fed: &FederatedResource, cluster: &str) {
        let Some(desired) = self.render(fed, cluster).await else {
            return;
        };
        self.recorder
            .record_status(cluster, PropagationStatus::CreationTimedOut)
            .await;

        let recorder = self.recorder.clone();
        let target_kind = fed.target_kind().to_string();
        let skip_adopting = self.skip_adopting_resources;
        let cluster_name = cluster.to_string();
        self.unmanaged.core_mut().dispatch(cluster, move |client| async move {
            let client = match client {
                Ok(c) => c,
                Err(e) => {
                    recorder
                        .record_error(&cluster_name, PropagationStatus::ClientRetrievalFailed, e)
                        .await;
                    return false;
                }
            };
            match client.create(&desired).await {
                Ok(created) => {
                    recorder
                        .record_version(&cluster_name, created.resource_version().unwrap_or_default())
                        .await;
                    true
                }
                Err(e) if e.is_already_exists() => {
                    if skip_adopting {
                        recorder
                            .record_error(
                                &cluster_name,
                                PropagationStatus::AlreadyExists,
                                "resource pre-exists in cluster",
                            )
                            .await;
                        return false;
                    }
                    adopt(client, &recorder, &cluster_name, &target_kind, desired).await
                }
                Err(e) => {
                    recorder
                        .record_error(&cluster_name, PropagationStatus::CreationFailed, e)
                        .await;
                    false
                }
            }
        });
    }

    /// Bring the copy in `cluster` in line with the template unless the
    /// recorded version shows it is already current
    #[instrument(skip(self, fed, cluster_obj), fields(resource = %self.target_name))]
    pub async fn update(&mut self, fed: &FederatedResource, cluster: &str, cluster_obj: DynamicObject) {
        let recorded = fed.version_for_cluster(cluster);
        if let Some(version) = recorded.filter(|v| !needs_update(&cluster_obj, Some(v.as_str()))) {
            debug!("{} in cluster {} is current", self.target_name, cluster);
            self.recorder.record_version(cluster, version).await;
            return;
        }

        let Some(mut desired) = self.render(fed, cluster).await else {
            return;
        };
        retain_cluster_fields(fed.target_kind(), &mut desired, &cluster_obj);
        self.recorder
            .record_status(cluster, PropagationStatus::UpdateTimedOut)
            .await;

        let recorder = self.recorder.clone();
        let cluster_name = cluster.to_string();
        self.unmanaged.core_mut().dispatch(cluster, move |client| async move {
            let client = match client {
                Ok(c) => c,
                Err(e) => {
                    recorder
                        .record_error(&cluster_name, PropagationStatus::ClientRetrievalFailed, e)
                        .await;
                    return false;
                }
            };
            write_update(client.as_ref(), &recorder, &cluster_name, &desired).await
        });
    }

    pub async fn delete(&mut self, cluster: &str) {
        self.unmanaged.delete(cluster).await;
    }

    pub async fn remove_managed_label(&mut self, cluster: &str, cluster_obj: DynamicObject) {
        self.unmanaged.remove_managed_label(cluster, cluster_obj).await;
    }

    /// Join the dispatched operations; results arriving after this are dropped
    pub async fn wait(&mut self) -> WaitOutcome {
        let outcome = self.unmanaged.wait().await;
        self.recorder.close().await;
        outcome
    }

    pub async fn status_map(&self) -> PropagationStatusMap {
        self.recorder.status_map().await
    }

    pub async fn version_map(&self) -> VersionMap {
        self.recorder.version_map().await
    }
}

/// Whether the copy in a cluster differs from what was last written there
pub fn needs_update(cluster_obj: &DynamicObject, recorded_version: Option<&str>) -> bool {
    let managed = cluster_obj
        .labels()
        .get(labels::MANAGED)
        .is_some_and(|v| v == labels::MANAGED_VALUE);
    !managed || recorded_version.is_none() || cluster_obj.resource_version().as_deref() != recorded_version
}

/// Take over an existing object in place of creating it
async fn adopt(
    client: Arc<dyn ClusterClient>,
    recorder: &Recorder,
    cluster: &str,
    target_kind: &str,
    mut desired: DynamicObject,
) -> bool {
    let name = QualifiedName::of(&desired);
    let existing = match client.get(&name).await {
        Ok(Some(existing)) => existing,
        Ok(None) => {
            let err = SyncError::NotFound(format!("{} vanished while adopting it", name));
            recorder
                .record_error(cluster, PropagationStatus::CreationFailed, err)
                .await;
            return false;
        }
        Err(e) => {
            recorder
                .record_error(cluster, PropagationStatus::CreationFailed, e)
                .await;
            return false;
        }
    };

    info!("Adopting existing {} {} in cluster {}", target_kind, name, cluster);
    retain_cluster_fields(target_kind, &mut desired, &existing);
    recorder
        .record_status(cluster, PropagationStatus::UpdateTimedOut)
        .await;
    write_update(client.as_ref(), recorder, cluster, &desired).await
}

async fn write_update(
    client: &dyn ClusterClient,
    recorder: &Recorder,
    cluster: &str,
    desired: &DynamicObject,
) -> bool {
    match client.update(desired).await {
        Ok(updated) => {
            recorder
                .record_version(cluster, updated.resource_version().unwrap_or_default())
                .await;
            true
        }
        Err(e) => {
            recorder
                .record_error(cluster, PropagationStatus::UpdateFailed, e)
                .await;
            false
        }
    }
}
