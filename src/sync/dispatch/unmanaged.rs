// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Teardown operations: deleting copies and detaching them from federation.

use super::{OperationDispatcher, Recorder, WaitOutcome};
use crate::cluster::ClusterRegistry;
use crate::constants::labels;
use crate::types::{PropagationStatus, QualifiedName};
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Deletes or unlabels the target object in member clusters without tracking versions
pub struct UnmanagedDispatcher {
    core: OperationDispatcher,
    target_name: QualifiedName,
    /// Statuses go here when teardown is part of propagation, otherwise errors are only logged
    recorder: Option<Recorder>,
}

impl UnmanagedDispatcher {
    pub fn new(registry: Arc<dyn ClusterRegistry>, timeout: Duration, target_name: QualifiedName) -> Self {
        Self {
            core: OperationDispatcher::new(registry, timeout),
            target_name,
            recorder: None,
        }
    }

    pub(super) fn with_recorder(
        core: OperationDispatcher,
        target_name: QualifiedName,
        recorder: Recorder,
    ) -> Self {
        Self {
            core,
            target_name,
            recorder: Some(recorder),
        }
    }

    pub(super) fn core_mut(&mut self) -> &mut OperationDispatcher {
        &mut self.core
    }

    pub async fn delete(&mut self, cluster: &str) {
        if let Some(r) = &self.recorder {
            r.record_status(cluster, PropagationStatus::DeletionTimedOut)
                .await;
        }
        let recorder = self.recorder.clone();
        let name = self.target_name.clone();
        let cluster_name = cluster.to_string();
        self.core.dispatch(cluster, move |client| async move {
            let client = match client {
                Ok(c) => c,
                Err(e) => {
                    report(&recorder, &cluster_name, PropagationStatus::ClientRetrievalFailed, e).await;
                    return false;
                }
            };
            match client.delete(&name).await {
                Ok(()) => {
                    debug!("Deleted {} from cluster {}", name, cluster_name);
                    if let Some(r) = &recorder {
                        r.clear_status(&cluster_name).await;
                    }
                    true
                }
                Err(e) => {
                    report(&recorder, &cluster_name, PropagationStatus::DeletionFailed, e).await;
                    false
                }
            }
        });
    }

    /// Detach `cluster_obj` from federation by removing the managed label
    pub async fn remove_managed_label(&mut self, cluster: &str, cluster_obj: DynamicObject) {
        if let Some(r) = &self.recorder {
            r.record_status(cluster, PropagationStatus::LabelRemovalTimedOut)
                .await;
        }
        let recorder = self.recorder.clone();
        let cluster_name = cluster.to_string();
        self.core.dispatch(cluster, move |client| async move {
            let client = match client {
                Ok(c) => c,
                Err(e) => {
                    report(&recorder, &cluster_name, PropagationStatus::ClientRetrievalFailed, e).await;
                    return false;
                }
            };
            match client.update(&without_managed_label(cluster_obj)).await {
                Ok(_) => {
                    if let Some(r) = &recorder {
                        r.record_status(&cluster_name, PropagationStatus::Ok).await;
                    }
                    true
                }
                Err(e) => {
                    report(&recorder, &cluster_name, PropagationStatus::LabelRemovalFailed, e).await;
                    false
                }
            }
        });
    }

    pub async fn wait(&mut self) -> WaitOutcome {
        self.core.wait().await
    }
}

async fn report(
    recorder: &Option<Recorder>,
    cluster: &str,
    status: PropagationStatus,
    err: crate::error::SyncError,
) {
    match recorder {
        Some(r) => r.record_error(cluster, status, err).await,
        None => error!("Cluster {}: {}: {}", cluster, status, err),
    }
}

pub fn without_managed_label(mut obj: DynamicObject) -> DynamicObject {
    obj.labels_mut().remove(labels::MANAGED);
    obj
}
