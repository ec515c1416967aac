// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-resource reconcile entry point.

use super::dispatch::ManagedDispatcher;
use super::status::{set_propagation_status, StatusRetry};
use crate::cluster::ClusterRegistry;
use crate::config::Config;
use crate::constants::reasons;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::federated::{
    is_host_namespace, FederatedResource, FederatedResourceAccessor, HostClient, ResourceLookup,
};
use crate::types::{AggregateReason, PropagationStatus, QualifiedName};
use kube::api::DynamicObject;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Outcome of one reconcile, consumed by the retry scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconciliationStatus {
    AllOk,
    Error,
    /// Caches are not populated yet
    NotSynced,
    /// Progress was made but the resource needs another look
    NeedsRecheck,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SyncSettings {
    pub update_timeout: Duration,
    pub skip_adopting_resources: bool,
    pub status_retry: StatusRetry,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            update_timeout: config.timing.update_timeout,
            skip_adopting_resources: config.skip_adopting_resources,
            status_retry: StatusRetry {
                interval: config.timing.status_poll_interval,
                timeout: config.timing.status_poll_timeout,
            },
        }
    }
}

/// What a member cluster currently holds of the target object
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterCopy {
    Unready,
    Absent,
    Terminating(DynamicObject),
    /// The host cluster's own namespace, seen through a member cluster
    HostNamespace(DynamicObject),
    Present(DynamicObject),
}

impl ClusterCopy {
    pub fn observe(cached: Option<DynamicObject>, host_namespace_uid: Option<&str>) -> Self {
        match cached {
            None => ClusterCopy::Absent,
            Some(obj) if obj.metadata.deletion_timestamp.is_some() => ClusterCopy::Terminating(obj),
            Some(obj) if is_host_namespace(host_namespace_uid, &obj) => ClusterCopy::HostNamespace(obj),
            Some(obj) => ClusterCopy::Present(obj),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClusterAction {
    Skip,
    Record(PropagationStatus),
    Create,
    Update(DynamicObject),
    Delete,
    RemoveManagedLabel(DynamicObject),
}

/// Decide the operation for one cluster from its selection and current copy
pub fn decide_cluster_action(selected: bool, copy: ClusterCopy) -> ClusterAction {
    match (selected, copy) {
        (true, ClusterCopy::Unready) => ClusterAction::Record(PropagationStatus::ClusterNotReady),
        (false, ClusterCopy::Unready) => ClusterAction::Skip,
        (true, ClusterCopy::Absent) => ClusterAction::Create,
        (false, ClusterCopy::Absent) => ClusterAction::Skip,
        (
            true,
            ClusterCopy::Terminating(obj) | ClusterCopy::HostNamespace(obj) | ClusterCopy::Present(obj),
        ) => ClusterAction::Update(obj),
        (false, ClusterCopy::Terminating(_)) => {
            ClusterAction::Record(PropagationStatus::WaitingForRemoval)
        }
        (false, ClusterCopy::HostNamespace(obj)) => ClusterAction::RemoveManagedLabel(obj),
        (false, ClusterCopy::Present(_)) => ClusterAction::Delete,
    }
}

/// Propagates federated resources of one type to member clusters
pub struct SyncController {
    pub(super) registry: Arc<dyn ClusterRegistry>,
    pub(super) accessor: Arc<dyn FederatedResourceAccessor>,
    pub(super) host: Arc<dyn HostClient>,
    pub(super) diagnostics: Diagnostics,
    pub(super) settings: SyncSettings,
}

impl SyncController {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        accessor: Arc<dyn FederatedResourceAccessor>,
        host: Arc<dyn HostClient>,
        diagnostics: Diagnostics,
        settings: SyncSettings,
    ) -> Self {
        Self {
            registry,
            accessor,
            host,
            diagnostics,
            settings,
        }
    }

    pub fn accessor(&self) -> &Arc<dyn FederatedResourceAccessor> {
        &self.accessor
    }

    /// Whether every cache a reconcile reads from has been populated
    pub fn is_synced(&self) -> bool {
        if !self.accessor.has_synced() {
            debug!("Federated resources not synced");
            return false;
        }
        if !self.registry.clusters_synced() {
            debug!("Cluster list not synced");
            return false;
        }
        match self.registry.get_ready_clusters() {
            Ok(clusters) => self.registry.target_caches_synced(&clusters),
            Err(e) => {
                self.diagnostics
                    .handle_error("Failed to get ready clusters", e);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &QualifiedName) -> ReconciliationStatus {
        if !self.is_synced() {
            return ReconciliationStatus::NotSynced;
        }

        let lookup = match self.accessor.federated_resource(name).await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.diagnostics
                    .handle_error(&format!("Failed to retrieve federated resource {}", name), e);
                return ReconciliationStatus::Error;
            }
        };

        let mut fed = match lookup {
            ResourceLookup::Found(fed) => *fed,
            ResourceLookup::PossibleOrphan(target) => {
                info!("Removing the label from resources previously managed as {}", target);
                return match self.remove_managed_label(&target).await {
                    Ok(()) => ReconciliationStatus::AllOk,
                    Err(e) => {
                        self.diagnostics.handle_error(
                            &format!("Failed to remove the managed label from {}", target),
                            e,
                        );
                        ReconciliationStatus::Error
                    }
                };
            }
            ResourceLookup::Absent => return ReconciliationStatus::AllOk,
        };

        debug!("Starting to reconcile {} {}", fed.federated_kind(), name);

        if fed.is_deleting() {
            return self.ensure_deletion(&mut fed).await;
        }

        if let Err(e) = self.ensure_finalizer(&mut fed).await {
            fed.record_error(reasons::ENSURE_FINALIZER_ERROR, e).await;
            return ReconciliationStatus::Error;
        }

        self.sync_to_clusters(&mut fed).await
    }

    async fn ensure_finalizer(&self, fed: &mut FederatedResource) -> Result<()> {
        if !fed.add_finalizer() {
            return Ok(());
        }
        debug!("Adding finalizer to {} {}", fed.federated_kind(), fed.federated_name());
        let updated = self.host.update(fed.object()).await?;
        fed.set_object(updated);
        Ok(())
    }

    /// Create, update or remove copies so they match the placement of `fed`
    async fn sync_to_clusters(&self, fed: &mut FederatedResource) -> ReconciliationStatus {
        let clusters = match self.registry.get_clusters() {
            Ok(clusters) => clusters,
            Err(e) => {
                return self
                    .fail_propagation(fed, AggregateReason::ClusterRetrievalFailed, e)
                    .await;
            }
        };

        let selected = match fed.compute_placement(&clusters) {
            Ok(selected) => selected,
            Err(e) => {
                return self
                    .fail_propagation(fed, AggregateReason::ComputePlacementFailed, e)
                    .await;
            }
        };

        let target = fed.target_name();
        debug!(
            "Ensuring {} {} in clusters: {:?}",
            fed.target_kind(),
            target,
            selected
        );

        let mut dispatcher = ManagedDispatcher::new(
            self.registry.clone(),
            self.settings.update_timeout,
            target.clone(),
            self.settings.skip_adopting_resources,
        );

        for cluster in &clusters {
            let copy = if cluster.ready {
                match self.registry.cached_object(&cluster.name, &target) {
                    Ok(cached) => ClusterCopy::observe(cached, fed.host_namespace_uid()),
                    Err(e) => {
                        dispatcher
                            .record_cluster_error(
                                &cluster.name,
                                PropagationStatus::CachedRetrievalFailed,
                                e,
                            )
                            .await;
                        continue;
                    }
                }
            } else {
                ClusterCopy::Unready
            };

            match decide_cluster_action(selected.contains(&cluster.name), copy) {
                ClusterAction::Skip => {}
                ClusterAction::Record(status) => dispatcher.record_status(&cluster.name, status).await,
                ClusterAction::Create => dispatcher.create(fed, &cluster.name).await,
                ClusterAction::Update(obj) => dispatcher.update(fed, &cluster.name, obj).await,
                ClusterAction::Delete => dispatcher.delete(&cluster.name).await,
                ClusterAction::RemoveManagedLabel(obj) => {
                    dispatcher.remove_managed_label(&cluster.name, obj).await
                }
            }
        }

        let outcome = dispatcher.wait().await;
        if let Some(e) = outcome.timeout {
            fed.record_error(reasons::OPERATION_TIMEOUT_ERROR, e).await;
        }

        let versions = dispatcher.version_map().await;
        if let Err(e) = fed.update_versions(&selected, &versions).await {
            self.diagnostics.handle_error(
                &format!(
                    "Failed to record propagated versions for {} {}",
                    fed.federated_kind(),
                    fed.federated_name()
                ),
                e,
            );
        }

        let statuses = dispatcher.status_map().await;
        set_propagation_status(
            self.host.as_ref(),
            &self.diagnostics,
            self.settings.status_retry,
            fed,
            AggregateReason::AggregateSuccess,
            Some(&statuses),
        )
        .await
    }

    /// Report a failure that stopped propagation before any cluster was touched
    async fn fail_propagation(
        &self,
        fed: &mut FederatedResource,
        reason: AggregateReason,
        err: impl fmt::Display,
    ) -> ReconciliationStatus {
        fed.record_error(&reason.to_string(), err).await;
        set_propagation_status(
            self.host.as_ref(),
            &self.diagnostics,
            self.settings.status_retry,
            fed,
            reason,
            None,
        )
        .await;
        ReconciliationStatus::Error
    }
}
