// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Finalizer-gated teardown of federated resources.
//!
//! Each reconcile of a terminating resource walks the same state machine:
//! decide the path from the finalizer and orphan flag, act on the cached
//! copies, and only remove the finalizer after every ready cluster has been
//! confirmed clear without the cache.

use super::controller::SyncController;
use super::dispatch::{CheckUnmanagedDispatcher, UnmanagedDispatcher, WaitOutcome};
use super::ReconciliationStatus;
use crate::constants::{annotations, labels, FINALIZER};
use crate::error::{Result, SyncError};
use crate::federated::FederatedResource;
use crate::types::QualifiedName;
use kube::api::DynamicObject;
use tracing::{debug, info, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionPath {
    /// The finalizer is already gone
    NothingToDo,
    /// Detach managed copies, leaving them in place
    Orphan,
    /// Delete managed copies before releasing the finalizer
    Cascade,
}

pub fn plan_deletion(finalizer_present: bool, orphan_requested: bool) -> DeletionPath {
    match (finalizer_present, orphan_requested) {
        (false, _) => DeletionPath::NothingToDo,
        (true, true) => DeletionPath::Orphan,
        (true, false) => DeletionPath::Cascade,
    }
}

/// What to do with one cached copy during cascading deletion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeAction {
    /// Not ours to wait for: the terminating host cluster namespace
    Untracked,
    /// Deletion already in flight
    AwaitRemoval,
    Delete,
    /// The host cluster namespace is never deleted, only detached
    RemoveManagedLabel,
}

impl CascadeAction {
    /// Whether the cluster keeps the finalizer in place this round
    pub fn is_tracked(&self) -> bool {
        !matches!(self, CascadeAction::Untracked)
    }
}

pub fn decide_cascade_action(terminating: bool, host_namespace: bool) -> CascadeAction {
    match (host_namespace, terminating) {
        (true, true) => CascadeAction::Untracked,
        (false, true) => CascadeAction::AwaitRemoval,
        (true, false) => CascadeAction::RemoveManagedLabel,
        (false, false) => CascadeAction::Delete,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CascadeStep {
    /// Copies remain in the named clusters; come back later
    AwaitRemoval(Vec<String>),
    /// The cache shows nothing left; confirm against the clusters themselves
    VerifyRemoval,
}

pub fn next_cascade_step(remaining: Vec<String>) -> CascadeStep {
    if remaining.is_empty() {
        CascadeStep::VerifyRemoval
    } else {
        CascadeStep::AwaitRemoval(remaining)
    }
}

/// Evidence gathered by the uncached check across clusters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub unready_clusters: Vec<String>,
    pub all_clear: bool,
    pub timed_out: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizeDecision {
    RemoveFinalizer,
    Retry(String),
}

/// Only complete evidence releases the finalizer
pub fn finalize_decision(report: &CheckReport) -> FinalizeDecision {
    if report.timed_out {
        return FinalizeDecision::Retry("timed out checking clusters".to_string());
    }
    if !report.unready_clusters.is_empty() {
        return FinalizeDecision::Retry(format!(
            "the following clusters were not ready: {}",
            report.unready_clusters.join(", ")
        ));
    }
    if !report.all_clear {
        return FinalizeDecision::Retry("one or more checks failed".to_string());
    }
    FinalizeDecision::RemoveFinalizer
}

/// Cached copies of a target across ready clusters
#[derive(Default)]
struct CachedCopies {
    copies: Vec<(String, DynamicObject)>,
    unready: Vec<String>,
    retrieval_failures: Vec<String>,
}

impl CachedCopies {
    /// Fail when any cluster could not be inspected, after operations have run
    fn ensure_complete(&self) -> Result<()> {
        if !self.retrieval_failures.is_empty() {
            return Err(SyncError::ClusterOperation(format!(
                "failed to retrieve a managed resource for the following cluster(s): {}",
                self.retrieval_failures.join(", ")
            )));
        }
        if !self.unready.is_empty() {
            return Err(SyncError::ClusterNotReady(self.unready.join(", ")));
        }
        Ok(())
    }
}

fn timeout_as_error(outcome: &WaitOutcome) -> Result<()> {
    match &outcome.timeout {
        Some(e) => Err(SyncError::Timeout(e.to_string())),
        None => Ok(()),
    }
}

impl SyncController {
    #[instrument(skip_all, fields(resource = %fed.federated_name()))]
    pub(super) async fn ensure_deletion(&self, fed: &mut FederatedResource) -> ReconciliationStatus {
        fed.delete_versions().await;

        let kind = fed.federated_kind().to_string();
        let name = fed.federated_name();
        info!("Ensuring deletion of {} {}", kind, name);

        match plan_deletion(fed.has_finalizer(), fed.orphan_requested()) {
            DeletionPath::NothingToDo => {
                debug!("{} {} does not have the {} finalizer. Nothing to do.", kind, name, FINALIZER);
                ReconciliationStatus::AllOk
            }
            DeletionPath::Orphan => {
                info!(
                    "Found {} annotation on {} {}. Removing the finalizer.",
                    annotations::ORPHAN,
                    kind,
                    name
                );
                if let Err(e) = self.remove_finalizer(fed).await {
                    self.diagnostics.handle_error(
                        &format!("Failed to remove finalizer from {} {}", kind, name),
                        e,
                    );
                    return ReconciliationStatus::Error;
                }
                info!(
                    "Removing the label {} from resources previously managed by {} {}",
                    labels::MANAGED,
                    kind,
                    name
                );
                if let Err(e) = self.remove_managed_label(&fed.target_name()).await {
                    self.diagnostics.handle_error(
                        &format!(
                            "Failed to remove the label {} from resources previously managed by {} {}",
                            labels::MANAGED,
                            kind,
                            name
                        ),
                        e,
                    );
                }
                ReconciliationStatus::AllOk
            }
            DeletionPath::Cascade => {
                info!("Deleting resources managed by {} {} from member clusters", kind, name);
                match self.delete_from_clusters(fed).await {
                    Ok(true) => ReconciliationStatus::NeedsRecheck,
                    Ok(false) => ReconciliationStatus::AllOk,
                    Err(e) => {
                        self.diagnostics
                            .handle_error(&format!("Failed to delete {} {}", kind, name), e);
                        ReconciliationStatus::Error
                    }
                }
            }
        }
    }

    /// Detach copies of `target` from federation in every ready cluster
    #[instrument(skip(self))]
    pub(super) async fn remove_managed_label(&self, target: &QualifiedName) -> Result<()> {
        let cached = self.cached_copies(target)?;
        let mut dispatcher = self.unmanaged_dispatcher(target);
        for (cluster, obj) in &cached.copies {
            if obj.metadata.deletion_timestamp.is_some() {
                continue;
            }
            dispatcher.remove_managed_label(cluster, obj.clone()).await;
        }
        let outcome = dispatcher.wait().await;
        timeout_as_error(&outcome)?;
        cached.ensure_complete()?;
        if !outcome.ok {
            return Err(SyncError::ClusterOperation(
                "failed to remove the label from resources in one or more clusters".to_string(),
            ));
        }
        Ok(())
    }

    /// Advance cascading deletion, returning whether another look is needed
    async fn delete_from_clusters(&self, fed: &mut FederatedResource) -> Result<bool> {
        let target = fed.target_name();
        let cached = self.cached_copies(&target)?;
        let mut dispatcher = self.unmanaged_dispatcher(&target);

        let mut remaining = Vec::new();
        for (cluster, obj) in &cached.copies {
            let action = decide_cascade_action(
                obj.metadata.deletion_timestamp.is_some(),
                fed.is_namespace_in_host_cluster(obj),
            );
            if action.is_tracked() {
                remaining.push(cluster.clone());
            }
            match action {
                CascadeAction::Delete => dispatcher.delete(cluster).await,
                CascadeAction::RemoveManagedLabel => {
                    dispatcher.remove_managed_label(cluster, obj.clone()).await
                }
                CascadeAction::Untracked | CascadeAction::AwaitRemoval => {}
            }
        }

        let outcome = dispatcher.wait().await;
        timeout_as_error(&outcome)?;
        cached.ensure_complete()?;
        if !outcome.ok {
            return Err(SyncError::ClusterOperation(
                "failed to remove managed resources from one or more clusters".to_string(),
            ));
        }

        match next_cascade_step(remaining) {
            CascadeStep::AwaitRemoval(clusters) => {
                info!(
                    "Waiting for resources managed by {} {} to be removed from the following clusters: {}",
                    fed.federated_kind(),
                    fed.federated_name(),
                    clusters.join(", ")
                );
                Ok(true)
            }
            CascadeStep::VerifyRemoval => {
                let report = self.ensure_removed_or_unmanaged(fed).await?;
                match finalize_decision(&report) {
                    FinalizeDecision::RemoveFinalizer => {
                        self.remove_finalizer(fed).await?;
                        Ok(false)
                    }
                    FinalizeDecision::Retry(reason) => Err(SyncError::ClusterOperation(format!(
                        "failed to verify that managed resources no longer exist in any cluster: {}",
                        reason
                    ))),
                }
            }
        }
    }

    /// Check every ready cluster without the cache
    async fn ensure_removed_or_unmanaged(&self, fed: &FederatedResource) -> Result<CheckReport> {
        let clusters = self.registry.get_clusters()?;
        let mut dispatcher = CheckUnmanagedDispatcher::new(
            self.registry.clone(),
            self.settings.update_timeout,
            fed.target_name(),
            fed.host_namespace_uid().map(str::to_string),
        );

        let mut report = CheckReport::default();
        for cluster in &clusters {
            if !cluster.ready {
                report.unready_clusters.push(cluster.name.clone());
                continue;
            }
            dispatcher.check_removed_or_unlabeled(&cluster.name);
        }
        let outcome = dispatcher.wait().await;
        report.all_clear = outcome.ok;
        report.timed_out = outcome.timeout.is_some();
        Ok(report)
    }

    pub(super) async fn remove_finalizer(&self, fed: &mut FederatedResource) -> Result<()> {
        if !fed.remove_finalizer() {
            return Ok(());
        }
        info!(
            "Removing finalizer {} from {} {}",
            FINALIZER,
            fed.federated_kind(),
            fed.federated_name()
        );
        let updated = self.host.update(fed.object()).await?;
        fed.set_object(updated);
        Ok(())
    }

    fn unmanaged_dispatcher(&self, target: &QualifiedName) -> UnmanagedDispatcher {
        UnmanagedDispatcher::new(
            self.registry.clone(),
            self.settings.update_timeout,
            target.clone(),
        )
    }

    fn cached_copies(&self, target: &QualifiedName) -> Result<CachedCopies> {
        let mut cached = CachedCopies::default();
        for cluster in self.registry.get_clusters()? {
            if !cluster.ready {
                cached.unready.push(cluster.name);
                continue;
            }
            match self.registry.cached_object(&cluster.name, target) {
                Ok(Some(obj)) => cached.copies.push((cluster.name, obj)),
                Ok(None) => {}
                Err(e) => {
                    self.diagnostics.handle_error(
                        &format!("Failed to retrieve {} for cluster {}", target, cluster.name),
                        e,
                    );
                    cached.retrieval_failures.push(cluster.name);
                }
            }
        }
        Ok(cached)
    }
}
