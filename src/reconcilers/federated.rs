// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Federated resource reconciler - drives the sync controller from a work
//! queue of federated resources and requeues according to the outcome.

use crate::config::Timing;
use crate::error::{Result, SyncError};
use crate::federated::TypeConfig;
use crate::sync::manager::TriggerStreams;
use crate::sync::{ReconciliationStatus, SyncController};
use crate::types::QualifiedName;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::{controller::Action, Controller};
use kube::{Api, Client};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FederatedReconciler {
    controller: Arc<SyncController>,
    timing: Timing,
}

/// Requeue delay for a reconcile outcome
pub fn action_for(status: ReconciliationStatus, timing: &Timing) -> Action {
    match status {
        ReconciliationStatus::AllOk => Action::requeue(timing.resync_period),
        ReconciliationStatus::NeedsRecheck => Action::requeue(timing.recheck_delay),
        ReconciliationStatus::Error => Action::requeue(timing.error_delay),
        ReconciliationStatus::NotSynced => Action::requeue(timing.cluster_available_delay),
    }
}

/// Controller over every federated resource of the configured type
pub fn resource_controller(client: Client, types: &TypeConfig) -> Controller<DynamicObject> {
    let resources: Api<DynamicObject> = Api::all_with(client, &types.federated);
    Controller::new_with(resources, WatcherConfig::default(), types.federated.clone())
}

impl FederatedReconciler {
    pub fn new(controller: Arc<SyncController>, timing: Timing) -> Self {
        Self { controller, timing }
    }

    pub async fn run(
        self,
        resources: Controller<DynamicObject>,
        triggers: TriggerStreams,
    ) -> anyhow::Result<()> {
        let context = Arc::new(self);

        resources
            .reconcile_all_on(triggers.sweeps)
            .reconcile_on(triggers.objects)
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled federated resource: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(obj: Arc<DynamicObject>, ctx: Arc<FederatedReconciler>) -> Result<Action> {
    let name = QualifiedName::of(obj.as_ref());
    let status = ctx.controller.reconcile(&name).await;
    debug!("Reconciled {}: {}", name, status);
    Ok(action_for(status, &ctx.timing))
}

fn error_policy(obj: Arc<DynamicObject>, error: &SyncError, ctx: Arc<FederatedReconciler>) -> Action {
    warn!(
        "Reconcile of {} failed: {}",
        QualifiedName::of(obj.as_ref()),
        error
    );
    Action::requeue(ctx.timing.error_delay)
}
