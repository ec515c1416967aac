// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Central coordinator turning cluster and member object events into reconciles.

use crate::config::Timing;
use crate::federated::TypeConfig;
use crate::sync::SyncController;
use crate::types::QualifiedName;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument};

/// Events that the cluster registry sends to the SyncManager
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A member cluster became ready
    ClusterAvailable { name: String },
    /// A member cluster is no longer ready or was removed
    ClusterUnavailable { name: String },
    /// A managed object changed in a member cluster
    MemberObjectChanged { cluster: String, target: QualifiedName },
}

/// Pending full re-sweep, coalesced to the earliest requested time
#[derive(Debug, Default)]
pub struct SweepSchedule {
    deadline: Option<Instant>,
}

impl SweepSchedule {
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        let at = now + delay;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing <= at => existing,
            _ => at,
        });
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Senders feeding the federated resource controller
#[derive(Clone)]
pub struct ReconcileTriggers {
    sweep: UnboundedSender<()>,
    objects: UnboundedSender<ObjectRef<DynamicObject>>,
    resource: ApiResource,
}

/// Receiving ends of [`ReconcileTriggers`]
pub struct TriggerStreams {
    pub sweeps: UnboundedReceiver<()>,
    pub objects: UnboundedReceiver<ObjectRef<DynamicObject>>,
}

impl ReconcileTriggers {
    pub fn new(resource: ApiResource) -> (Self, TriggerStreams) {
        let (sweep, sweeps) = unbounded();
        let (objects_tx, objects) = unbounded();
        let triggers = Self {
            sweep,
            objects: objects_tx,
            resource,
        };
        (triggers, TriggerStreams { sweeps, objects })
    }

    /// Reconcile every known federated resource
    fn sweep(&self) {
        if let Err(e) = self.sweep.unbounded_send(()) {
            error!("Failed to trigger a full reconcile: {}", e);
        }
    }

    fn reconcile(&self, name: &QualifiedName) {
        let reference = ObjectRef::new_with(&name.name, self.resource.clone());
        let reference = match name.namespace() {
            Some(ns) => reference.within(ns),
            None => reference,
        };
        if let Err(e) = self.objects.unbounded_send(reference) {
            error!("Failed to trigger reconcile of {}: {}", name, e);
        }
    }
}

/// Receives events from the cluster registry and decides what to reconcile
pub struct SyncManager {
    timing: Timing,
    type_config: TypeConfig,
    event_rx: mpsc::Receiver<SyncEvent>,
}

/// Handle to send events to the SyncManager
#[derive(Clone)]
pub struct SyncManagerHandle {
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncManagerHandle {
    pub async fn send(&self, event: SyncEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            error!("Failed to send event to SyncManager: {}", e);
        }
    }
}

impl SyncManager {
    pub fn new(timing: Timing, type_config: TypeConfig) -> (Self, SyncManagerHandle) {
        let (event_tx, event_rx) = mpsc::channel(256);

        let manager = Self {
            timing,
            type_config,
            event_rx,
        };

        let handle = SyncManagerHandle { event_tx };
        (manager, handle)
    }

    pub async fn run(
        mut self,
        controller: Arc<SyncController>,
        triggers: ReconcileTriggers,
    ) -> anyhow::Result<()> {
        info!("SyncManager started, listening for events...");
        let mut schedule = SweepSchedule::default();

        loop {
            let deadline = schedule.deadline();
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event, &controller, &triggers, &mut schedule).await,
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    schedule.clear();
                    self.sweep(&controller, &triggers, &mut schedule);
                }
            }
        }

        Ok(())
    }

    async fn handle_event(
        &self,
        event: SyncEvent,
        controller: &SyncController,
        triggers: &ReconcileTriggers,
        schedule: &mut SweepSchedule,
    ) {
        debug!("Handling event: {:?}", event);

        match event {
            SyncEvent::ClusterAvailable { name } => {
                info!("Cluster '{}' became available", name);
                schedule.arm(Instant::now(), self.timing.cluster_available_delay);
            }
            SyncEvent::ClusterUnavailable { name } => {
                info!("Cluster '{}' is no longer available", name);
                schedule.arm(Instant::now(), self.timing.cluster_unavailable_delay);
            }
            SyncEvent::MemberObjectChanged { cluster, target } => {
                self.handle_member_object(&cluster, &target, controller, triggers)
                    .await;
            }
        }
    }

    /// Objects whose federated resource is gone never reach the controller
    /// queue, so their labels are stripped here
    #[instrument(skip(self, controller, triggers))]
    async fn handle_member_object(
        &self,
        cluster: &str,
        target: &QualifiedName,
        controller: &SyncController,
        triggers: &ReconcileTriggers,
    ) {
        let name = self.type_config.federated_name(target);
        if controller.accessor().contains(&name) {
            triggers.reconcile(&name);
            return;
        }
        let status = controller.reconcile(&name).await;
        debug!("Reconciled {} without a federated resource: {}", name, status);
    }

    fn sweep(
        &self,
        controller: &SyncController,
        triggers: &ReconcileTriggers,
        schedule: &mut SweepSchedule,
    ) {
        if !controller.is_synced() {
            debug!("Not synced yet, postponing full reconcile");
            schedule.arm(Instant::now(), self.timing.cluster_available_delay);
            return;
        }
        info!("Reconciling all federated resources");
        triggers.sweep();
    }
}
