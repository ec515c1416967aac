// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster reconciler - watches KubeFedCluster resources, keeps the registry
//! current and notifies the sync manager of availability changes.

use crate::cluster::informer::Availability;
use crate::cluster::KubeClusterRegistry;
use crate::sync::{SyncEvent, SyncManagerHandle};
use crate::types::KubeFedCluster;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ClusterReconciler {
    client: Client,
    namespace: String,
    registry: Arc<KubeClusterRegistry>,
    sync_handle: SyncManagerHandle,
    /// Clusters seen during a (re)list, `None` outside of one
    relisted: Option<BTreeSet<String>>,
}

impl ClusterReconciler {
    pub fn new(
        client: Client,
        namespace: &str,
        registry: Arc<KubeClusterRegistry>,
        sync_handle: SyncManagerHandle,
    ) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            registry,
            sync_handle,
            relisted: None,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let clusters: Api<KubeFedCluster> = Api::namespaced(self.client.clone(), &self.namespace);
        info!("Watching KubeFedClusters in namespace {}", self.namespace);

        let mut stream = watcher(clusters, watcher::Config::default())
            .default_backoff()
            .boxed();
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(e) => warn!("KubeFedCluster watch error: {}", e),
            }
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: watcher::Event<KubeFedCluster>) {
        match event {
            watcher::Event::Init => {
                debug!("Listing KubeFedClusters");
                self.relisted = Some(BTreeSet::new());
            }
            watcher::Event::InitApply(cluster) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(cluster.name_any());
                }
                self.apply(&cluster).await;
            }
            watcher::Event::Apply(cluster) => self.apply(&cluster).await,
            watcher::Event::Delete(cluster) => {
                let name = cluster.name_any();
                let change = self.registry.remove_cluster(&name);
                self.notify(&name, change).await;
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                for name in self.registry.retain_clusters(&seen) {
                    self.notify(&name, Some(Availability::Unavailable)).await;
                }
                self.registry.mark_synced();
            }
        }
    }

    async fn apply(&self, cluster: &KubeFedCluster) {
        debug!("Reconciling cluster: {}", cluster.name_any());
        let change = self.registry.upsert_cluster(cluster).await;
        self.notify(&cluster.name_any(), change).await;
    }

    async fn notify(&self, name: &str, change: Option<Availability>) {
        let name = name.to_string();
        match change {
            Some(Availability::Available) => {
                self.sync_handle
                    .send(SyncEvent::ClusterAvailable { name })
                    .await
            }
            Some(Availability::Unavailable) => {
                self.sync_handle
                    .send(SyncEvent::ClusterUnavailable { name })
                    .await
            }
            None => {}
        }
    }
}
