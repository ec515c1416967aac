// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Member cluster registry fed by `KubeFedCluster` events.
//!
//! Every ready cluster gets a client and a reflector over the target type,
//! filtered to objects carrying the managed label. Changes seen by those
//! reflectors are forwarded to the sync manager.

use crate::cluster::{ClusterClient, ClusterRegistry};
use crate::config::Config;
use crate::constants::labels;
use crate::error::{Result, SyncError};
use crate::kubernetes::{create_member_client, KubeClusterClient};
use crate::sync::{SyncEvent, SyncManagerHandle};
use crate::types::{ClusterSnapshot, KubeFedCluster, QualifiedName};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Readiness transition of a member cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
}

pub fn availability_change(was_ready: bool, is_ready: bool) -> Option<Availability> {
    match (was_ready, is_ready) {
        (false, true) => Some(Availability::Available),
        (true, false) => Some(Availability::Unavailable),
        _ => None,
    }
}

struct ClusterEntry {
    snapshot: ClusterSnapshot,
    member: Option<MemberCache>,
}

/// Client and target object cache of a ready member cluster
struct MemberCache {
    client: Client,
    store: Store<DynamicObject>,
    task: JoinHandle<()>,
}

impl Drop for MemberCache {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct KubeClusterRegistry {
    host_client: Client,
    config: Config,
    target: ApiResource,
    events: SyncManagerHandle,
    clusters: RwLock<BTreeMap<String, ClusterEntry>>,
    synced: AtomicBool,
}

impl KubeClusterRegistry {
    pub fn new(host_client: Client, config: Config, target: ApiResource, events: SyncManagerHandle) -> Self {
        Self {
            host_client,
            config,
            target,
            events,
            clusters: RwLock::new(BTreeMap::new()),
            synced: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ClusterEntry>> {
        self.clusters.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ClusterEntry>> {
        self.clusters.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the latest state of a cluster, starting or stopping its cache
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    pub async fn upsert_cluster(&self, cluster: &KubeFedCluster) -> Option<Availability> {
        let name = cluster.name_any();
        let mut snapshot = ClusterSnapshot::from(cluster);
        let (was_ready, has_member) = self
            .read()
            .get(&name)
            .map(|e| (e.snapshot.ready, e.member.is_some()))
            .unwrap_or((false, false));

        let mut member = None;
        if snapshot.ready && !has_member {
            match self.start_member(cluster).await {
                Ok(m) => member = Some(m),
                Err(e) => {
                    error!("Failed to connect to cluster {}: {}", name, e);
                    snapshot.ready = false;
                }
            }
        }

        let is_ready = snapshot.ready;
        {
            let mut clusters = self.write();
            let entry = clusters.entry(name).or_insert_with(|| ClusterEntry {
                snapshot: snapshot.clone(),
                member: None,
            });
            entry.snapshot = snapshot;
            if !is_ready {
                entry.member = None;
            } else if member.is_some() {
                entry.member = member;
            }
        }
        availability_change(was_ready, is_ready)
    }

    pub fn remove_cluster(&self, name: &str) -> Option<Availability> {
        let removed = self.write().remove(name)?;
        info!("Cluster {} removed", name);
        availability_change(removed.snapshot.ready, false)
    }

    /// Drop every cluster not in `names`, returning those that were ready
    pub fn retain_clusters(&self, names: &BTreeSet<String>) -> Vec<String> {
        let mut clusters = self.write();
        let stale: Vec<String> = clusters
            .keys()
            .filter(|name| !names.contains(*name))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|name| {
                let entry = clusters.remove(&name)?;
                info!("Cluster {} removed", name);
                entry.snapshot.ready.then_some(name)
            })
            .collect()
    }

    pub fn mark_synced(&self) {
        if !self.synced.swap(true, Ordering::SeqCst) {
            info!("Cluster list synced: {} clusters", self.read().len());
        }
    }

    async fn start_member(&self, cluster: &KubeFedCluster) -> Result<MemberCache> {
        let client = create_member_client(&self.host_client, cluster, &self.config).await?;
        let writer = reflector::store::Writer::new(self.target.clone());
        let store = writer.as_reader();
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &self.target);
        let selector = format!("{}={}", labels::MANAGED, labels::MANAGED_VALUE);
        let watcher_config = watcher::Config::default().labels(&selector);

        let cluster_name = cluster.name_any();
        let events = self.events.clone();
        info!("Starting {} cache for cluster {}", self.target.kind, cluster_name);
        let task = tokio::spawn(async move {
            let mut stream = reflector::reflector(writer, watcher(api, watcher_config))
                .default_backoff()
                .touched_objects()
                .boxed();
            while let Some(res) = stream.next().await {
                match res {
                    Ok(obj) => {
                        events
                            .send(SyncEvent::MemberObjectChanged {
                                cluster: cluster_name.clone(),
                                target: QualifiedName::of(&obj),
                            })
                            .await
                    }
                    Err(e) => warn!("Cluster {}: watch error: {}", cluster_name, e),
                }
            }
            debug!("Cache for cluster {} stopped", cluster_name);
        });

        Ok(MemberCache { client, store, task })
    }

    fn object_ref(&self, name: &QualifiedName) -> ObjectRef<DynamicObject> {
        let reference = ObjectRef::new_with(&name.name, self.target.clone());
        match name.namespace() {
            Some(ns) => reference.within(ns),
            None => reference,
        }
    }
}

#[async_trait]
impl ClusterRegistry for KubeClusterRegistry {
    fn clusters_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn get_clusters(&self) -> Result<Vec<ClusterSnapshot>> {
        Ok(self.read().values().map(|e| e.snapshot.clone()).collect())
    }

    fn target_caches_synced(&self, clusters: &[ClusterSnapshot]) -> bool {
        let entries = self.read();
        clusters.iter().all(|cluster| {
            let synced = entries
                .get(&cluster.name)
                .and_then(|e| e.member.as_ref())
                .is_some_and(|m| matches!(m.store.wait_until_ready().now_or_never(), Some(Ok(()))));
            if !synced {
                debug!("Cache for cluster {} not yet synced", cluster.name);
            }
            synced
        })
    }

    fn cached_object(&self, cluster: &str, name: &QualifiedName) -> Result<Option<DynamicObject>> {
        let entries = self.read();
        let member = entries
            .get(cluster)
            .and_then(|e| e.member.as_ref())
            .ok_or_else(|| SyncError::ClusterNotReady(cluster.to_string()))?;
        Ok(member.store.get(&self.object_ref(name)).map(|obj| (*obj).clone()))
    }

    async fn client_for_cluster(&self, cluster: &str) -> Result<Arc<dyn ClusterClient>> {
        let entries = self.read();
        let entry = entries
            .get(cluster)
            .ok_or_else(|| SyncError::UnknownCluster(cluster.to_string()))?;
        let member = entry
            .member
            .as_ref()
            .ok_or_else(|| SyncError::ClusterNotReady(cluster.to_string()))?;
        Ok(Arc::new(KubeClusterClient::new(
            cluster,
            member.client.clone(),
            self.target.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncManager;
    use crate::test_utils::{config_map_types, MockService};
    use crate::types::cluster::{Condition, KubeFedClusterSpec, KubeFedClusterStatus, LocalSecretReference};
    use kube::api::ObjectMeta;

    fn registry() -> KubeClusterRegistry {
        let config = Config::from_lookup(|key| match key {
            "FEDERATED_KIND" => Some("FederatedConfigMap".to_string()),
            "TARGET_KIND" => Some("ConfigMap".to_string()),
            _ => None,
        })
        .unwrap();
        let types = config_map_types();
        let (_manager, handle) = SyncManager::new(config.timing.clone(), types.clone());
        KubeClusterRegistry::new(MockService::new().into_client(), config, types.target, handle)
    }

    fn cluster(name: &str, ready: bool) -> KubeFedCluster {
        KubeFedCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kube-federation-system".to_string()),
                ..Default::default()
            },
            spec: KubeFedClusterSpec {
                api_endpoint: "https://member.example.com".to_string(),
                secret_ref: LocalSecretReference {
                    name: format!("{}-secret", name),
                },
                disabled_tls_validations: None,
            },
            status: Some(KubeFedClusterStatus {
                conditions: Some(vec![Condition {
                    condition_type: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    message: None,
                }]),
                region: None,
            }),
        }
    }

    #[test]
    fn test_availability_change() {
        assert_eq!(availability_change(false, true), Some(Availability::Available));
        assert_eq!(availability_change(true, false), Some(Availability::Unavailable));
        assert_eq!(availability_change(true, true), None);
        assert_eq!(availability_change(false, false), None);
    }

    #[tokio::test]
    async fn test_unready_cluster_is_listed_without_client() {
        let registry = registry();

        assert_eq!(registry.upsert_cluster(&cluster("a", false)).await, None);

        assert_eq!(registry.get_clusters().unwrap(), vec![ClusterSnapshot::new("a", false)]);
        assert!(matches!(
            registry.client_for_cluster("a").await,
            Err(SyncError::ClusterNotReady(_))
        ));
        assert!(matches!(
            registry.client_for_cluster("b").await,
            Err(SyncError::UnknownCluster(_))
        ));
        assert!(registry
            .cached_object("a", &QualifiedName::new("apps", "web"))
            .is_err());
        assert!(!registry.target_caches_synced(&registry.get_clusters().unwrap()));
    }

    #[tokio::test]
    async fn test_ready_cluster_without_credentials_stays_unready() {
        let registry = registry();

        let change = registry.upsert_cluster(&cluster("a", true)).await;

        assert_eq!(change, None);
        assert!(!registry.get_clusters().unwrap()[0].ready);
    }

    #[tokio::test]
    async fn test_retain_clusters_drops_stale_entries() {
        let registry = registry();
        registry.upsert_cluster(&cluster("a", false)).await;
        registry.upsert_cluster(&cluster("b", false)).await;

        let removed_ready = registry.retain_clusters(&BTreeSet::from(["a".to_string()]));

        assert!(removed_ready.is_empty());
        let names: Vec<String> = registry.get_clusters().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(registry.remove_cluster("a"), None);
        assert!(registry.get_clusters().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clusters_synced_after_initial_list() {
        let registry = registry();
        assert!(!registry.clusters_synced());
        registry.mark_synced();
        assert!(registry.clusters_synced());
    }
}
