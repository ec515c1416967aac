// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Authoritative confirmation that member clusters no longer hold managed copies.

use super::{OperationDispatcher, WaitOutcome};
use crate::cluster::ClusterRegistry;
use crate::constants::labels;
use crate::federated::is_host_namespace;
use crate::types::QualifiedName;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Outcome of checking one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckResult {
    Absent,
    Unlabeled,
    PendingDeletion,
    StillManaged,
}

impl CheckResult {
    pub fn is_clear(&self) -> bool {
        matches!(self, CheckResult::Absent | CheckResult::Unlabeled)
    }
}

/// Classify the uncached copy of the target object in a cluster
pub fn classify(obj: Option<&DynamicObject>, host_namespace_uid: Option<&str>) -> CheckResult {
    let Some(obj) = obj else {
        return CheckResult::Absent;
    };
    if obj.metadata.deletion_timestamp.is_some() {
        // The host namespace is removed by its own owner, not by us
        if is_host_namespace(host_namespace_uid, obj) {
            return CheckResult::Unlabeled;
        }
        return CheckResult::PendingDeletion;
    }
    if obj.labels().contains_key(labels::MANAGED) {
        CheckResult::StillManaged
    } else {
        CheckResult::Unlabeled
    }
}

/// Read-only dispatcher verifying the target is absent or unlabeled
pub struct CheckUnmanagedDispatcher {
    core: OperationDispatcher,
    target_name: QualifiedName,
    host_namespace_uid: Option<String>,
}

impl CheckUnmanagedDispatcher {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        timeout: Duration,
        target_name: QualifiedName,
        host_namespace_uid: Option<String>,
    ) -> Self {
        Self {
            core: OperationDispatcher::new(registry, timeout),
            target_name,
            host_namespace_uid,
        }
    }

    pub fn check_removed_or_unlabeled(&mut self, cluster: &str) {
        let name = self.target_name.clone();
        let host_uid = self.host_namespace_uid.clone();
        let cluster_name = cluster.to_string();
        self.core.dispatch(cluster, move |client| async move {
            let client = match client {
                Ok(c) => c,
                Err(e) => {
                    error!("Cluster {}: failed to retrieve client: {}", cluster_name, e);
                    return false;
                }
            };
            let obj = match client.get(&name).await {
                Ok(obj) => obj,
                Err(e) => {
                    error!("Cluster {}: failed to check {}: {}", cluster_name, name, e);
                    return false;
                }
            };
            let result = classify(obj.as_ref(), host_uid.as_deref());
            if result.is_clear() {
                debug!("Cluster {}: {} is {:?}", cluster_name, name, result);
            } else {
                error!("Cluster {}: {} is {:?}", cluster_name, name, result);
            }
            result.is_clear()
        });
    }

    pub async fn wait(&mut self) -> WaitOutcome {
        self.core.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{member_object, terminating, FakeRegistry};
    use crate::types::ClusterSnapshot;

    fn target() -> QualifiedName {
        QualifiedName::new("apps", "web")
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, None), CheckResult::Absent);
        assert_eq!(
            classify(Some(&member_object("apps", "web", false)), None),
            CheckResult::Unlabeled
        );
        assert_eq!(
            classify(Some(&member_object("apps", "web", true)), None),
            CheckResult::StillManaged
        );
        assert_eq!(
            classify(Some(&terminating(member_object("apps", "web", false))), None),
            CheckResult::PendingDeletion
        );
    }

    #[test]
    fn test_terminating_host_namespace_is_clear() {
        let mut ns = terminating(member_object("", "team-a", true));
        ns.metadata.uid = Some("host-uid".to_string());

        assert_eq!(classify(Some(&ns), Some("host-uid")), CheckResult::Unlabeled);
        assert_eq!(classify(Some(&ns), Some("other")), CheckResult::PendingDeletion);
    }

    #[tokio::test]
    async fn test_check_reads_through_client() {
        let registry = Arc::new(FakeRegistry::new(vec![
            ClusterSnapshot::new("a", true),
            ClusterSnapshot::new("b", true),
        ]));
        registry.client("b").insert(member_object("apps", "web", false));
        let mut dispatcher =
            CheckUnmanagedDispatcher::new(registry.clone(), Duration::from_secs(1), target(), None);

        dispatcher.check_removed_or_unlabeled("a");
        dispatcher.check_removed_or_unlabeled("b");
        let outcome = dispatcher.wait().await;

        assert!(outcome.ok);
        assert_eq!(registry.client("a").operations(), vec!["get"]);
    }

    #[tokio::test]
    async fn test_labeled_copy_fails_check() {
        let registry = Arc::new(FakeRegistry::new(vec![ClusterSnapshot::new("a", true)]));
        registry.client("a").insert(member_object("apps", "web", true));
        let mut dispatcher =
            CheckUnmanagedDispatcher::new(registry, Duration::from_secs(1), target(), None);

        dispatcher.check_removed_or_unlabeled("a");

        assert!(!dispatcher.wait().await.ok);
    }
}
