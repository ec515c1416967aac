// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registration of a member cluster in the host cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "core.kubefed.io", version = "v1beta1", kind = "KubeFedCluster")]
#[kube(namespaced)]
#[kube(status = "KubeFedClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct KubeFedClusterSpec {
    pub api_endpoint: String,
    pub secret_ref: LocalSecretReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_tls_validations: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
pub struct LocalSecretReference {
    pub name: String,
}

impl KubeFedCluster {
    /// Check if this cluster is ready based on its status conditions
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.condition_type == "Ready" && c.status == "True")
            })
    }

    /// Get the name of the secret holding the kubeconfig for this cluster
    pub fn kubeconfig_secret_name(&self) -> String {
        if self.spec.secret_ref.name.is_empty() {
            format!("{}-kubeconfig", self.name_any())
        } else {
            self.spec.secret_ref.name.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeFedClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Point-in-time view of a member cluster as seen by the sync controller
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub name: String,
    pub ready: bool,
    pub labels: BTreeMap<String, String>,
}

impl ClusterSnapshot {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl From<&KubeFedCluster> for ClusterSnapshot {
    fn from(cluster: &KubeFedCluster) -> Self {
        Self {
            name: cluster.name_any(),
            ready: cluster.is_ready(),
            labels: cluster.labels().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_cluster(name: &str, status: Option<KubeFedClusterStatus>) -> KubeFedCluster {
        KubeFedCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kube-federation-system".to_string()),
                labels: Some(BTreeMap::from([(
                    "region".to_string(),
                    "eu".to_string(),
                )])),
                ..Default::default()
            },
            spec: KubeFedClusterSpec {
                api_endpoint: "https://cluster.example:6443".to_string(),
                secret_ref: LocalSecretReference {
                    name: String::new(),
                },
                disabled_tls_validations: None,
            },
            status,
        }
    }

    fn make_condition(condition_type: &str, status: &str) -> Condition {
        Condition {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            message: None,
        }
    }

    fn status_with(conditions: Vec<Condition>) -> Option<KubeFedClusterStatus> {
        Some(KubeFedClusterStatus {
            conditions: Some(conditions),
            region: None,
        })
    }

    #[test]
    fn test_is_ready_with_ready_condition() {
        let cluster = make_cluster("member-1", status_with(vec![make_condition("Ready", "True")]));
        assert!(cluster.is_ready());
    }

    #[test]
    fn test_is_ready_with_not_ready_condition() {
        let cluster = make_cluster(
            "member-1",
            status_with(vec![make_condition("Ready", "False")]),
        );
        assert!(!cluster.is_ready());
    }

    #[test]
    fn test_is_ready_with_offline_condition_only() {
        let cluster = make_cluster(
            "member-1",
            status_with(vec![make_condition("Offline", "True")]),
        );
        assert!(!cluster.is_ready());
    }

    #[test]
    fn test_is_ready_with_no_status() {
        let cluster = make_cluster("member-1", None);
        assert!(!cluster.is_ready());
    }

    #[test]
    fn test_kubeconfig_secret_name_from_spec() {
        let mut cluster = make_cluster("member-1", None);
        cluster.spec.secret_ref.name = "member-1-creds".to_string();
        assert_eq!(cluster.kubeconfig_secret_name(), "member-1-creds");
    }

    #[test]
    fn test_kubeconfig_secret_name_fallback() {
        let cluster = make_cluster("member-1", None);
        assert_eq!(cluster.kubeconfig_secret_name(), "member-1-kubeconfig");
    }

    #[test]
    fn test_snapshot_from_cluster() {
        let cluster = make_cluster("member-1", status_with(vec![make_condition("Ready", "True")]));
        let snapshot = ClusterSnapshot::from(&cluster);

        assert_eq!(snapshot.name, "member-1");
        assert!(snapshot.ready);
        assert_eq!(snapshot.labels.get("region").map(String::as_str), Some("eu"));
    }
}
