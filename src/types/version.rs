// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster name to the resourceVersion last written to that cluster
pub type VersionMap = BTreeMap<String, String>;

/// Versions last propagated for a federated resource.
///
/// Stored next to the federated resource under a name derived from its kind,
/// so that updates to member clusters can be skipped when neither the template
/// nor the member copy changed since the last write.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.kubefed.io", version = "v1alpha1", kind = "PropagatedVersion")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PropagatedVersionSpec {
    pub template_version: String,
    #[serde(default)]
    pub cluster_versions: Vec<ClusterObjectVersion>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectVersion {
    pub cluster_name: String,
    pub version: String,
}

impl PropagatedVersionSpec {
    pub fn new(template_version: &str, versions: &VersionMap) -> Self {
        Self {
            template_version: template_version.to_string(),
            cluster_versions: versions
                .iter()
                .map(|(cluster, version)| ClusterObjectVersion {
                    cluster_name: cluster.clone(),
                    version: version.clone(),
                })
                .collect(),
        }
    }

    pub fn version_map(&self) -> VersionMap {
        self.cluster_versions
            .iter()
            .map(|v| (v.cluster_name.clone(), v.version.clone()))
            .collect()
    }
}

/// Name of the version record for a federated resource of the given kind
pub fn propagated_version_name(federated_kind: &str, name: &str) -> String {
    format!("{}-{}", federated_kind.to_lowercase(), name)
}
