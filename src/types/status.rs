// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Propagation status reported on federated resources.

use crate::error::Result;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PROPAGATION_CONDITION: &str = "Propagation";

/// Outcome of propagation to a single member cluster
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropagationStatus {
    #[serde(rename = "OK")]
    Ok,
    ClusterNotReady,
    CachedRetrievalFailed,
    ClientRetrievalFailed,
    ComputeResourceFailed,
    AlreadyExists,
    CreationFailed,
    UpdateFailed,
    DeletionFailed,
    LabelRemovalFailed,
    CreationTimedOut,
    UpdateTimedOut,
    DeletionTimedOut,
    LabelRemovalTimedOut,
    WaitingForRemoval,
}

impl fmt::Display for PropagationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationStatus::Ok => write!(f, "OK"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Overall reason recorded on the Propagation condition
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateReason {
    AggregateSuccess,
    ClusterRetrievalFailed,
    ComputePlacementFailed,
    CheckClusters,
}

impl fmt::Display for AggregateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterOutcome {
    pub status: PropagationStatus,
    pub error: Option<String>,
}

impl ClusterOutcome {
    pub fn status(status: PropagationStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn error(status: PropagationStatus, error: impl fmt::Display) -> Self {
        Self {
            status,
            error: Some(error.to_string()),
        }
    }
}

/// Cluster name to propagation outcome
pub type PropagationStatusMap = BTreeMap<String, ClusterOutcome>;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FederatedStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<PropagationCondition>,
    #[serde(default)]
    pub clusters: Vec<ClusterStatusEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropagationCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AggregateReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClusterStatusEntry {
    pub name: String,
    pub status: PropagationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FederatedStatus {
    /// Read the status block of a federated object, tolerating a missing one
    pub fn from_object(obj: &DynamicObject) -> Self {
        obj.data
            .get("status")
            .cloned()
            .and_then(|s| serde_json::from_value(s).ok())
            .unwrap_or_default()
    }

    pub fn propagation_condition(&self) -> Option<&PropagationCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == PROPAGATION_CONDITION)
    }
}

/// Merge the given reason and per-cluster outcomes into the status of `obj`.
///
/// Returns whether the status changed. A `None` status map keeps the cluster
/// entries already recorded on the object.
pub fn apply_propagation_status(
    obj: &mut DynamicObject,
    reason: AggregateReason,
    status_map: Option<&PropagationStatusMap>,
) -> Result<bool> {
    let current = FederatedStatus::from_object(obj);

    let clusters = match status_map {
        Some(map) => map
            .iter()
            .map(|(name, outcome)| ClusterStatusEntry {
                name: name.clone(),
                status: outcome.status,
                error: outcome.error.clone(),
            })
            .collect(),
        None => current.clusters.clone(),
    };

    let all_ok = clusters.iter().all(|c| c.status == PropagationStatus::Ok);
    let (condition_status, effective_reason) = match reason {
        AggregateReason::AggregateSuccess if all_ok => ("True", AggregateReason::AggregateSuccess),
        AggregateReason::AggregateSuccess => ("False", AggregateReason::CheckClusters),
        other => ("False", other),
    };

    let previous = current.propagation_condition();
    let generation = obj.metadata.generation;
    let unchanged = current.clusters == clusters
        && current.observed_generation == generation
        && previous.is_some_and(|c| {
            c.status == condition_status && c.reason == Some(effective_reason)
        });
    if unchanged {
        return Ok(false);
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let last_transition_time = match previous {
        Some(c) if c.status == condition_status => c.last_transition_time.clone(),
        _ => Some(now.clone()),
    };

    let mut conditions: Vec<PropagationCondition> = current
        .conditions
        .iter()
        .filter(|c| c.condition_type != PROPAGATION_CONDITION)
        .cloned()
        .collect();
    conditions.push(PropagationCondition {
        condition_type: PROPAGATION_CONDITION.to_string(),
        status: condition_status.to_string(),
        reason: Some(effective_reason),
        last_update_time: Some(now),
        last_transition_time,
    });

    let status = FederatedStatus {
        observed_generation: generation,
        conditions,
        clusters,
    };

    match obj.data.as_object_mut() {
        Some(data) => {
            data.insert("status".to_string(), serde_json::to_value(&status)?);
        }
        None => {
            obj.data = serde_json::json!({ "status": status });
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_object(status: Option<serde_json::Value>) -> DynamicObject {
        let mut data = serde_json::json!({ "spec": { "template": {} } });
        if let Some(status) = status {
            data["status"] = status;
        }
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("apps".to_string()),
                generation: Some(2),
                ..Default::default()
            },
            data,
        }
    }

    fn ok_map(clusters: &[&str]) -> PropagationStatusMap {
        clusters
            .iter()
            .map(|c| (c.to_string(), ClusterOutcome::status(PropagationStatus::Ok)))
            .collect()
    }

    #[test]
    fn test_all_ok_sets_condition_true() {
        let mut obj = make_object(None);

        let changed =
            apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&ok_map(&["a", "b"])))
                .unwrap();

        assert!(changed);
        let status = FederatedStatus::from_object(&obj);
        let condition = status.propagation_condition().unwrap();
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, Some(AggregateReason::AggregateSuccess));
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(
            status.clusters.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_cluster_failure_reports_check_clusters() {
        let mut obj = make_object(None);
        let mut map = ok_map(&["a"]);
        map.insert(
            "b".to_string(),
            ClusterOutcome::error(PropagationStatus::CreationFailed, "boom"),
        );

        apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&map)).unwrap();

        let status = FederatedStatus::from_object(&obj);
        let condition = status.propagation_condition().unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, Some(AggregateReason::CheckClusters));
        assert_eq!(status.clusters[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_map_keeps_recorded_clusters() {
        let mut obj = make_object(None);
        apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&ok_map(&["a"]))).unwrap();

        let changed =
            apply_propagation_status(&mut obj, AggregateReason::ClusterRetrievalFailed, None).unwrap();

        assert!(changed);
        let status = FederatedStatus::from_object(&obj);
        assert_eq!(status.clusters.len(), 1);
        assert_eq!(status.clusters[0].name, "a");
        assert_eq!(
            status.propagation_condition().unwrap().reason,
            Some(AggregateReason::ClusterRetrievalFailed)
        );
    }

    #[test]
    fn test_reapplying_same_status_is_noop() {
        let mut obj = make_object(None);
        let map = ok_map(&["a"]);
        apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&map)).unwrap();

        let changed =
            apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&map)).unwrap();

        assert!(!changed);
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut obj = make_object(Some(serde_json::json!({
            "observedGeneration": 1,
            "conditions": [{
                "type": "Propagation",
                "status": "True",
                "reason": "AggregateSuccess",
                "lastTransitionTime": "2020-01-01T00:00:00Z"
            }],
            "clusters": []
        })));

        apply_propagation_status(&mut obj, AggregateReason::AggregateSuccess, Some(&ok_map(&["a"]))).unwrap();

        let status = FederatedStatus::from_object(&obj);
        let condition = status.propagation_condition().unwrap();
        assert_eq!(
            condition.last_transition_time.as_deref(),
            Some("2020-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_status_serialized_names() {
        let value = serde_json::to_value(ClusterStatusEntry {
            name: "a".to_string(),
            status: PropagationStatus::Ok,
            error: None,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({ "name": "a", "status": "OK" }));
        assert_eq!(PropagationStatus::WaitingForRemoval.to_string(), "WaitingForRemoval");
    }
}
