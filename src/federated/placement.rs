// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of `spec.placement` to the set of member clusters a federated
//! resource should be propagated to.

use crate::error::{Result, SyncError};
use crate::types::ClusterSnapshot;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::DynamicObject;
use kube::core::{Selector, SelectorExt};
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Explicit cluster names; when set the selector is ignored
    #[serde(default)]
    pub clusters: Option<Vec<ClusterReference>>,
    #[serde(default)]
    pub cluster_selector: Option<LabelSelector>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ClusterReference {
    pub name: String,
}

impl Placement {
    /// Read the placement directive of a federated object.
    /// An object without placement selects no clusters.
    pub fn from_object(obj: &DynamicObject) -> Result<Self> {
        match obj.data.pointer("/spec/placement") {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| SyncError::InvalidPlacement(e.to_string())),
        }
    }

    /// Names of the clusters selected from `clusters`.
    ///
    /// Explicit names are intersected with the known clusters. An empty
    /// selector matches every cluster, a missing one matches none.
    pub fn select(&self, clusters: &[ClusterSnapshot]) -> Result<BTreeSet<String>> {
        if let Some(names) = &self.clusters {
            let wanted: BTreeSet<&str> = names.iter().map(|c| c.name.as_str()).collect();
            return Ok(clusters
                .iter()
                .filter(|c| wanted.contains(c.name.as_str()))
                .map(|c| c.name.clone())
                .collect());
        }

        let Some(selector) = &self.cluster_selector else {
            return Ok(BTreeSet::new());
        };

        let selector = parse_selector(selector)?;
        Ok(clusters
            .iter()
            .filter(|c| selector.matches(&c.labels))
            .map(|c| c.name.clone())
            .collect())
    }
}

fn parse_selector(selector: &LabelSelector) -> Result<Selector> {
    for requirement in selector.match_expressions.iter().flatten() {
        validate_requirement(requirement)?;
    }
    Selector::try_from(selector.clone()).map_err(|e| SyncError::InvalidPlacement(e.to_string()))
}

/// Value rules the API server enforces on selector requirements
fn validate_requirement(requirement: &LabelSelectorRequirement) -> Result<()> {
    let has_values = requirement.values.as_ref().is_some_and(|v| !v.is_empty());
    let valid = match requirement.operator.as_str() {
        "In" | "NotIn" => has_values,
        "Exists" | "DoesNotExist" => !has_values,
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidPlacement(format!(
            "invalid values for selector operator '{}' on key '{}'",
            requirement.operator, requirement.key
        )))
    }
}
