// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rendering of the per-cluster object from `spec.template` and
//! `spec.overrides`.

use crate::constants::labels;
use crate::error::{Result, SyncError};
use crate::types::QualifiedName;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct ClusterOverrides {
    cluster_name: String,
    #[serde(default)]
    cluster_overrides: Vec<Override>,
}

/// A JSON patch style operation applied to the rendered object
#[derive(Deserialize, Clone, Debug)]
struct Override {
    #[serde(default)]
    op: Option<String>,
    path: String,
    #[serde(default)]
    value: Option<Value>,
}

const PROTECTED_PATHS: &[&str] = &["/apiVersion", "/kind", "/metadata/name", "/metadata/namespace"];

/// Build the object that should exist in `cluster`, labeled as managed
pub fn render_for_cluster(
    federated: &DynamicObject,
    target: &ApiResource,
    target_name: &QualifiedName,
    cluster: &str,
) -> Result<DynamicObject> {
    let template = match federated.data.pointer("/spec/template") {
        Some(Value::Object(template)) => template.clone(),
        Some(_) => {
            return Err(SyncError::InvalidTemplate(
                "spec.template must be an object".to_string(),
            ))
        }
        None => Map::new(),
    };

    let mut rendered = Value::Object(template);
    rendered["apiVersion"] = Value::String(target.api_version.clone());
    rendered["kind"] = Value::String(target.kind.clone());

    let metadata = rendered
        .as_object_mut()
        .map(|o| o.entry("metadata").or_insert_with(|| Value::Object(Map::new())))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            SyncError::InvalidTemplate("spec.template.metadata must be an object".to_string())
        })?;
    metadata.insert("name".to_string(), Value::String(target_name.name.clone()));
    match target_name.namespace() {
        Some(ns) => {
            metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
        }
        None => {
            metadata.remove("namespace");
        }
    }

    for ov in overrides_for(federated, cluster)? {
        if PROTECTED_PATHS.contains(&ov.path.as_str()) {
            return Err(SyncError::InvalidTemplate(format!(
                "override of {} is not allowed",
                ov.path
            )));
        }
        apply_override(&mut rendered, &ov)?;
    }

    let mut obj: DynamicObject = serde_json::from_value(rendered)?;
    obj.labels_mut()
        .insert(labels::MANAGED.to_string(), labels::MANAGED_VALUE.to_string());
    Ok(obj)
}

/// Carry over fields of the member cluster object that other controllers own
/// or that the API server requires on update
pub fn retain_cluster_fields(target_kind: &str, desired: &mut DynamicObject, cluster_obj: &DynamicObject) {
    desired.metadata.resource_version = cluster_obj.metadata.resource_version.clone();
    desired.metadata.finalizers = cluster_obj.metadata.finalizers.clone();

    if let Some(cluster_annotations) = &cluster_obj.metadata.annotations {
        let mut merged = cluster_annotations.clone();
        merged.extend(desired.annotations().clone());
        desired.metadata.annotations = Some(merged);
    }

    let retained: &[&str] = match target_kind {
        "Service" => &["/spec/clusterIP", "/spec/clusterIPs", "/spec/healthCheckNodePort"],
        "ServiceAccount" => &["/secrets"],
        _ => &[],
    };
    for path in retained {
        let Some(value) = cluster_obj.data.pointer(path) else {
            continue;
        };
        if desired.data.pointer(path).is_some() {
            continue;
        }
        let ov = Override {
            op: Some("add".to_string()),
            path: path.to_string(),
            value: Some(value.clone()),
        };
        // Paths are fixed above and always address an object member
        let _ = apply_override(&mut desired.data, &ov);
    }
}

fn overrides_for(federated: &DynamicObject, cluster: &str) -> Result<Vec<Override>> {
    let Some(raw) = federated.data.pointer("/spec/overrides") else {
        return Ok(Vec::new());
    };
    let all: Vec<ClusterOverrides> = serde_json::from_value(raw.clone())
        .map_err(|e| SyncError::InvalidTemplate(format!("invalid spec.overrides: {}", e)))?;

    Ok(all
        .into_iter()
        .filter(|o| o.cluster_name == cluster)
        .flat_map(|o| o.cluster_overrides)
        .collect())
}

fn pointer_tokens(path: &str) -> Result<Vec<String>> {
    let rest = path.strip_prefix('/').ok_or_else(|| {
        SyncError::InvalidTemplate(format!("override path '{}' must start with '/'", path))
    })?;
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn array_index(token: &str, len: usize, path: &str) -> Result<usize> {
    token
        .parse::<usize>()
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| SyncError::InvalidTemplate(format!("invalid array index in '{}'", path)))
}

fn apply_override(root: &mut Value, ov: &Override) -> Result<()> {
    let op = ov.op.as_deref().unwrap_or("replace");
    if !matches!(op, "add" | "replace" | "remove") {
        return Err(SyncError::InvalidTemplate(format!(
            "unsupported override operation '{}'",
            op
        )));
    }

    let tokens = pointer_tokens(&ov.path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(SyncError::InvalidTemplate("empty override path".to_string()));
    };

    let mut current = root;
    for token in parents {
        current = match current {
            Value::Object(map) => {
                if op == "remove" && !map.contains_key(token) {
                    return Ok(());
                }
                map.entry(token.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => {
                let idx = array_index(token, items.len(), &ov.path)?;
                &mut items[idx]
            }
            _ => {
                return Err(SyncError::InvalidTemplate(format!(
                    "override path '{}' crosses a scalar value",
                    ov.path
                )))
            }
        };
    }

    let value = ov.value.clone().unwrap_or(Value::Null);
    match (op, current) {
        ("remove", Value::Object(map)) => {
            map.remove(last);
        }
        ("remove", Value::Array(items)) => {
            let idx = array_index(last, items.len(), &ov.path)?;
            items.remove(idx);
        }
        (_, Value::Object(map)) => {
            map.insert(last.clone(), value);
        }
        ("add", Value::Array(items)) if last == "-" => items.push(value),
        ("add", Value::Array(items)) => {
            let idx = array_index(last, items.len() + 1, &ov.path)?;
            items.insert(idx, value);
        }
        (_, Value::Array(items)) => {
            let idx = array_index(last, items.len(), &ov.path)?;
            items[idx] = value;
        }
        _ => {
            return Err(SyncError::InvalidTemplate(format!(
                "override path '{}' does not address an object or array",
                ov.path
            )))
        }
    }
    Ok(())
}
