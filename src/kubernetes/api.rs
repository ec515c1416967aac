// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! kube-rs backed clients for member cluster objects and federated resources

use crate::cluster::ClusterClient;
use crate::constants::OPERATOR_NAME;
use crate::error::{Result, SyncError};
use crate::federated::HostClient;
use crate::types::QualifiedName;
use async_trait::async_trait;
use kube::api::{ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, instrument};

fn dynamic_api(client: &Client, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, resource),
        None => Api::all_with(client.clone(), resource),
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

/// Client for the target type in one member cluster
pub struct KubeClusterClient {
    cluster: String,
    client: Client,
    resource: ApiResource,
}

impl KubeClusterClient {
    pub fn new(cluster: &str, client: Client, resource: ApiResource) -> Self {
        Self {
            cluster: cluster.to_string(),
            client,
            resource,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        dynamic_api(&self.client, &self.resource, namespace)
    }

    fn describe(&self, name: &QualifiedName) -> String {
        format!("{} {} in cluster {}", self.resource.kind, name, self.cluster)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(&self, name: &QualifiedName) -> Result<Option<DynamicObject>> {
        self.api(name.namespace())
            .get_opt(&name.name)
            .await
            .map_err(|e| SyncError::from_kube(e, &self.describe(name)))
    }

    #[instrument(skip(self, obj), fields(cluster = %self.cluster, resource = %QualifiedName::of(obj)))]
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = QualifiedName::of(obj);
        let created = self
            .api(name.namespace())
            .create(&post_params(), obj)
            .await
            .map_err(|e| SyncError::from_kube(e, &self.describe(&name)))?;
        debug!("Created {}", self.describe(&name));
        Ok(created)
    }

    #[instrument(skip(self, obj), fields(cluster = %self.cluster, resource = %QualifiedName::of(obj)))]
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = QualifiedName::of(obj);
        let updated = self
            .api(name.namespace())
            .replace(&obj.name_any(), &post_params(), obj)
            .await
            .map_err(|e| SyncError::from_kube(e, &self.describe(&name)))?;
        debug!("Updated {}", self.describe(&name));
        Ok(updated)
    }

    #[instrument(skip(self), fields(cluster = %self.cluster, resource = %name))]
    async fn delete(&self, name: &QualifiedName) -> Result<()> {
        match self
            .api(name.namespace())
            .delete(&name.name, &DeleteParams::background())
            .await
        {
            Ok(_) => {
                debug!("Deleted {}", self.describe(name));
                Ok(())
            }
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(SyncError::from_kube(e, &self.describe(name))),
        }
    }
}

/// Client for federated resources in the host cluster
pub struct KubeHostClient {
    client: Client,
    resource: ApiResource,
}

impl KubeHostClient {
    pub fn new(client: Client, resource: ApiResource) -> Self {
        Self { client, resource }
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        dynamic_api(&self.client, &self.resource, namespace)
    }
}

#[async_trait]
impl HostClient for KubeHostClient {
    async fn get(&self, name: &QualifiedName) -> Result<Option<DynamicObject>> {
        Ok(self.api(name.namespace()).get_opt(&name.name).await?)
    }

    #[instrument(skip(self, obj), fields(resource = %QualifiedName::of(obj)))]
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = QualifiedName::of(obj);
        self.api(name.namespace())
            .replace(&name.name, &post_params(), obj)
            .await
            .map_err(|e| SyncError::from_kube(e, &name.to_string()))
    }

    /// Write the status of `obj`, failing with a conflict if it is stale
    #[instrument(skip(self, obj), fields(resource = %QualifiedName::of(obj)))]
    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = QualifiedName::of(obj);
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": obj.data.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        let pp = PatchParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        self.api(name.namespace())
            .patch_status(&name.name, &pp, &Patch::Merge(&patch))
            .await
            .map_err(|e| SyncError::from_kube(e, &name.to_string()))
    }
}
