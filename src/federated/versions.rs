// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Persistence of propagated versions.

use crate::constants::OPERATOR_NAME;
use crate::error::{Result, SyncError};
use crate::types::version::{propagated_version_name, PropagatedVersionSpec};
use crate::types::{PropagatedVersion, QualifiedName};
use async_trait::async_trait;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// Storage for the versions last propagated for each federated resource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get(
        &self,
        federated_kind: &str,
        name: &QualifiedName,
    ) -> Result<Option<PropagatedVersionSpec>>;

    async fn update(
        &self,
        federated_kind: &str,
        name: &QualifiedName,
        spec: &PropagatedVersionSpec,
    ) -> Result<()>;

    async fn delete(&self, federated_kind: &str, name: &QualifiedName) -> Result<()>;
}

/// Stores versions as `PropagatedVersion` resources next to the federated resource
pub struct KubeVersionStore {
    client: Client,
    /// Used for federated resources without a namespace
    fallback_namespace: String,
}

impl KubeVersionStore {
    pub fn new(client: Client, fallback_namespace: &str) -> Self {
        Self {
            client,
            fallback_namespace: fallback_namespace.to_string(),
        }
    }

    fn api(&self, name: &QualifiedName) -> Api<PropagatedVersion> {
        let namespace = name.namespace().unwrap_or(&self.fallback_namespace);
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl VersionStore for KubeVersionStore {
    async fn get(
        &self,
        federated_kind: &str,
        name: &QualifiedName,
    ) -> Result<Option<PropagatedVersionSpec>> {
        let record = self
            .api(name)
            .get_opt(&propagated_version_name(federated_kind, &name.name))
            .await?;
        Ok(record.map(|r| r.spec))
    }

    #[instrument(skip(self, spec), fields(resource = %name))]
    async fn update(
        &self,
        federated_kind: &str,
        name: &QualifiedName,
        spec: &PropagatedVersionSpec,
    ) -> Result<()> {
        let api = self.api(name);
        let record_name = propagated_version_name(federated_kind, &name.name);

        match api.get_opt(&record_name).await? {
            Some(mut existing) => {
                existing.spec = spec.clone();
                api.replace(&record_name, &PostParams::default(), &existing)
                    .await
                    .map_err(|e| SyncError::from_kube(e, &record_name))?;
                debug!("Updated propagated versions {}", record_name);
            }
            None => {
                let record = PropagatedVersion {
                    metadata: ObjectMeta {
                        name: Some(record_name.clone()),
                        namespace: name.namespace().map(str::to_string),
                        ..Default::default()
                    },
                    spec: spec.clone(),
                };
                let pp = PostParams {
                    field_manager: Some(OPERATOR_NAME.to_string()),
                    ..Default::default()
                };
                api.create(&pp, &record)
                    .await
                    .map_err(|e| SyncError::from_kube(e, &record_name))?;
                debug!("Created propagated versions {}", record_name);
            }
        }
        Ok(())
    }

    async fn delete(&self, federated_kind: &str, name: &QualifiedName) -> Result<()> {
        let record_name = propagated_version_name(federated_kind, &name.name);
        match self
            .api(name)
            .delete(&record_name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
