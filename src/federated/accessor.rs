// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Federated resource lookup backed by the controller's reflector store.

use crate::cluster::ClusterRegistry;
use crate::constants::labels;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::federated::{
    FederatedResource, FederatedResourceAccessor, ResourceLookup, TypeConfig, VersionStore,
};
use crate::types::QualifiedName;
use async_trait::async_trait;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct KubeFederatedAccessor {
    store: Store<DynamicObject>,
    type_config: TypeConfig,
    namespaces: Api<Namespace>,
    registry: Arc<dyn ClusterRegistry>,
    versions: Arc<dyn VersionStore>,
    diagnostics: Diagnostics,
}

impl KubeFederatedAccessor {
    pub fn new(
        client: Client,
        store: Store<DynamicObject>,
        type_config: TypeConfig,
        registry: Arc<dyn ClusterRegistry>,
        versions: Arc<dyn VersionStore>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            store,
            type_config,
            namespaces: Api::all(client),
            registry,
            versions,
            diagnostics,
        }
    }

    fn object_ref(&self, name: &QualifiedName) -> ObjectRef<DynamicObject> {
        let reference = ObjectRef::new_with(&name.name, self.type_config.federated.clone());
        match name.namespace() {
            Some(ns) => reference.within(ns),
            None => reference,
        }
    }

    /// UID of the host cluster namespace federated by a federated namespace
    async fn host_namespace_uid(&self, name: &QualifiedName) -> Result<Option<String>> {
        if !self.type_config.target_is_namespace() {
            return Ok(None);
        }
        let namespace = self.namespaces.get_opt(&name.namespace).await?;
        Ok(namespace.and_then(|ns| ns.uid()))
    }

    /// A labeled copy in any ready cluster means the resource used to be managed
    fn has_managed_copies(&self, target: &QualifiedName) -> Result<bool> {
        for cluster in self.registry.get_ready_clusters()? {
            let copy = self.registry.cached_object(&cluster.name, target)?;
            if copy.is_some_and(|obj| obj.labels().get(labels::MANAGED).is_some()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl FederatedResourceAccessor for KubeFederatedAccessor {
    fn has_synced(&self) -> bool {
        let synced = matches!(self.store.wait_until_ready().now_or_never(), Some(Ok(())));
        if !synced {
            debug!("{} store not yet synced", self.type_config.federated.kind);
        }
        synced
    }

    async fn federated_resource(&self, name: &QualifiedName) -> Result<ResourceLookup> {
        let Some(object) = self.store.get(&self.object_ref(name)) else {
            let target = self.type_config.target_name(name);
            return if self.has_managed_copies(&target)? {
                Ok(ResourceLookup::PossibleOrphan(target))
            } else {
                Ok(ResourceLookup::Absent)
            };
        };

        let host_namespace_uid = self.host_namespace_uid(name).await?;
        let recorded = match self
            .versions
            .get(&self.type_config.federated.kind, name)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!("Ignoring propagated versions of {}: {}", name, e);
                None
            }
        };

        Ok(ResourceLookup::Found(Box::new(FederatedResource::new(
            (*object).clone(),
            self.type_config.clone(),
            host_namespace_uid,
            recorded,
            self.versions.clone(),
            self.diagnostics.clone(),
        ))))
    }

    fn contains(&self, name: &QualifiedName) -> bool {
        self.store.get(&self.object_ref(name)).is_some()
    }

    fn federated_names(&self) -> Vec<QualifiedName> {
        self.store
            .state()
            .iter()
            .map(|obj| QualifiedName::of(obj.as_ref()))
            .collect()
    }
}
