// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes events published on federated resources

use crate::constants::OPERATOR_NAME;
use crate::diagnostics::{EventKind, EventSink};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};

/// Publishes core/v1 events in the namespace of the involved object
pub struct KubeEventSink {
    client: Client,
    /// Namespace for events about cluster-scoped objects
    default_namespace: String,
}

impl KubeEventSink {
    pub fn new(client: Client, default_namespace: &str) -> Self {
        Self {
            client,
            default_namespace: default_namespace.to_string(),
        }
    }
}

fn build_event(
    object: &ObjectReference,
    namespace: &str,
    kind: EventKind,
    reason: &str,
    message: &str,
) -> Event {
    let now = Time(Utc::now());
    let prefix = object.name.as_deref().unwrap_or(OPERATOR_NAME);
    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}.", prefix)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        involved_object: object.clone(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        type_: Some(kind.as_str().to_string()),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        count: Some(1),
        source: Some(EventSource {
            component: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(
        &self,
        object: &ObjectReference,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let namespace = object
            .namespace
            .as_deref()
            .unwrap_or(&self.default_namespace);
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let event = build_event(object, namespace, kind, reason, message);
        events.create(&PostParams::default(), &event).await?;
        Ok(())
    }
}
