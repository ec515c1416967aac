// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Error reporting and event recording handed to each component.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, warn};

#[cfg(test)]
use mockall::automock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "Normal",
            EventKind::Warning => "Warning",
        }
    }
}

/// Destination for events attached to federated resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        reference: &ObjectReference,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// Reporting context shared by the controller components
#[derive(Clone)]
pub struct Diagnostics {
    events: Arc<dyn EventSink>,
}

impl Diagnostics {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Report an error that has no better place to go than the log
    pub fn handle_error(&self, context: &str, err: impl Display) {
        error!("{}: {}", context, err);
    }

    /// Publish an event, logging instead of failing when the sink rejects it
    pub async fn record_event(
        &self,
        reference: &ObjectReference,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) {
        if let Err(e) = self.events.publish(reference, kind, reason, message).await {
            warn!(
                "Failed to record {} event {} for {}: {}",
                kind.as_str(),
                reason,
                reference.name.as_deref().unwrap_or_default(),
                e
            );
        }
    }
}
