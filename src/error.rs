// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Cluster not ready: {0}")]
    ClusterNotReady(String),

    #[error("Unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Cluster operation failed: {0}")]
    ClusterOperation(String),
}

impl SyncError {
    /// Classify a kube API error, turning 404/409 responses into dedicated variants.
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => SyncError::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                SyncError::AlreadyExists(what.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                SyncError::Conflict(format!("{}: {}", what, ae.message))
            }
            other => SyncError::KubeError(other),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, SyncError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
