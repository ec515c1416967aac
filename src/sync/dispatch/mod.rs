// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Concurrent per-cluster operations joined under a shared deadline.
//!
//! Every dispatched operation runs on its own tokio task and resolves its
//! cluster client itself. [`OperationDispatcher::wait`] stops waiting when the
//! deadline passes but never aborts the tasks. A [`Recorder`] is closed once
//! its dispatcher has been joined, so anything those tasks record later is
//! dropped.

pub mod check;
pub mod managed;
pub mod unmanaged;

pub use check::CheckUnmanagedDispatcher;
pub use managed::ManagedDispatcher;
pub use unmanaged::UnmanagedDispatcher;

use crate::cluster::{ClusterClient, ClusterRegistry};
use crate::error::{Result, SyncError};
use crate::types::{ClusterOutcome, PropagationStatus, PropagationStatusMap, VersionMap};
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result of joining dispatched operations
#[derive(Debug)]
pub struct WaitOutcome {
    /// Whether every operation that finished before the deadline succeeded
    pub ok: bool,
    /// Set when the deadline passed before all operations finished
    pub timeout: Option<SyncError>,
}

/// Generic dispatch-and-join core shared by all dispatcher variants
pub struct OperationDispatcher {
    registry: Arc<dyn ClusterRegistry>,
    timeout: Duration,
    pending: Vec<JoinHandle<()>>,
    all_ok: Arc<AtomicBool>,
}

impl OperationDispatcher {
    pub fn new(registry: Arc<dyn ClusterRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            pending: Vec::new(),
            all_ok: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Run `op` against the client of `cluster` on a new task.
    /// The operation receives the client lookup result and reports success.
    pub fn dispatch<F, Fut>(&mut self, cluster: &str, op: F)
    where
        F: FnOnce(Result<Arc<dyn ClusterClient>>) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let registry = self.registry.clone();
        let all_ok = self.all_ok.clone();
        let cluster = cluster.to_string();
        self.pending.push(tokio::spawn(async move {
            let client = registry.client_for_cluster(&cluster).await;
            if !op(client).await {
                all_ok.store(false, Ordering::SeqCst);
            }
        }));
    }

    /// Count a failure that happened before an operation could be dispatched
    pub fn record_failure(&self) {
        self.all_ok.store(false, Ordering::SeqCst);
    }

    /// Wait for all dispatched operations or the deadline, whichever comes first
    pub async fn wait(&mut self) -> WaitOutcome {
        let handles = std::mem::take(&mut self.pending);
        let count = handles.len();
        let timeout = match tokio::time::timeout(self.timeout, join_all(handles)).await {
            Ok(results) => {
                for res in results {
                    if let Err(e) = res {
                        warn!("Cluster operation task failed: {}", e);
                        self.all_ok.store(false, Ordering::SeqCst);
                    }
                }
                None
            }
            Err(_) => {
                debug!("{} cluster operations still pending after {:?}", count, self.timeout);
                Some(SyncError::Timeout(format!(
                    "failed to finish {} operations in {:?}",
                    count, self.timeout
                )))
            }
        };

        WaitOutcome {
            ok: self.all_ok.load(Ordering::SeqCst),
            timeout,
        }
    }
}

/// Per-cluster statuses and versions accumulated by concurrent operations
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Clone, Default)]
struct Recorded {
    statuses: PropagationStatusMap,
    versions: VersionMap,
    /// Set once the operations were joined; later writes are ignored
    closed: bool,
}

impl Recorder {
    /// Apply `update` unless the recorder was closed
    async fn write(&self, cluster: &str, update: impl FnOnce(&mut Recorded)) {
        let mut recorded = self.inner.lock().await;
        if recorded.closed {
            debug!("Cluster {}: discarding result recorded after the deadline", cluster);
            return;
        }
        update(&mut *recorded);
    }

    pub async fn record_status(&self, cluster: &str, status: PropagationStatus) {
        self.write(cluster, |r| {
            r.statuses
                .insert(cluster.to_string(), ClusterOutcome::status(status));
        })
        .await;
    }

    pub async fn record_error(&self, cluster: &str, status: PropagationStatus, err: impl std::fmt::Display) {
        let outcome = ClusterOutcome::error(status, err);
        warn!(
            "Cluster {}: {}: {}",
            cluster,
            status,
            outcome.error.as_deref().unwrap_or_default()
        );
        self.write(cluster, |r| {
            r.statuses.insert(cluster.to_string(), outcome);
        })
        .await;
    }

    pub async fn clear_status(&self, cluster: &str) {
        self.write(cluster, |r| {
            r.statuses.remove(cluster);
        })
        .await;
    }

    /// Record the version written to a cluster, marking it propagated
    pub async fn record_version(&self, cluster: &str, version: String) {
        self.write(cluster, |r| {
            r.versions.insert(cluster.to_string(), version);
            r.statuses
                .insert(cluster.to_string(), ClusterOutcome::status(PropagationStatus::Ok));
        })
        .await;
    }

    /// Freeze the recorded statuses and versions
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
    }

    pub async fn status_map(&self) -> PropagationStatusMap {
        self.inner.lock().await.statuses.clone()
    }

    pub async fn version_map(&self) -> VersionMap {
        self.inner.lock().await.versions.clone()
    }
}
