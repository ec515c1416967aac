// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Writes the aggregated propagation status of a federated resource.

use crate::diagnostics::Diagnostics;
use crate::error::{Result, SyncError};
use crate::federated::{FederatedResource, HostClient};
use crate::sync::ReconciliationStatus;
use crate::types::status::apply_propagation_status;
use crate::types::{AggregateReason, PropagationStatusMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Poll window for status writes that hit a conflict
#[derive(Clone, Copy, Debug)]
pub struct StatusRetry {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Merge `reason` and `status_map` into the status of `fed` and write it.
///
/// A conflicting write re-fetches the latest object and merges again, so
/// statuses are never written onto a stale base.
#[instrument(skip_all, fields(resource = %fed.federated_name(), reason = %reason))]
pub async fn set_propagation_status(
    host: &dyn HostClient,
    diagnostics: &Diagnostics,
    retry: StatusRetry,
    fed: &mut FederatedResource,
    reason: AggregateReason,
    status_map: Option<&PropagationStatusMap>,
) -> ReconciliationStatus {
    match write_status(host, retry, fed, reason, status_map).await {
        Ok(()) => ReconciliationStatus::AllOk,
        Err(e) => {
            diagnostics.handle_error(
                &format!(
                    "Failed to set propagation status for {} {}",
                    fed.federated_kind(),
                    fed.federated_name()
                ),
                e,
            );
            ReconciliationStatus::Error
        }
    }
}

async fn write_status(
    host: &dyn HostClient,
    retry: StatusRetry,
    fed: &mut FederatedResource,
    reason: AggregateReason,
    status_map: Option<&PropagationStatusMap>,
) -> Result<()> {
    let deadline = Instant::now() + retry.timeout;
    loop {
        if !apply_propagation_status(fed.object_mut(), reason, status_map)? {
            debug!("Propagation status unchanged");
            return Ok(());
        }

        let err = match host.update_status(fed.object()).await {
            Ok(updated) => {
                fed.set_object(updated);
                return Ok(());
            }
            Err(e) if e.is_conflict() => e,
            Err(e) => return Err(e),
        };

        debug!("Conflict writing propagation status, will retry: {}", err);
        let latest = host
            .get(&fed.federated_name())
            .await?
            .ok_or_else(|| SyncError::NotFound(fed.federated_name().to_string()))?;
        fed.set_object(latest);

        if Instant::now() + retry.interval > deadline {
            return Err(SyncError::Timeout(format!(
                "status still conflicting after {:?}: {}",
                retry.timeout, err
            )));
        }
        tokio::time::sleep(retry.interval).await;
    }
}
