// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const KUBEFED_GROUP: &str = "core.kubefed.io";

/// Wait for the KubeFedCluster CRD to become available in the host cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_cluster_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_cluster_crd_exists(client).await {
            Ok(true) => {
                info!("KubeFedCluster CRD ({}/v1beta1) is available", KUBEFED_GROUP);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "KubeFedCluster CRD ({}/v1beta1) not yet available, waiting {} seconds...",
                    KUBEFED_GROUP, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for KubeFedCluster CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = next_interval(interval);
    }
}

fn next_interval(interval: u64) -> u64 {
    (interval * 2).min(POLL_MAX_INTERVAL_SECS)
}

async fn check_cluster_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[KUBEFED_GROUP])
        .run()
        .await?;

    for group in discovery.groups() {
        if group.name() == KUBEFED_GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.kind == "KubeFedCluster" && ar.version == "v1beta1" {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}
