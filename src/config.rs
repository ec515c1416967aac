// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::timing;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// apiVersion of the federated type, e.g. `types.kubefed.io/v1beta1`
    pub federated_api_version: String,
    pub federated_kind: String,
    /// apiVersion of the type propagated to member clusters
    pub target_api_version: String,
    pub target_kind: String,
    /// Namespace holding the KubeFedCluster registrations
    pub kubefed_namespace: String,
    pub skip_adopting_resources: bool,
    pub testing_mode: bool,
    pub timing: Timing,
}

/// Delays and timeouts used by the sync controller
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub cluster_available_delay: Duration,
    pub cluster_unavailable_delay: Duration,
    pub update_timeout: Duration,
    pub recheck_delay: Duration,
    pub error_delay: Duration,
    pub resync_period: Duration,
    pub status_poll_interval: Duration,
    pub status_poll_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            cluster_available_delay: Duration::from_secs(timing::CLUSTER_AVAILABLE_DELAY_SECS),
            cluster_unavailable_delay: Duration::from_secs(timing::CLUSTER_UNAVAILABLE_DELAY_SECS),
            update_timeout: Duration::from_secs(timing::UPDATE_TIMEOUT_SECS),
            recheck_delay: Duration::from_secs(timing::RECHECK_DELAY_SECS),
            error_delay: Duration::from_secs(timing::ERROR_DELAY_SECS),
            resync_period: Duration::from_secs(timing::RESYNC_PERIOD_SECS),
            status_poll_interval: Duration::from_secs(timing::STATUS_POLL_INTERVAL_SECS),
            status_poll_timeout: Duration::from_secs(timing::STATUS_POLL_TIMEOUT_SECS),
        }
    }
}

impl Timing {
    /// Shrink delays and timeouts so the controller reacts quickly (useful for testing).
    pub fn minimized(self) -> Self {
        Self {
            cluster_available_delay: Duration::from_secs(1),
            cluster_unavailable_delay: Duration::from_secs(1),
            update_timeout: Duration::from_secs(5),
            recheck_delay: Duration::from_millis(50),
            error_delay: Duration::from_millis(50),
            ..self
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let federated_kind =
            lookup("FEDERATED_KIND").context("FEDERATED_KIND environment variable not set")?;
        let target_kind =
            lookup("TARGET_KIND").context("TARGET_KIND environment variable not set")?;

        let mut timing = Timing {
            cluster_available_delay: parse_secs(
                &lookup,
                "CLUSTER_AVAILABLE_DELAY_SECS",
                timing::CLUSTER_AVAILABLE_DELAY_SECS,
            )?,
            cluster_unavailable_delay: parse_secs(
                &lookup,
                "CLUSTER_UNAVAILABLE_DELAY_SECS",
                timing::CLUSTER_UNAVAILABLE_DELAY_SECS,
            )?,
            update_timeout: parse_secs(&lookup, "UPDATE_TIMEOUT_SECS", timing::UPDATE_TIMEOUT_SECS)?,
            ..Timing::default()
        };
        if parse_or(&lookup, "MINIMIZE_LATENCY", false)? {
            timing = timing.minimized();
        }

        Ok(Config {
            federated_api_version: lookup("FEDERATED_API_VERSION")
                .unwrap_or_else(|| "types.kubefed.io/v1beta1".to_string()),
            federated_kind,
            target_api_version: lookup("TARGET_API_VERSION").unwrap_or_else(|| "v1".to_string()),
            target_kind,
            kubefed_namespace: lookup("KUBEFED_NAMESPACE")
                .unwrap_or_else(|| "kube-federation-system".to_string()),
            skip_adopting_resources: parse_or(&lookup, "SKIP_ADOPTING_RESOURCES", false)?,
            // For testing, uses the KUBECONFIG env var to create member clients instead of fetching kubeconfig from secrets
            testing_mode: parse_or(&lookup, "TESTING_MODE", false)?,
            timing,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default).map(Duration::from_secs)
}
