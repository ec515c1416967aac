// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Member cluster client creation and kubeconfig utilities

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::types::KubeFedCluster;
use k8s_openapi::api::core::v1::Secret;
use kube::{config::KubeConfigOptions, Api, Client, Config as KConfig, ResourceExt};
use tracing::{debug, info, instrument};

/// Key of the kubeconfig inside a cluster's secret
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Create a Kubernetes client for a member cluster
#[instrument(skip(host_client, cluster, config), fields(cluster = %cluster.name_any()))]
pub async fn create_member_client(
    host_client: &Client,
    cluster: &KubeFedCluster,
    config: &Config,
) -> Result<Client> {
    if config.testing_mode {
        create_testing_client(cluster).await
    } else {
        let namespace = cluster
            .namespace()
            .unwrap_or_else(|| config.kubefed_namespace.clone());
        let kubeconfig = get_cluster_kubeconfig(host_client, cluster, &namespace).await?;
        create_client_from_kubeconfig(&kubeconfig).await
    }
}

/// Create a client for testing mode: local credentials against the cluster's API endpoint
async fn create_testing_client(cluster: &KubeFedCluster) -> Result<Client> {
    let mut c = KConfig::infer()
        .await
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to infer config: {}", e)))?;

    if !cluster.spec.api_endpoint.is_empty() {
        debug!(
            "Testing mode: using endpoint {} instead of {}",
            cluster.spec.api_endpoint, c.cluster_url
        );
        c.cluster_url = cluster
            .spec
            .api_endpoint
            .parse()
            .map_err(|e| SyncError::KubeconfigError(format!("Invalid URL: {}", e)))?;
    }

    Client::try_from(c)
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to create client: {}", e)))
}

/// Read the kubeconfig of a member cluster from its secret
#[instrument(skip(client, cluster), fields(cluster = %cluster.name_any()))]
async fn get_cluster_kubeconfig(
    client: &Client,
    cluster: &KubeFedCluster,
    namespace: &str,
) -> Result<String> {
    let cluster_name = cluster.name_any();
    let secret_name = cluster.kubeconfig_secret_name();
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    info!(
        "Getting kubeconfig secret '{}/{}' for cluster '{}'...",
        namespace, secret_name, cluster_name
    );

    let secret = secrets.get(&secret_name).await.map_err(|e| {
        SyncError::KubeconfigError(format!(
            "Failed to get kubeconfig secret for cluster {}: {}",
            cluster_name, e
        ))
    })?;

    kubeconfig_from_secret(&secret, &cluster_name)
}

fn kubeconfig_from_secret(secret: &Secret, cluster_name: &str) -> Result<String> {
    let Some(data) = secret.data.as_ref() else {
        return Err(SyncError::KubeconfigError(format!(
            "Kubeconfig secret for cluster {} has no data",
            cluster_name
        )));
    };

    let Some(kubeconfig_data) = data.get(KUBECONFIG_KEY) else {
        return Err(SyncError::KubeconfigError(format!(
            "Kubeconfig secret for cluster {} does not contain '{}' key",
            cluster_name, KUBECONFIG_KEY
        )));
    };

    String::from_utf8(kubeconfig_data.0.clone()).map_err(|e| {
        SyncError::KubeconfigError(format!(
            "Failed to decode kubeconfig for cluster {}: {}",
            cluster_name, e
        ))
    })
}

/// Create a Kubernetes client from a kubeconfig string
async fn create_client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    use kube::config::Kubeconfig;

    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| SyncError::KubeconfigError(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to create client: {}", e)))
}
