// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fedsync::cluster::KubeClusterRegistry;
use fedsync::config::Config;
use fedsync::diagnostics::Diagnostics;
use fedsync::federated::accessor::KubeFederatedAccessor;
use fedsync::federated::versions::KubeVersionStore;
use fedsync::federated::TypeConfig;
use fedsync::kubernetes::{wait_for_cluster_crd, KubeEventSink, KubeHostClient};
use fedsync::reconcilers::federated::resource_controller;
use fedsync::reconcilers::{ClusterReconciler, FederatedReconciler};
use fedsync::sync::{ReconcileTriggers, SyncController, SyncManager, SyncSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fedsync controller");

    // Load configuration
    let config = Config::from_env()?;
    let types = TypeConfig::from_config(&config);
    info!(
        "Configuration loaded: federated={} target={} kubefed_namespace={}",
        types.federated.kind, types.target.kind, config.kubefed_namespace
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to host cluster");

    // Wait for the KubeFedCluster CRD before starting reconcilers
    info!("Waiting for KubeFedCluster CRD to become available...");
    wait_for_cluster_crd(&client).await?;

    // Create the sync manager and get a handle for the cluster registry
    let (sync_manager, sync_handle) = SyncManager::new(config.timing.clone(), types.clone());
    let (triggers, trigger_streams) = ReconcileTriggers::new(types.federated.clone());

    let resources = resource_controller(client.clone(), &types);

    let registry = Arc::new(KubeClusterRegistry::new(
        client.clone(),
        config.clone(),
        types.target.clone(),
        sync_handle.clone(),
    ));
    let diagnostics = Diagnostics::new(Arc::new(KubeEventSink::new(
        client.clone(),
        &config.kubefed_namespace,
    )));
    let versions = Arc::new(KubeVersionStore::new(client.clone(), &config.kubefed_namespace));
    let accessor = Arc::new(KubeFederatedAccessor::new(
        client.clone(),
        resources.store(),
        types.clone(),
        registry.clone(),
        versions,
        diagnostics.clone(),
    ));
    let host = Arc::new(KubeHostClient::new(client.clone(), types.federated.clone()));
    let controller = Arc::new(SyncController::new(
        registry.clone(),
        accessor,
        host,
        diagnostics,
        SyncSettings::from_config(&config),
    ));

    let cluster_reconciler = ClusterReconciler::new(
        client.clone(),
        &config.kubefed_namespace,
        registry,
        sync_handle,
    );
    let federated_reconciler = FederatedReconciler::new(controller.clone(), config.timing.clone());

    info!("Starting reconcilers...");

    // Run sync manager and both reconcilers concurrently
    tokio::try_join!(
        sync_manager.run(controller, triggers),
        cluster_reconciler.run(),
        federated_reconciler.run(resources, trigger_streams)
    )?;

    // This should never be reached as reconcilers run forever
    warn!("All reconcilers stopped unexpectedly");
    Ok(())
}
