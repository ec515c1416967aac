// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes API implementations of the sync controller's client seams,
//! member client creation and CRD discovery.

pub mod api;
pub mod client;
pub mod crd;
pub mod events;

pub use api::{KubeClusterClient, KubeHostClient};
pub use client::create_member_client;
pub use crd::wait_for_cluster_crd;
pub use events::KubeEventSink;
