// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Propagation of federated resources to member clusters.

pub mod controller;
pub mod deletion;
pub mod dispatch;
pub mod manager;
pub mod status;

pub use controller::{ReconciliationStatus, SyncController, SyncSettings};
pub use manager::{ReconcileTriggers, SyncEvent, SyncManager, SyncManagerHandle};
