// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource types shared by the sync controller.

pub mod cluster;
pub mod name;
pub mod status;
pub mod version;

pub use cluster::{ClusterSnapshot, KubeFedCluster};
pub use name::QualifiedName;
pub use status::{AggregateReason, ClusterOutcome, PropagationStatus, PropagationStatusMap};
pub use version::{PropagatedVersion, VersionMap};
