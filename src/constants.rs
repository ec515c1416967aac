// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Finalizer that gates removal of a federated resource until its managed
/// copies have been cleaned up.
pub const FINALIZER: &str = "kubefed.io/sync-controller";

/// Kubernetes annotation keys used on federated resources
pub mod annotations {
    /// When set to "true", managed copies are detached instead of deleted
    pub const ORPHAN: &str = "kubefed.io/orphan";
}

/// Label keys set on objects in member clusters
pub mod labels {
    /// Marks a member cluster object as managed by a federated resource
    pub const MANAGED: &str = "kubefed.io/managed";
    pub const MANAGED_VALUE: &str = "true";
}

/// Event reasons recorded on federated resources
pub mod reasons {
    pub const ENSURE_FINALIZER_ERROR: &str = "EnsureFinalizerError";
    pub const OPERATION_TIMEOUT_ERROR: &str = "OperationTimeoutError";
}

/// The operator name used as field manager and event reporter
pub const OPERATOR_NAME: &str = "fedsync";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Reconcile timing defaults
pub mod timing {
    pub const CLUSTER_AVAILABLE_DELAY_SECS: u64 = 20;
    pub const CLUSTER_UNAVAILABLE_DELAY_SECS: u64 = 60;
    pub const UPDATE_TIMEOUT_SECS: u64 = 30;
    pub const RECHECK_DELAY_SECS: u64 = 10;
    pub const ERROR_DELAY_SECS: u64 = 10;
    pub const RESYNC_PERIOD_SECS: u64 = 300;
    pub const STATUS_POLL_INTERVAL_SECS: u64 = 1;
    pub const STATUS_POLL_TIMEOUT_SECS: u64 = 5;
}
