//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! The label and annotation keys are load-bearing: workloads mount the
//! managed secret through a volume named [`AIVEN_VOLUME_NAME`], and the
//! janitor selects secrets by [`SECRET_TYPE_LABEL`].

/// Volume name workloads use to mount the managed secret
pub const AIVEN_VOLUME_NAME: &str = "aiven-credentials";

/// Label key identifying the kind of secret
pub const SECRET_TYPE_LABEL: &str = "type";

/// Label value marking a secret as managed by this controller
pub const AIVENATOR_SECRET_TYPE: &str = "aivenator-managed";

/// Label key carrying the owning application name
pub const APP_LABEL: &str = "app";

/// Label key carrying the owning team (the application namespace)
pub const TEAM_LABEL: &str = "team";

/// Annotation pinning a secret against overwrite and deletion
pub const AIVENATOR_PROTECTED_ANNOTATION: &str = "aivenator.aiven.nais.io/protected";

/// Platform-wide annotation linking resources of one deployment rollout
pub const DEPLOYMENT_CORRELATION_ID_ANNOTATION: &str = "nais.io/deploymentCorrelationID";

/// Key in the secret's stringData holding the RFC3339 write timestamp
pub const AIVEN_CREATED_KEY: &str = "AivenCreated";

/// Synchronization state after a successful reconciliation
pub const ROLLOUT_COMPLETE: &str = "RolloutComplete";

/// Synchronization state after a failed reconciliation
pub const ROLLOUT_FAILED: &str = "RolloutFailed";

/// Synchronization state label value before the first attempt finishes
pub const UNKNOWN_STATE: &str = "unknown";

/// Standard requeue interval for recoverable failures (seconds)
pub const REQUEUE_INTERVAL_SECS: u64 = 10;

/// Upper bound on the owner-reference drift requeue interval (seconds)
pub const MAX_REQUEUE_INTERVAL_SECS: u64 = 300;

/// Deadline for a single secret write against the cluster (seconds)
pub const SECRET_WRITE_TIMEOUT_SECS: u64 = 2;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default interval between cluster-wide janitor sweeps (seconds)
pub const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 300;

/// Default number of simultaneous reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 10;
