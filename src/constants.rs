//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the infrastructure resources owned by this controller
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// API version of the infrastructure resources owned by this controller
pub const INFRASTRUCTURE_VERSION: &str = "v1alpha1";

/// Finalizer placed on `ManagedCluster` objects and on their credential secrets.
/// Matches the group/version string of the infrastructure API.
pub const FINALIZER: &str = "infrastructure.cluster.x-k8s.io/v1alpha1";

/// API group of the owning Cluster API `Cluster`
pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";

/// Annotation that pauses reconciliation of a single object
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Label used to shard resources between controller instances
pub const WATCH_FILTER_LABEL: &str = "cluster.x-k8s.io/watch-filter";

/// Secret data key holding the cloud API token
pub const CREDENTIALS_TOKEN_KEY: &str = "apiToken";

/// Field manager name used for patches
pub const FIELD_MANAGER: &str = "cluster-lb-provider";

/// Default listener port for the control plane load balancer
pub const DEFAULT_LOAD_BALANCER_PORT: i32 = 6443;

/// Default per-reconcile deadline (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 10;

/// Default number of reconcile deadlines a failure may decay over
pub const DEFAULT_RECONCILE_RETRY_BUDGET: u32 = 10;

/// Grace window for decaying conditions when no reconcile timeout is configured (seconds)
pub const DEFAULT_DECAY_TIMEOUT_SECS: u64 = 20 * 60;

/// Delay before retrying a transient failure (seconds)
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 5;

/// Delay before retrying after an optimistic concurrency conflict (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 1;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default cloud API endpoint
pub const DEFAULT_CLOUD_API_URL: &str = "https://api.linode.com";

/// Default timeout for a single cloud API call (seconds)
pub const DEFAULT_CLOUD_CLIENT_TIMEOUT_SECS: u64 = 10;

/// Default Fibonacci backoff floor for terminal errors (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff ceiling for terminal errors (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
