//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use cluster_lb_provider::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Adapter seams and their implementations
pub use crate::controller::events::{EventPublisher, KubeEventPublisher, RecordingEventPublisher};
pub use crate::provider::{
    AdapterError, CloudClientFactory, FakeCloudClientFactory, FakeLoadBalancerApi,
    LoadBalancerApi, RestClientFactory,
};
pub use crate::store::{KubeStore, MemoryStore, ObjectStore, Scheme, StoreError};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, reconcile_managed_cluster, Clock, ClusterScope, ClusterScopeParams, ManualClock,
    Reconciler, ReconcilerError, SystemClock,
};

pub use crate::config::ControllerConfig;
