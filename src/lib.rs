//! Cluster Load Balancer Provider Library
//!
//! Cluster API infrastructure controller that fronts each `ManagedCluster`'s
//! control plane with a cloud load balancer.
//!
//! ## Quick Start
//!
//! ```rust
//! use cluster_lb_provider::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod store;
