//! # Controller
//!
//! Core controller modules for the load balancer provider.
//!
//! - `backoff`: Fibonacci backoff for terminal reconcile errors
//! - `events`: Kubernetes event publishing
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod events;
pub mod reconciler;
pub mod server;
