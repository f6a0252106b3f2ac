//! # Runtime
//!
//! Process-level wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: kube-runtime controller driving reconciles
//! - `error_policy`: requeue decisions for failed reconciles

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
