//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::*;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap (and the token from a Secret)
/// using `envFrom` in the deployment.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Controller-wide cloud API token.
    /// Used only when neither the resource nor its owner references a credentials secret.
    pub cloud_api_token: String,
    /// Base URL of the cloud API
    pub cloud_api_url: String,
    /// Per-request timeout for cloud API calls (seconds)
    pub cloud_client_timeout_secs: u64,
    /// Per-reconcile deadline (seconds).
    /// When unset, failures decay over a fixed 20 minute window.
    pub reconcile_timeout_secs: Option<u64>,
    /// Number of reconcile deadlines a failure may decay over before it becomes terminal
    pub reconcile_retry_budget: u32,
    /// Delay before retrying a failure that is still within its grace window (seconds)
    pub requeue_delay_secs: u64,
    /// Delay before retrying after an optimistic concurrency conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Fibonacci backoff floor for terminal errors (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling for terminal errors (seconds)
    pub backoff_max_secs: u64,
    /// Only reconcile resources labelled `cluster.x-k8s.io/watch-filter=<value>`
    pub watch_filter_value: Option<String>,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("cloud_api_token", &"***")
            .field("cloud_api_url", &self.cloud_api_url)
            .field("cloud_client_timeout_secs", &self.cloud_client_timeout_secs)
            .field("reconcile_timeout_secs", &self.reconcile_timeout_secs)
            .field("reconcile_retry_budget", &self.reconcile_retry_budget)
            .field("requeue_delay_secs", &self.requeue_delay_secs)
            .field("conflict_requeue_secs", &self.conflict_requeue_secs)
            .field("backoff_min_secs", &self.backoff_min_secs)
            .field("backoff_max_secs", &self.backoff_max_secs)
            .field("watch_filter_value", &self.watch_filter_value)
            .field("max_concurrent_reconciliations", &self.max_concurrent_reconciliations)
            .field("metrics_port", &self.metrics_port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cloud_api_token: String::new(),
            cloud_api_url: DEFAULT_CLOUD_API_URL.to_string(),
            cloud_client_timeout_secs: DEFAULT_CLOUD_CLIENT_TIMEOUT_SECS,
            reconcile_timeout_secs: Some(DEFAULT_RECONCILE_TIMEOUT_SECS),
            reconcile_retry_budget: DEFAULT_RECONCILE_RETRY_BUDGET,
            requeue_delay_secs: DEFAULT_REQUEUE_DELAY_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_filter_value: None,
            max_concurrent_reconciliations: 10,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup with defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let reconcile_timeout_secs = match lookup("RECONCILE_TIMEOUT_SECS") {
            // An explicit 0 disables the deadline and selects the fixed decay window
            Some(v) => match v.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(secs),
                Err(e) => {
                    warn!(value = %v, error = %e, default = DEFAULT_RECONCILE_TIMEOUT_SECS, "invalid RECONCILE_TIMEOUT_SECS, using default");
                    defaults.reconcile_timeout_secs
                }
            },
            None => defaults.reconcile_timeout_secs,
        };

        Self {
            cloud_api_token: lookup("CLOUD_API_TOKEN").unwrap_or_default(),
            cloud_api_url: or_default_str(&lookup, "CLOUD_API_URL", &defaults.cloud_api_url),
            cloud_client_timeout_secs: or_default(
                &lookup,
                "CLOUD_CLIENT_TIMEOUT_SECS",
                defaults.cloud_client_timeout_secs,
            ),
            reconcile_timeout_secs,
            reconcile_retry_budget: or_default(
                &lookup,
                "RECONCILE_RETRY_BUDGET",
                defaults.reconcile_retry_budget,
            ),
            requeue_delay_secs: or_default(&lookup, "REQUEUE_DELAY_SECS", defaults.requeue_delay_secs),
            conflict_requeue_secs: or_default(
                &lookup,
                "CONFLICT_REQUEUE_SECS",
                defaults.conflict_requeue_secs,
            ),
            backoff_min_secs: or_default(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: or_default(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            watch_filter_value: lookup("WATCH_FILTER_VALUE").filter(|v| !v.is_empty()),
            max_concurrent_reconciliations: or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            metrics_port: or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: or_default_str(&lookup, "LOG_LEVEL", &defaults.log_level),
            log_format: or_default_str(&lookup, "LOG_FORMAT", &defaults.log_format),
        }
    }

    /// Per-reconcile deadline, if one is configured
    pub fn reconcile_timeout(&self) -> Option<Duration> {
        self.reconcile_timeout_secs.map(Duration::from_secs)
    }

    /// Grace window a decaying failure stays non-terminal for
    ///
    /// Falls back to the fixed window when the deadline is disabled or the
    /// product does not fit in a `Duration`.
    pub fn decay_timeout(&self) -> Duration {
        self.reconcile_timeout()
            .and_then(|timeout| timeout.checked_mul(self.reconcile_retry_budget))
            .unwrap_or(Duration::from_secs(DEFAULT_DECAY_TIMEOUT_SECS))
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }

    pub fn conflict_requeue_delay(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    pub fn cloud_client_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud_client_timeout_secs)
    }
}

/// Read a key or return default value
fn or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a key as string or return default
fn or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
