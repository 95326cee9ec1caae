//! Router configuration.
//!
//! Every field has a default, so a config file only needs the keys it wants to
//! change:
//!
//! ```
//! use waypoint::config::RouterConfig;
//!
//! let config: RouterConfig = serde_json::from_str(r#"{ "timeout_ms": 2500 }"#).unwrap();
//! assert_eq!(config.timeout().unwrap().as_millis(), 2500);
//! assert!(config.log_unit_errors);
//! assert_eq!(config.pool.max_idle, 1024);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Default number of idle contexts a pool keeps for reuse.
const DEFAULT_MAX_IDLE: usize = 1024;

/// Context pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle contexts kept for reuse; extra released contexts are dropped.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

/// Settings applied to every request a [`Router`](crate::Router) serves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-request deadline in milliseconds. Units may still tighten or
    /// relax it with [`Context::set_deadline`](crate::Context::set_deadline).
    pub timeout_ms: Option<u64>,
    /// Log the error and captured trace of failed requests at `error` level.
    pub log_unit_errors: bool,
    pub pool: PoolConfig,
}

impl RouterConfig {
    /// Returns the per-request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            log_unit_errors: true,
            pool: PoolConfig::default(),
        }
    }
}
