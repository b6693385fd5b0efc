//! Worker pool sizing

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the acquisition worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// Capacity of the event channel between workers and the collector
    pub event_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            event_buffer_size: workers::CHANNEL_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Check pool sizing against the transport's in-flight permits
    ///
    /// Transport must be the throughput bottleneck, so it may never hold
    /// more permits than there are workers to use them.
    pub fn validate(&self, transport_permits: usize) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::invalid(
                "workers.worker_count",
                self.worker_count,
                "at least one worker is required",
            ));
        }
        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(ConfigError::invalid(
                "workers.worker_count",
                self.worker_count,
                format!("must not exceed {}", workers::MAX_WORKER_COUNT),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "workers.event_buffer_size",
                self.event_buffer_size,
                "must be greater than zero",
            ));
        }
        if transport_permits > self.worker_count {
            return Err(ConfigError::invalid(
                "transport.max_in_flight",
                transport_permits,
                format!(
                    "must be less than or equal to the worker count ({})",
                    self.worker_count
                ),
            ));
        }
        Ok(())
    }
}
