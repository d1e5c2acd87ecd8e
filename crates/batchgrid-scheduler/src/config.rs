//! Scheduler configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! schedule_interval_ms = 1000
//! recon_interval_ms = 30000
//! recon_batch_size = 500
//! cleanup_prefix = "cleanup_"
//! cleanup_queue_limit = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cleanup::DEFAULT_CLEANUP_LIMIT;
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval of the job-type / config cache sync worker.
    pub db_sync_interval_ms: u64,
    /// Interval between reconciliation requests to the cluster manager.
    pub recon_interval_ms: u64,
    /// Maximum task IDs sent in one reconciliation request.
    pub recon_batch_size: usize,
    /// Interval of the scheduling / launch worker.
    pub schedule_interval_ms: u64,
    /// Queued jobs considered per scheduling pass.
    pub queue_limit: usize,
    /// Interval at which status updates are flushed to storage.
    pub status_interval_ms: u64,
    /// Warn threshold for callbacks that only touch memory.
    pub in_memory_threshold_ms: u64,
    /// Warn threshold for callbacks that touch durable storage.
    pub db_threshold_ms: u64,
    /// Period after which agent watermarks are reset.
    pub watermark_reset_secs: u64,
    /// Task IDs with this prefix belong to cleanup tasks.
    pub cleanup_prefix: String,
    /// Most finished executions held for cleanup before the oldest are dropped.
    pub cleanup_queue_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_sync_interval_ms: 10_000,
            recon_interval_ms: 30_000,
            recon_batch_size: 500,
            schedule_interval_ms: 1_000,
            queue_limit: 500,
            status_interval_ms: 1_000,
            in_memory_threshold_ms: 5,
            db_threshold_ms: 100,
            watermark_reset_secs: 300,
            cleanup_prefix: "cleanup_".to_string(),
            cleanup_queue_limit: DEFAULT_CLEANUP_LIMIT,
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> SchedulerResult<Self> {
        let config: SchedulerConfig =
            toml::from_str(content).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the workers cannot run with.
    pub fn validate(&self) -> SchedulerResult<()> {
        let intervals = [
            ("db_sync_interval_ms", self.db_sync_interval_ms),
            ("recon_interval_ms", self.recon_interval_ms),
            ("schedule_interval_ms", self.schedule_interval_ms),
            ("status_interval_ms", self.status_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SchedulerError::Config(format!("{name} must be positive")));
            }
        }
        if self.recon_batch_size == 0 {
            return Err(SchedulerError::Config(
                "recon_batch_size must be positive".to_string(),
            ));
        }
        if self.cleanup_queue_limit == 0 {
            return Err(SchedulerError::Config(
                "cleanup_queue_limit must be positive".to_string(),
            ));
        }
        if self.cleanup_prefix.is_empty() {
            return Err(SchedulerError::Config(
                "cleanup_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn db_sync_interval(&self) -> Duration {
        Duration::from_millis(self.db_sync_interval_ms)
    }

    pub fn recon_interval(&self) -> Duration {
        Duration::from_millis(self.recon_interval_ms)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn in_memory_threshold(&self) -> Duration {
        Duration::from_millis(self.in_memory_threshold_ms)
    }

    pub fn db_threshold(&self) -> Duration {
        Duration::from_millis(self.db_threshold_ms)
    }

    pub fn watermark_reset_period(&self) -> Duration {
        Duration::from_secs(self.watermark_reset_secs)
    }
}
