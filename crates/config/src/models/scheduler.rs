use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 调度循环与关联表参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub concurrent_jobs: usize,
    pub fetch_timeout_seconds: u64,
    pub publish_timeout_seconds: u64,
    pub topology_timeout_seconds: u64,
    pub topology_retry_interval_seconds: u64,
    pub correlation_ttl_seconds: u64,
    pub correlation_max_entries: usize,
    pub correlation_sweep_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            concurrent_jobs: 3,
            fetch_timeout_seconds: 30,
            publish_timeout_seconds: 30,
            topology_timeout_seconds: 30,
            topology_retry_interval_seconds: 120,
            correlation_ttl_seconds: 300,
            correlation_max_entries: 10000,
            correlation_sweep_interval_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }

    pub fn topology_timeout(&self) -> Duration {
        Duration::from_secs(self.topology_timeout_seconds)
    }

    pub fn topology_retry_interval(&self) -> Duration {
        Duration::from_secs(self.topology_retry_interval_seconds)
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(crate::ConfigError::Validation(
                "scheduler.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(self.concurrent_jobs, "scheduler.concurrent_jobs", 1000)?;
        ValidationUtils::validate_timeout(
            self.fetch_timeout_seconds,
            "scheduler.fetch_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout(
            self.publish_timeout_seconds,
            "scheduler.publish_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout(
            self.topology_timeout_seconds,
            "scheduler.topology_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout(
            self.topology_retry_interval_seconds,
            "scheduler.topology_retry_interval_seconds",
        )?;
        ValidationUtils::validate_timeout(
            self.correlation_ttl_seconds,
            "scheduler.correlation_ttl_seconds",
        )?;
        ValidationUtils::validate_count(
            self.correlation_max_entries,
            "scheduler.correlation_max_entries",
            1_000_000,
        )?;
        ValidationUtils::validate_timeout(
            self.correlation_sweep_interval_seconds,
            "scheduler.correlation_sweep_interval_seconds",
        )?;
        Ok(())
    }
}
