use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AcquisitionError;

/// Configuration for a pipeline worker.
///
/// Serializable so it can be loaded from a JSON file; durations are carried
/// as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of poll threads (0 = all available parallelism).
    pub worker_count: usize,

    /// Sleep between polls when the source has nothing to deliver (default: 5 ms).
    pub poll_interval_ms: u64,

    /// Deliver results in arrival order instead of reordering by sequence number.
    pub keep_out_of_sequence: bool,

    /// Reordering cutoff for the output queue (default: 90).
    pub queue_soft_limit: usize,

    /// Absolute capacity of the output queue (default: 100).
    pub queue_hard_limit: usize,

    /// Evict the oldest result on overflow instead of blocking the producer.
    pub can_drop: bool,
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_queue_limits(self.queue_hard_limit, self.queue_soft_limit)?;
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        Ok(())
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        DropBehavior::from(self.can_drop)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve `worker_count`, mapping 0 to the available parallelism.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn from_json(json: &str) -> Result<Self, AcquisitionError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            AcquisitionError::ConfigurationFailed(format!("failed to parse worker config: {}", e))
        })?;
        config.validate().map_err(AcquisitionError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AcquisitionError> {
        let json = fs::read_to_string(path).map_err(|e| {
            AcquisitionError::ConfigurationFailed(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            poll_interval_ms: 5,
            keep_out_of_sequence: false,
            queue_soft_limit: 90,
            queue_hard_limit: 100,
            can_drop: false,
        }
    }
}

/// What the worker does with a new result when its output queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DropBehavior {
    /// Block the producing thread until the caller drains the queue.
    #[default]
    Block,
    /// Evict the oldest queued result.
    DropOldest,
}

impl DropBehavior {
    pub fn can_drop(self) -> bool {
        matches!(self, Self::DropOldest)
    }
}

impl From<bool> for DropBehavior {
    fn from(can_drop: bool) -> Self {
        if can_drop {
            Self::DropOldest
        } else {
            Self::Block
        }
    }
}

/// Check the `0 <= soft <= hard` relationship of the worker queue limits.
pub fn validate_queue_limits(hard: usize, soft: usize) -> Result<(), String> {
    if hard == 0 {
        return Err("hard limit must be at least 1".into());
    }
    if soft > hard {
        return Err(format!(
            "soft limit {} exceeds hard limit {}",
            soft, hard
        ));
    }
    Ok(())
}

/// Configuration for an acquisition context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Capacity of the internal frame queue fed by continuous capture (default: 10).
    pub queue_size: usize,

    /// Sleep of the continuous capture loop while the link is offline or the
    /// source has nothing to emit (default: 10 ms).
    pub idle_interval: Duration,
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_size == 0 {
            return Err("queue size must be at least 1".into());
        }
        if self.idle_interval.is_zero() {
            return Err("idle interval must be positive".into());
        }
        Ok(())
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            queue_size: 10,
            idle_interval: Duration::from_millis(10),
        }
    }
}

/// Settings for the file export sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory where exported frames are written.
    pub export_dir: PathBuf,

    /// Replace existing files instead of failing the export.
    pub allow_overwrite: bool,

    /// Write a JSON metadata sidecar next to each payload.
    pub write_sidecar: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("."),
            allow_overwrite: false,
            write_sidecar: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.drop_behavior(), DropBehavior::Block);
    }

    #[test]
    fn soft_limit_above_hard_is_rejected() {
        let config = WorkerConfig {
            queue_soft_limit: 11,
            queue_hard_limit: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(validate_queue_limits(10, 10).is_ok());
        assert!(validate_queue_limits(10, 0).is_ok());
        assert!(validate_queue_limits(0, 0).is_err());
    }

    #[test]
    fn worker_count_zero_uses_parallelism() {
        let config = WorkerConfig::default();
        assert!(config.effective_worker_count() >= 1);

        let fixed = WorkerConfig {
            worker_count: 3,
            ..Default::default()
        };
        assert_eq!(fixed.effective_worker_count(), 3);
    }

    #[test]
    fn worker_config_from_partial_json() {
        let config = WorkerConfig::from_json(
            r#"{ "queue_hard_limit": 5, "queue_soft_limit": 3, "can_drop": true }"#,
        )
        .unwrap();

        assert_eq!(config.queue_hard_limit, 5);
        assert_eq!(config.queue_soft_limit, 3);
        assert!(config.can_drop);
        assert_eq!(config.poll_interval_ms, 5);
    }

    #[test]
    fn worker_config_from_invalid_json() {
        let err = WorkerConfig::from_json(r#"{ "queue_hard_limit": 2, "queue_soft_limit": 3 }"#)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::ConfigurationFailed(_)));

        let err = WorkerConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, AcquisitionError::ConfigurationFailed(_)));
    }

    #[test]
    fn acquisition_config_validation() {
        assert!(AcquisitionConfig::default().validate().is_ok());
        let bad = AcquisitionConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
