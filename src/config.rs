//! Runtime configuration
//!
//! Every section has sensible defaults, so a config file only needs the keys
//! it wants to change.

use crate::core::{Result, SweepError};
use crate::quota::CostTable;
use crate::storage::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sizing of the materialized query window, in records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPolicy {
    /// Result sets up to this size are materialized whole.
    pub min_window: usize,
    /// Records kept on each side of the viewport when (re)building.
    pub buffer: usize,
    /// Distance from an edge that triggers an extension on that side.
    pub edge_threshold: usize,
    /// Records fetched per extension.
    pub chunk: usize,
    /// Window length above which the far side is truncated.
    pub max_window: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            min_window: 120,
            buffer: 40,
            edge_threshold: 20,
            chunk: 40,
            max_window: 280,
        }
    }
}

impl WindowPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.min_window == 0 {
            return Err(SweepError::InvalidConfig("window.min_window must be > 0".into()));
        }
        if self.chunk == 0 {
            return Err(SweepError::InvalidConfig("window.chunk must be > 0".into()));
        }
        if self.edge_threshold >= self.buffer {
            return Err(SweepError::InvalidConfig(
                "window.edge_threshold must be smaller than window.buffer".into(),
            ));
        }
        if self.max_window < self.min_window + 2 * self.buffer {
            return Err(SweepError::InvalidConfig(
                "window.max_window must be at least min_window + 2 * buffer".into(),
            ));
        }
        Ok(())
    }

    /// Length of a freshly built window
    pub fn initial_len(&self) -> usize {
        self.min_window + 2 * self.buffer
    }
}

/// Render window over the selection queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionWindowPolicy {
    pub size: usize,
    pub buffer: usize,
}

impl Default for SelectionWindowPolicy {
    fn default() -> Self {
        Self { size: 50, buffer: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaPolicy {
    /// Daily budget in quota units.
    pub daily_limit: u64,
    pub costs: CostTable,
    /// The daily reset happens at local midnight of this UTC offset.
    pub reset_utc_offset_minutes: i32,
    /// Batch size granted by the in-process authority, in items.
    pub local_batch_items: usize,
    /// Parallelism granted by the in-process authority.
    pub local_max_parallelism: usize,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_limit: 10_000,
            costs: CostTable::default(),
            // Pacific standard time
            reset_utc_offset_minutes: -8 * 60,
            local_batch_items: 10,
            local_max_parallelism: 5,
        }
    }
}

impl QuotaPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.costs.delete_comment == 0 {
            return Err(SweepError::InvalidConfig("quota.costs.delete_comment must be > 0".into()));
        }
        if self.reset_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(SweepError::InvalidConfig(
                "quota.reset_utc_offset_minutes must be within one day".into(),
            ));
        }
        if self.local_batch_items == 0 || self.local_max_parallelism == 0 {
            return Err(SweepError::InvalidConfig(
                "quota.local_batch_items and quota.local_max_parallelism must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionPolicy {
    /// Allow concurrent requests when the authority grants parallelism > 1.
    pub allow_parallel: bool,
    /// Pause between sequential deletes, in milliseconds.
    pub item_delay_ms: u64,
    /// Count a remote "not found" as a successful deletion.
    pub treat_not_found_as_success: bool,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            allow_parallel: true,
            item_delay_ms: 0,
            treat_not_found_as_success: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePolicy {
    pub durability: DurabilityMode,
    /// Journal entries written before a snapshot is taken.
    pub checkpoint_threshold: usize,
    /// Ordered id lists cached per query specification.
    pub order_cache_capacity: usize,
    /// Compiled wildcard search patterns kept around.
    pub pattern_cache_capacity: usize,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            durability: DurabilityMode::default(),
            checkpoint_threshold: 1000,
            order_cache_capacity: 16,
            pattern_cache_capacity: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub window: WindowPolicy,
    pub selection: SelectionWindowPolicy,
    pub quota: QuotaPolicy,
    pub deletion: DeletionPolicy,
    pub storage: StoragePolicy,
}

impl SweepConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SweepError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.quota.validate()?;
        if self.selection.size == 0 {
            return Err(SweepError::InvalidConfig("selection.size must be > 0".into()));
        }
        if self.storage.order_cache_capacity == 0 {
            return Err(SweepError::InvalidConfig(
                "storage.order_cache_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}
