//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML files. The `[causal]` section controls
//! the determinant log itself; the `[inflight]` section carries the
//! recognized options of the in-flight record logger, a collaborator this
//! crate configures but does not implement. `[buffer]` sizes the task-scoped
//! segment pool and `[telemetry]` selects the log level.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// In-flight record logger options (collaborator).
    #[serde(default)]
    pub inflight: InflightConfig,

    /// Determinant sharing options.
    #[serde(default)]
    pub causal: CausalConfig,

    /// Buffer pool sizing.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Variant of the in-flight record logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflightLogType {
    /// Fully in-memory log.
    InMemory,
    /// Log spilled to disk asynchronously.
    Spillable,
}

impl Default for InflightLogType {
    fn default() -> Self {
        Self::Spillable
    }
}

/// Trigger policy for spilling the in-flight log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpillPolicy {
    /// Spill on write.
    Eager,
    /// Spill when buffer availability drops below the configured trigger.
    Availability,
    /// Spill on every epoch completion.
    Epoch,
}

impl Default for SpillPolicy {
    fn default() -> Self {
        Self::Eager
    }
}

impl SpillPolicy {
    /// Whether the policy spills synchronously with the write path.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Eager)
    }
}

/// In-flight record logger options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InflightConfig {
    /// Logger variant.
    #[serde(default, rename = "type")]
    pub log_type: InflightLogType,

    /// Spill options.
    #[serde(default)]
    pub spill: SpillConfig,
}

/// Spill options for the in-flight record logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillConfig {
    /// Spill trigger policy.
    #[serde(default)]
    pub policy: SpillPolicy,

    /// Availability level at and under which a spill is triggered
    /// (for the `availability` policy).
    #[serde(default = "default_availability_trigger")]
    pub availability_trigger: f32,

    /// Buffers each subpartition reserves for reading spilled data back.
    #[serde(default = "default_num_recovery_buffers")]
    pub num_recovery_buffers: u32,

    /// Interval between policy evaluations in milliseconds.
    #[serde(default = "default_spill_sleep_ms")]
    pub sleep_ms: u64,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            policy: SpillPolicy::default(),
            availability_trigger: default_availability_trigger(),
            num_recovery_buffers: default_num_recovery_buffers(),
            sleep_ms: default_spill_sleep_ms(),
        }
    }
}

/// Determinant sharing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalConfig {
    /// How many hops upstream determinants are propagated along the
    /// dataflow graph. `0` shares the local vertex only; `-1` is unbounded.
    #[serde(default = "default_sharing_depth")]
    pub sharing_depth: i32,
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            sharing_depth: default_sharing_depth(),
        }
    }
}

impl CausalConfig {
    /// Whether the sharing depth is unbounded.
    pub fn is_unbounded(&self) -> bool {
        self.sharing_depth == -1
    }
}

/// Buffer pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Size of one pool segment in bytes.
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,

    /// Maximum number of segments the task-scoped pool hands out.
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            segment_size: default_segment_size(),
            max_segments: default_max_segments(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_availability_trigger() -> f32 {
    0.3
}

fn default_num_recovery_buffers() -> u32 {
    50
}

fn default_spill_sleep_ms() -> u64 {
    50
}

fn default_sharing_depth() -> i32 {
    1
}

fn default_segment_size() -> usize {
    32 * 1024
}

fn default_max_segments() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_inflight()?;
        self.validate_causal()?;
        self.validate_buffer()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_inflight(&self) -> Result<()> {
        let spill = &self.inflight.spill;

        if !(0.0..=1.0).contains(&spill.availability_trigger) {
            anyhow::bail!(
                "inflight.spill.availability_trigger must be in [0, 1], got: {}",
                spill.availability_trigger
            );
        }

        if spill.num_recovery_buffers == 0 {
            anyhow::bail!("inflight.spill.num_recovery_buffers must be >= 1");
        }

        Ok(())
    }

    fn validate_causal(&self) -> Result<()> {
        if self.causal.sharing_depth < -1 {
            anyhow::bail!(
                "causal.sharing_depth must be >= -1, got: {}",
                self.causal.sharing_depth
            );
        }
        Ok(())
    }

    fn validate_buffer(&self) -> Result<()> {
        if self.buffer.segment_size == 0 {
            anyhow::bail!("buffer.segment_size must be > 0");
        }
        if self.buffer.max_segments == 0 {
            anyhow::bail!("buffer.max_segments must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}
