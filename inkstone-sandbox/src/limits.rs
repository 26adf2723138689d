//! Resource ceilings for plugin execution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Named limit configurations, selected per plugin trust tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPreset {
    /// Unknown or untrusted plugins.
    Strict,
    #[default]
    Default,
    /// Plugins the user or administrator has marked as trusted.
    Relaxed,
}

impl LimitPreset {
    pub fn limits(self) -> ResourceLimits {
        match self {
            Self::Strict => ResourceLimits::strict(),
            Self::Default => ResourceLimits::standard(),
            Self::Relaxed => ResourceLimits::relaxed(),
        }
    }
}

/// Ceilings for one plugin execution scope. Zero disables a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_limit: u64,
    /// Wall-clock budget per invocation in milliseconds.
    pub execution_timeout_ms: u64,
    /// VM instruction ceiling.
    pub instruction_limit: u64,
    pub file_ops_per_second: u32,
    pub network_requests_per_second: u32,
    /// Concurrent tasks the plugin may have in flight.
    pub max_tasks: u32,
    /// Cumulative bytes the plugin may write to its output.
    pub max_output_size: u64,
}

impl ResourceLimits {
    pub fn strict() -> Self {
        Self {
            memory_limit: 32 * MIB,
            execution_timeout_ms: 5_000,
            instruction_limit: 1_000_000,
            file_ops_per_second: 10,
            network_requests_per_second: 5,
            max_tasks: 4,
            max_output_size: MIB,
        }
    }

    pub fn standard() -> Self {
        Self {
            memory_limit: 64 * MIB,
            execution_timeout_ms: 30_000,
            instruction_limit: 10_000_000,
            file_ops_per_second: 100,
            network_requests_per_second: 20,
            max_tasks: 16,
            max_output_size: 10 * MIB,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            memory_limit: 256 * MIB,
            execution_timeout_ms: 120_000,
            instruction_limit: 100_000_000,
            file_ops_per_second: 1_000,
            network_requests_per_second: 100,
            max_tasks: 64,
            max_output_size: 100 * MIB,
        }
    }

    /// No ceilings at all. Intended for tests and first-party tooling.
    pub fn unlimited() -> Self {
        Self {
            memory_limit: 0,
            execution_timeout_ms: 0,
            instruction_limit: 0,
            file_ops_per_second: 0,
            network_requests_per_second: 0,
            max_tasks: 0,
            max_output_size: 0,
        }
    }

    /// The invocation timeout, or `None` when unconstrained.
    pub fn execution_timeout(&self) -> Option<Duration> {
        (self.execution_timeout_ms > 0).then(|| Duration::from_millis(self.execution_timeout_ms))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::standard()
    }
}

/// Partial limits, layered over a preset by the sandbox policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LimitOverrides {
    pub memory_limit: Option<u64>,
    pub execution_timeout_ms: Option<u64>,
    pub instruction_limit: Option<u64>,
    pub file_ops_per_second: Option<u32>,
    pub network_requests_per_second: Option<u32>,
    pub max_tasks: Option<u32>,
    pub max_output_size: Option<u64>,
}

impl LimitOverrides {
    pub fn apply(&self, mut limits: ResourceLimits) -> ResourceLimits {
        if let Some(v) = self.memory_limit {
            limits.memory_limit = v;
        }
        if let Some(v) = self.execution_timeout_ms {
            limits.execution_timeout_ms = v;
        }
        if let Some(v) = self.instruction_limit {
            limits.instruction_limit = v;
        }
        if let Some(v) = self.file_ops_per_second {
            limits.file_ops_per_second = v;
        }
        if let Some(v) = self.network_requests_per_second {
            limits.network_requests_per_second = v;
        }
        if let Some(v) = self.max_tasks {
            limits.max_tasks = v;
        }
        if let Some(v) = self.max_output_size {
            limits.max_output_size = v;
        }
        limits
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
