//! Per-execution resource accounting.
//!
//! The host feeds the monitor from wherever consumption happens: the VM step
//! hook adds instructions, the allocator hook reports memory, adapters count
//! output and ask the rate limiters before file or network work. Every
//! accounting call answers "is this counter over its ceiling now?".
//!
//! The first breach latches the monitor into an exceeded state with a fixed
//! reason. Later breaches keep counting but never replace the reason, and
//! only [`ResourceMonitor::reset`] clears the latch, so a host that checks
//! late still sees that the scope must stop.

use crate::limits::ResourceLimits;
use crate::rate_limit::RateLimiter;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::warn;

/// Which ceiling was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    Instructions,
    Memory,
    Tasks,
    Output,
}

impl LimitKind {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Instructions => "instruction limit exceeded",
            Self::Memory => "memory limit exceeded",
            Self::Tasks => "task limit exceeded",
            Self::Output => "output size limit exceeded",
        }
    }
}

/// Point-in-time copy of a monitor's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub instructions: u64,
    pub memory_bytes: u64,
    pub tasks: u32,
    pub output_bytes: u64,
    pub exceeded: bool,
    pub exceeded_reason: Option<&'static str>,
}

/// Accounting for one plugin execution scope.
///
/// Counters are atomics so the instruction hot path is a single add plus a
/// load of the mirrored limit. The full [`ResourceLimits`] value sits behind
/// a lock and is only taken by `limits()` and `set_limits()`.
#[derive(Debug)]
pub struct ResourceMonitor {
    plugin_id: String,
    limits: RwLock<ResourceLimits>,

    instruction_limit: AtomicU64,
    memory_limit: AtomicU64,
    max_tasks: AtomicU32,
    max_output_size: AtomicU64,

    instructions: AtomicU64,
    memory: AtomicU64,
    tasks: AtomicU32,
    output: AtomicU64,

    exceeded: AtomicBool,
    exceeded_kind: Mutex<Option<LimitKind>>,

    file_ops: RwLock<RateLimiter>,
    network_requests: RwLock<RateLimiter>,
}

impl ResourceMonitor {
    pub fn new(plugin_id: impl Into<String>, limits: ResourceLimits) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            limits: RwLock::new(limits),
            instruction_limit: AtomicU64::new(limits.instruction_limit),
            memory_limit: AtomicU64::new(limits.memory_limit),
            max_tasks: AtomicU32::new(limits.max_tasks),
            max_output_size: AtomicU64::new(limits.max_output_size),
            instructions: AtomicU64::new(0),
            memory: AtomicU64::new(0),
            tasks: AtomicU32::new(0),
            output: AtomicU64::new(0),
            exceeded: AtomicBool::new(false),
            exceeded_kind: Mutex::new(None),
            file_ops: RwLock::new(RateLimiter::new(limits.file_ops_per_second)),
            network_requests: RwLock::new(RateLimiter::new(limits.network_requests_per_second)),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn check(&self, kind: LimitKind, value: u64, limit: u64) -> bool {
        if limit > 0 && value > limit {
            self.latch(kind);
            true
        } else {
            false
        }
    }

    fn latch(&self, kind: LimitKind) {
        let mut slot = self
            .exceeded_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(kind);
            self.exceeded.store(true, Ordering::Release);
            warn!(plugin_id = %self.plugin_id, reason = kind.reason(), "Resource limit exceeded");
        }
    }

    // ================================================================
    // Accounting
    // ================================================================

    /// Adds `n` executed instructions.
    pub fn increment_instructions(&self, n: u64) -> bool {
        let total = self
            .instructions
            .fetch_add(n, Ordering::Relaxed)
            .saturating_add(n);
        self.check(
            LimitKind::Instructions,
            total,
            self.instruction_limit.load(Ordering::Relaxed),
        )
    }

    /// Replaces the current memory estimate.
    pub fn update_memory_usage(&self, bytes: u64) -> bool {
        self.memory.store(bytes, Ordering::Relaxed);
        self.check(LimitKind::Memory, bytes, self.memory_limit.load(Ordering::Relaxed))
    }

    /// Records a task spawned on the plugin's behalf.
    pub fn increment_tasks(&self) -> bool {
        let count = self.tasks.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        self.check(
            LimitKind::Tasks,
            u64::from(count),
            u64::from(self.max_tasks.load(Ordering::Relaxed)),
        )
    }

    /// Records a finished task. Never drops below zero.
    pub fn decrement_tasks(&self) {
        let _ = self
            .tasks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }

    /// Adds `n` bytes of plugin output.
    pub fn add_output(&self, n: u64) -> bool {
        let total = self.output.fetch_add(n, Ordering::Relaxed).saturating_add(n);
        self.check(
            LimitKind::Output,
            total,
            self.max_output_size.load(Ordering::Relaxed),
        )
    }

    /// False means "deny this file operation now"; it never waits.
    pub fn try_file_op(&self) -> bool {
        self.file_ops
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .allow()
    }

    /// False means "deny this network request now"; it never waits.
    pub fn try_network_request(&self) -> bool {
        self.network_requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .allow()
    }

    // ================================================================
    // Accessors
    // ================================================================

    pub fn instruction_count(&self) -> u64 {
        self.instructions.load(Ordering::Relaxed)
    }

    pub fn memory_usage(&self) -> u64 {
        self.memory.load(Ordering::Relaxed)
    }

    pub fn task_count(&self) -> u32 {
        self.tasks.load(Ordering::Acquire)
    }

    pub fn output_size(&self) -> u64 {
        self.output.load(Ordering::Relaxed)
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Acquire)
    }

    /// Reason recorded by the first breach, if any.
    pub fn exceeded_reason(&self) -> Option<&'static str> {
        self.exceeded_kind()
            .map(LimitKind::reason)
    }

    pub fn exceeded_kind(&self) -> Option<LimitKind> {
        *self
            .exceeded_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn usage(&self) -> ResourceUsage {
        let kind = self.exceeded_kind();
        ResourceUsage {
            instructions: self.instruction_count(),
            memory_bytes: self.memory_usage(),
            tasks: self.task_count(),
            output_bytes: self.output_size(),
            exceeded: kind.is_some(),
            exceeded_reason: kind.map(LimitKind::reason),
        }
    }

    // ================================================================
    // Resets and limits
    // ================================================================

    /// Zeroes the instruction counter. Does not clear the exceeded latch.
    pub fn reset_instruction_count(&self) {
        self.instructions.store(0, Ordering::Relaxed);
    }

    /// Zeroes the output counter. Does not clear the exceeded latch.
    pub fn reset_output_size(&self) {
        self.output.store(0, Ordering::Relaxed);
    }

    /// Zeroes every counter, clears the latch and refills both rate limiters.
    pub fn reset(&self) {
        let mut slot = self
            .exceeded_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.instructions.store(0, Ordering::Relaxed);
        self.memory.store(0, Ordering::Relaxed);
        self.tasks.store(0, Ordering::Release);
        self.output.store(0, Ordering::Relaxed);
        *slot = None;
        self.exceeded.store(false, Ordering::Release);
        drop(slot);

        self.file_ops
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.network_requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    pub fn limits(&self) -> ResourceLimits {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps the ceilings on a live monitor, keeping accumulated counters.
    ///
    /// A rate limiter is replaced (at full capacity) only if its rate changed.
    pub fn set_limits(&self, limits: ResourceLimits) {
        let mut current = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        self.instruction_limit
            .store(limits.instruction_limit, Ordering::Relaxed);
        self.memory_limit.store(limits.memory_limit, Ordering::Relaxed);
        self.max_tasks.store(limits.max_tasks, Ordering::Relaxed);
        self.max_output_size
            .store(limits.max_output_size, Ordering::Relaxed);

        if current.file_ops_per_second != limits.file_ops_per_second {
            *self.file_ops.write().unwrap_or_else(PoisonError::into_inner) =
                RateLimiter::new(limits.file_ops_per_second);
        }
        if current.network_requests_per_second != limits.network_requests_per_second {
            *self
                .network_requests
                .write()
                .unwrap_or_else(PoisonError::into_inner) =
                RateLimiter::new(limits.network_requests_per_second);
        }
        *current = limits;
    }
}
