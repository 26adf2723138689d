//! Language-level sandbox for untrusted Inkstone plugins.
//!
//! Two halves, both safe to share across threads:
//! - [`PermissionChecker`]: what a plugin may do. Capability grants plus
//!   path and host allow/block lists, checked before every privileged call.
//! - [`ResourceMonitor`]: how much a plugin may consume. Instruction, memory,
//!   task and output ceilings with a latching exceeded state, and token-bucket
//!   limits on file and network operations.
//!
//! [`SandboxPolicy`] is the host-side configuration that decides which
//! plugins load, which limits they get and which capabilities are withheld.
//!
//! This is not an OS sandbox; it trusts the host process boundary.

mod error;
mod host;
mod limits;
mod monitor;
mod path;
mod permissions;
mod policy;
mod rate_limit;

pub use error::{
    CapabilityError, SandboxError, REASON_HOST_BLOCKED, REASON_HOST_NOT_ALLOWED,
    REASON_NOT_GRANTED, REASON_PATH_BLOCKED, REASON_PATH_NOT_ALLOWED,
    REASON_PATH_OUTSIDE_WORKSPACE,
};
pub use host::{extract_host, host_matches};
pub use limits::{LimitOverrides, LimitPreset, ResourceLimits};
pub use monitor::{LimitKind, ResourceMonitor, ResourceUsage};
pub use path::{is_within, normalize_path};
pub use permissions::{PermissionChecker, PermissionSet};
pub use policy::{PolicyConfig, PolicyMode, SandboxPolicy, DEFAULT_QUEUE_CAPACITY};
pub use rate_limit::RateLimiter;
