//! Error types for the sandbox.

use inkstone_capability::Capability;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Denial reason: the capability was never granted.
pub const REASON_NOT_GRANTED: &str = "not granted";
/// Denial reason: the path falls under a blocked prefix.
pub const REASON_PATH_BLOCKED: &str = "path is blocked";
/// Denial reason: an allow-list is set and the path is outside it.
pub const REASON_PATH_NOT_ALLOWED: &str = "path not in allowed list";
/// Denial reason: no allow-list, and the path escapes the workspace.
pub const REASON_PATH_OUTSIDE_WORKSPACE: &str = "path outside workspace";
/// Denial reason: the host matches a blocked pattern.
pub const REASON_HOST_BLOCKED: &str = "host is blocked";
/// Denial reason: an allow-list is set and the host matches none of it.
pub const REASON_HOST_NOT_ALLOWED: &str = "host not in allowed list";

/// An authorization denial.
///
/// `message` is one of the `REASON_*` constants, so callers can match on it
/// without parsing the rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    pub capability: Capability,
    pub operation: String,
    pub message: String,
}

impl CapabilityError {
    pub fn new(
        capability: Capability,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True if the denial was for a missing grant rather than a path/host rule.
    pub fn is_not_granted(&self) -> bool {
        self.message == REASON_NOT_GRANTED
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation.is_empty() {
            write!(f, "capability \"{}\": {}", self.capability, self.message)
        } else {
            write!(
                f,
                "capability \"{}\" required for {}: {}",
                self.capability, self.operation, self.message
            )
        }
    }
}

impl std::error::Error for CapabilityError {}

/// Errors raised while loading sandbox configuration.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to read policy file {path:?}: {source}")]
    PolicyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy: {0}")]
    PolicyParse(#[from] toml::de::Error),
}
