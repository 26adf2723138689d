//! Error types for the plugin host.

use crate::ids::CallbackId;
use inkstone_sandbox::CapabilityError;
use thiserror::Error;

/// Failure to hand a job to a plugin's home worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("callback queue full for plugin '{plugin_id}'")]
    QueueFull { plugin_id: String },

    #[error("worker for plugin '{plugin_id}' has stopped")]
    WorkerStopped { plugin_id: String },
}

impl DispatchError {
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::QueueFull { plugin_id } | Self::WorkerStopped { plugin_id } => plugin_id,
        }
    }
}

/// Errors raised by a script runtime while running a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("unknown callback: {0}")]
    UnknownCallback(CallbackId),

    #[error("script error: {0}")]
    Runtime(String),

    #[error("script panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Denied(#[from] CapabilityError),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(&'static str),
}

#[derive(Debug, Error)]
pub enum PluginHostError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin already loaded: {0}")]
    PluginAlreadyLoaded(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("permission denied: {0}")]
    PermissionDenied(#[from] CapabilityError),

    #[error("resource limit exceeded: {plugin_id}: {detail}")]
    ResourceLimitExceeded { plugin_id: String, detail: String },

    #[error("timeout: plugin '{plugin_id}' exceeded {timeout_ms}ms deadline")]
    Timeout { plugin_id: String, timeout_ms: u64 },

    #[error("plugin initialization failed: {plugin_id}: {message}")]
    InitializationFailed { plugin_id: String, message: String },

    #[error("call to plugin '{plugin_id}' was dropped before it ran")]
    Cancelled { plugin_id: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("plugin '{plugin_id}' failed: {source}")]
    Script {
        plugin_id: String,
        #[source]
        source: ScriptError,
    },
}

impl PluginHostError {
    /// Maps a runtime failure onto the host taxonomy.
    pub(crate) fn from_script(plugin_id: &str, error: ScriptError) -> Self {
        match error {
            ScriptError::Denied(denial) => Self::PermissionDenied(denial),
            ScriptError::ResourceLimit(reason) => Self::ResourceLimitExceeded {
                plugin_id: plugin_id.to_string(),
                detail: reason.to_string(),
            },
            source => Self::Script {
                plugin_id: plugin_id.to_string(),
                source,
            },
        }
    }
}
