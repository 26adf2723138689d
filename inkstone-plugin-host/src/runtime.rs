//! The seam between the host and a plugin's script interpreter.

use crate::error::ScriptError;
use crate::ids::CallbackId;
use crate::modules::ModuleSpec;
use crate::worker::Interrupt;
use inkstone_sandbox::{PermissionChecker, ResourceMonitor};
use serde_json::Value;
use std::sync::Arc;

/// A plugin's script interpreter.
///
/// Implementations are not required to be `Send` or `Sync`. The host builds
/// each runtime on the plugin's home worker thread and never touches it from
/// anywhere else; every call arrives through that worker's queue.
pub trait ScriptRuntime {
    /// Runs a callback the script registered earlier.
    fn invoke(&mut self, callback: &CallbackId, args: &Value) -> Result<Value, ScriptError>;

    /// Called on the home worker right before the runtime is dropped.
    fn dispose(&mut self) {}
}

/// What a runtime receives at construction: the plugin's sandbox and the
/// host modules it is allowed to import.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub plugin_id: String,
    pub checker: Arc<PermissionChecker>,
    pub monitor: Arc<ResourceMonitor>,
    /// Raised when the running call times out or the plugin is unloading.
    /// Long callbacks poll it and return early.
    pub interrupt: Arc<Interrupt>,
    pub modules: Vec<ModuleSpec>,
}

impl PluginContext {
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }
}
