//! Central plugin lifecycle manager.
//!
//! Owns every loaded plugin's sandbox (checker and monitor) and home
//! worker, applies the host sandbox policy at load time, and routes calls,
//! events and configuration changes to plugins through their workers.

use crate::config_watch::ConfigWatcher;
use crate::error::{PluginHostError, ScriptError};
use crate::events::{DispatchReport, EventBus};
use crate::ids::{CallbackId, SubscriptionId};
use crate::modules::{ModuleRegistry, ModuleSpec};
use crate::runtime::{PluginContext, ScriptRuntime};
use crate::worker::{Interrupt, PluginWorker, WorkerHandle, DEFAULT_SHUTDOWN_GRACE};
use inkstone_capability::Capability;
use inkstone_sandbox::{PermissionChecker, PermissionSet, ResourceMonitor, SandboxPolicy};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct LoadedPlugin<R: ScriptRuntime + 'static> {
    checker: Arc<PermissionChecker>,
    monitor: Arc<ResourceMonitor>,
    worker: PluginWorker<R>,
    handle: WorkerHandle<R>,
    /// Manifest request before policy filtering; reused on reload.
    requested: PermissionSet,
}

/// Manages the lifecycle of all loaded plugins.
pub struct PluginHost<R: ScriptRuntime + 'static> {
    plugins: HashMap<String, LoadedPlugin<R>>,
    policy: SandboxPolicy,
    modules: ModuleRegistry,
    events: EventBus<R>,
    config: ConfigWatcher<R>,
    workspace: Option<PathBuf>,
    shutdown_grace: Duration,
}

impl<R: ScriptRuntime + 'static> PluginHost<R> {
    /// Creates a host using the policy in `~/.inkstone/sandbox.toml`.
    pub fn new() -> Self {
        Self::with_policy(SandboxPolicy::load())
    }

    pub fn with_policy(policy: SandboxPolicy) -> Self {
        Self {
            plugins: HashMap::new(),
            policy,
            modules: ModuleRegistry::standard(),
            events: EventBus::new(),
            config: ConfigWatcher::new(),
            workspace: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Replaces the module registry. Affects plugins loaded afterwards.
    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_config(mut self, config: ConfigWatcher<R>) -> Self {
        self.config = config;
        self
    }

    /// How long unloading waits for a busy plugin before detaching its worker.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    pub fn events(&self) -> &EventBus<R> {
        &self.events
    }

    pub fn config(&self) -> &ConfigWatcher<R> {
        &self.config
    }

    /// Confines file access of every plugin, loaded or not, to `path`.
    pub fn set_workspace_path(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        for plugin in self.plugins.values() {
            plugin.checker.set_workspace_path(&path);
        }
        self.workspace = Some(path);
    }

    // ================================================================
    // Loading / Unloading
    // ================================================================

    /// Loads a plugin and starts its home worker.
    ///
    /// `requested` is the manifest's permission request; the policy may
    /// narrow it. `factory` builds the runtime on the worker thread.
    pub fn load_plugin<F>(
        &mut self,
        plugin_id: impl Into<String>,
        requested: PermissionSet,
        factory: F,
    ) -> Result<(), PluginHostError>
    where
        F: FnOnce(PluginContext) -> Result<R, ScriptError> + Send + 'static,
    {
        let plugin_id = plugin_id.into();

        if !self.policy.is_plugin_allowed(&plugin_id) {
            return Err(PluginHostError::PolicyDenied(format!(
                "plugin '{}' blocked by policy",
                plugin_id
            )));
        }

        if self.plugins.contains_key(&plugin_id) {
            return Err(PluginHostError::PluginAlreadyLoaded(plugin_id));
        }

        let unknown = requested.unknown_capabilities();
        if !unknown.is_empty() {
            warn!(plugin_id = %plugin_id, ?unknown, "Plugin requested unregistered capabilities");
        }

        let granted = self.policy.filter_permission_set(&requested);
        let approval = granted.capabilities_requiring_approval();
        if !approval.is_empty() {
            debug!(plugin_id = %plugin_id, ?approval, "Plugin holds high-risk capabilities");
        }

        let checker = Arc::new(PermissionChecker::with_permissions(&plugin_id, &granted));
        if let Some(workspace) = &self.workspace {
            checker.set_workspace_path(workspace);
        }
        let preset = self.policy.preset_for(&plugin_id);
        let monitor = Arc::new(ResourceMonitor::new(
            &plugin_id,
            self.policy.limits_for(&plugin_id),
        ));

        let interrupt = Arc::new(Interrupt::default());
        let context = PluginContext {
            plugin_id: plugin_id.clone(),
            checker: Arc::clone(&checker),
            monitor: Arc::clone(&monitor),
            interrupt: Arc::clone(&interrupt),
            modules: self
                .modules
                .exposed_for(&checker)
                .into_iter()
                .cloned()
                .collect(),
        };
        let (worker, handle) = PluginWorker::spawn_with_interrupt(
            plugin_id.clone(),
            self.policy.queue_capacity(),
            interrupt,
            move || factory(context),
        )?;

        info!(
            plugin_id = %plugin_id,
            ?preset,
            capabilities = granted.capabilities.len(),
            "Plugin loaded"
        );
        self.plugins.insert(
            plugin_id,
            LoadedPlugin {
                checker,
                monitor,
                worker,
                handle,
                requested,
            },
        );
        Ok(())
    }

    /// Unloads a plugin.
    ///
    /// Subscriptions and watches go first so nothing new is enqueued, then
    /// the worker stops and its queue is discarded, then the sandbox state
    /// is wiped.
    pub fn unload_plugin(&mut self, plugin_id: &str) -> Result<(), PluginHostError> {
        let plugin = self
            .plugins
            .remove(plugin_id)
            .ok_or_else(|| PluginHostError::PluginNotFound(plugin_id.to_string()))?;
        self.teardown(plugin_id, plugin);
        Ok(())
    }

    /// Unloads and loads a plugin again with its original permission request,
    /// re-filtered by the current policy.
    pub fn reload_plugin<F>(&mut self, plugin_id: &str, factory: F) -> Result<(), PluginHostError>
    where
        F: FnOnce(PluginContext) -> Result<R, ScriptError> + Send + 'static,
    {
        let plugin = self
            .plugins
            .remove(plugin_id)
            .ok_or_else(|| PluginHostError::PluginNotFound(plugin_id.to_string()))?;
        let requested = plugin.requested.clone();
        self.teardown(plugin_id, plugin);
        info!(plugin_id = %plugin_id, "Reloading plugin");
        self.load_plugin(plugin_id, requested, factory)
    }

    /// Unloads every plugin.
    pub fn unload_all(&mut self) {
        let ids: Vec<String> = self.plugins.keys().cloned().collect();
        for id in ids {
            if let Some(plugin) = self.plugins.remove(&id) {
                self.teardown(&id, plugin);
            }
        }
    }

    fn teardown(&self, plugin_id: &str, plugin: LoadedPlugin<R>) {
        let subscriptions = self.events.unsubscribe_plugin(plugin_id);
        let watches = self.config.unwatch_plugin(plugin_id);
        let discarded = plugin.worker.shutdown_within(self.shutdown_grace);
        plugin.checker.reset();
        plugin.monitor.reset();
        info!(
            plugin_id = %plugin_id,
            subscriptions,
            watches,
            discarded,
            "Plugin unloaded"
        );
    }

    // ================================================================
    // Plugin access
    // ================================================================

    fn get(&self, plugin_id: &str) -> Result<&LoadedPlugin<R>, PluginHostError> {
        self.plugins
            .get(plugin_id)
            .ok_or_else(|| PluginHostError::PluginNotFound(plugin_id.to_string()))
    }

    pub fn checker(&self, plugin_id: &str) -> Result<Arc<PermissionChecker>, PluginHostError> {
        Ok(Arc::clone(&self.get(plugin_id)?.checker))
    }

    pub fn monitor(&self, plugin_id: &str) -> Result<Arc<ResourceMonitor>, PluginHostError> {
        Ok(Arc::clone(&self.get(plugin_id)?.monitor))
    }

    pub fn worker_handle(&self, plugin_id: &str) -> Result<WorkerHandle<R>, PluginHostError> {
        Ok(self.get(plugin_id)?.handle.clone())
    }

    /// Modules the plugin may import under its current grants.
    pub fn exposed_modules(&self, plugin_id: &str) -> Result<Vec<ModuleSpec>, PluginHostError> {
        let plugin = self.get(plugin_id)?;
        Ok(self
            .modules
            .exposed_for(&plugin.checker)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Loaded plugin ids, sorted.
    pub fn list_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_loaded(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Clears a plugin's counters and its exceeded latch.
    pub fn reset_monitor(&self, plugin_id: &str) -> Result<(), PluginHostError> {
        self.get(plugin_id)?.monitor.reset();
        Ok(())
    }

    // ================================================================
    // Execution
    // ================================================================

    /// Runs a plugin callback on its home worker and waits for the result.
    ///
    /// Refused once the plugin's monitor has latched, both up front and
    /// again when the call reaches the worker. The instruction count is
    /// reset on the worker as the call starts, so queued calls never clear
    /// the budget of the one running. On timeout the call is cancelled: it
    /// is skipped if still queued, and a running callback sees
    /// [`Interrupt::is_interrupted`].
    pub async fn call(
        &self,
        plugin_id: &str,
        callback: impl Into<CallbackId>,
        args: Value,
    ) -> Result<Value, PluginHostError> {
        let (handle, monitor) = {
            let plugin = self.get(plugin_id)?;
            (plugin.handle.clone(), Arc::clone(&plugin.monitor))
        };

        if let Some(reason) = monitor.exceeded_reason() {
            return Err(PluginHostError::ResourceLimitExceeded {
                plugin_id: plugin_id.to_string(),
                detail: reason.to_string(),
            });
        }

        let job_monitor = Arc::clone(&monitor);
        let (receiver, cancel) = handle.invoke_with(callback.into(), args, move || {
            if let Some(reason) = job_monitor.exceeded_reason() {
                return Err(ScriptError::ResourceLimit(reason));
            }
            job_monitor.reset_instruction_count();
            Ok(())
        })?;
        let outcome = match monitor.limits().execution_timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    cancel.cancel();
                    warn!(plugin_id = %plugin_id, "Plugin call timed out, interrupting");
                    return Err(PluginHostError::Timeout {
                        plugin_id: plugin_id.to_string(),
                        timeout_ms: monitor.limits().execution_timeout_ms,
                    });
                }
            },
            None => receiver.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PluginHostError::from_script(plugin_id, e)),
            Err(_) => Err(PluginHostError::Cancelled {
                plugin_id: plugin_id.to_string(),
            }),
        }
    }

    // ================================================================
    // Events
    // ================================================================

    /// Registers a plugin handler for `event`. Requires `events`.
    pub fn subscribe(
        &self,
        plugin_id: &str,
        event: &str,
        callback: impl Into<CallbackId>,
    ) -> Result<SubscriptionId, PluginHostError> {
        let plugin = self.get(plugin_id)?;
        plugin.checker.check_capability(&Capability::EVENTS)?;
        Ok(self
            .events
            .subscribe(plugin_id, event, callback.into(), plugin.handle.clone()))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn publish(&self, event: &str, payload: &Value) -> DispatchReport {
        self.events.publish(event, payload)
    }

    // ================================================================
    // Configuration
    // ================================================================

    /// Registers a plugin handler for changes to `key`. Requires `config.read`.
    pub fn watch_config(
        &self,
        plugin_id: &str,
        key: &str,
        callback: impl Into<CallbackId>,
    ) -> Result<SubscriptionId, PluginHostError> {
        let plugin = self.get(plugin_id)?;
        plugin.checker.check_capability(&Capability::CONFIG_READ)?;
        Ok(self
            .config
            .watch(plugin_id, key, callback.into(), plugin.handle.clone()))
    }

    pub fn unwatch_config(&self, id: SubscriptionId) -> bool {
        self.config.unwatch(id)
    }

    /// Reads a value on a plugin's behalf. Requires `config.read`.
    pub fn get_config(&self, plugin_id: &str, key: &str) -> Result<Option<Value>, PluginHostError> {
        self.get(plugin_id)?
            .checker
            .check_capability(&Capability::CONFIG_READ)?;
        Ok(self.config.get(key))
    }

    /// Host-side write; notifies watchers.
    pub fn set_config(&self, key: &str, value: Value) -> DispatchReport {
        self.config.set(key, value)
    }

    /// Writes a value on a plugin's behalf. Requires `config.write`.
    pub fn set_plugin_config(
        &self,
        plugin_id: &str,
        key: &str,
        value: Value,
    ) -> Result<DispatchReport, PluginHostError> {
        self.get(plugin_id)?
            .checker
            .check_capability(&Capability::CONFIG_WRITE)?;
        Ok(self.config.set(key, value))
    }
}

impl<R: ScriptRuntime + 'static> Default for PluginHost<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ScriptRuntime + 'static> Drop for PluginHost<R> {
    fn drop(&mut self) {
        self.unload_all();
    }
}
