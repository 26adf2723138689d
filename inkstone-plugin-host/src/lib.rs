//! Plugin host for the Inkstone editor.
//!
//! Script interpreters are not safe for concurrent use, while the rest of
//! the editor is. Each loaded plugin therefore gets a home worker: one OS
//! thread that owns its interpreter and drains a bounded queue of jobs.
//! Host calls, event deliveries and configuration change notifications are
//! all enqueued there and never run inline on the thread that produced them.
//!
//! The plugin's [`PermissionChecker`](inkstone_sandbox::PermissionChecker)
//! and [`ResourceMonitor`](inkstone_sandbox::ResourceMonitor) are shared
//! freely; they are handed to the runtime through [`PluginContext`] and
//! consulted by the host from any thread.

mod config_watch;
mod error;
mod events;
mod ids;
mod manager;
mod modules;
mod runtime;
mod worker;

pub use config_watch::ConfigWatcher;
pub use error::{DispatchError, PluginHostError, ScriptError};
pub use events::{DispatchReport, EventBus};
pub use ids::{CallbackId, SubscriptionId};
pub use manager::PluginHost;
pub use modules::{ModuleRegistry, ModuleSpec};
pub use runtime::{PluginContext, ScriptRuntime};
pub use worker::{CancelToken, Interrupt, Job, PluginWorker, WorkerHandle, DEFAULT_SHUTDOWN_GRACE};
