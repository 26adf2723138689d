//! Per-plugin authorization state.
//!
//! A [`PermissionChecker`] is built when a plugin loads, populated from the
//! [`PermissionSet`] its manifest declares, and consulted by every adapter
//! before a privileged operation. Rules, in order of precedence:
//! - Capabilities: a grant covers itself and everything nested under it,
//!   minus any denied subtree
//! - Blocked paths and hosts: always deny, before anything else is looked at
//! - Allowed paths and hosts: when non-empty, the target must match one
//! - Workspace: bounds file access only when no allowed paths are set
//!
//! The checker is shared across threads behind an `Arc`; all state sits
//! behind one `RwLock`. It never logs denials, callers decide what a
//! denial means.

use crate::error::{
    CapabilityError, REASON_HOST_BLOCKED, REASON_HOST_NOT_ALLOWED, REASON_NOT_GRANTED,
    REASON_PATH_BLOCKED, REASON_PATH_NOT_ALLOWED, REASON_PATH_OUTSIDE_WORKSPACE,
};
use crate::host::{extract_host, host_matches, normalize_host_pattern};
use crate::path::{is_within, normalize_path};
use inkstone_capability::{get_capability_info, implies_capability, Capability};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Declarative permissions, as a plugin manifest lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PermissionSet {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
    #[serde(default)]
    pub blocked_paths: Vec<PathBuf>,
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
    /// Subtrees carved out of broader grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_capabilities: Vec<Capability>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, cap: Capability) -> Self {
        self.capabilities.push(cap);
        self
    }

    pub fn with_allowed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.allowed_paths.push(path.into());
        self
    }

    pub fn with_blocked_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blocked_paths.push(path.into());
        self
    }

    pub fn with_allowed_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.push(host.into());
        self
    }

    pub fn with_blocked_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.push(host.into());
        self
    }

    pub fn with_denied_capability(mut self, cap: Capability) -> Self {
        self.denied_capabilities.push(cap);
        self
    }

    /// Requested capabilities flagged for explicit user approval.
    ///
    /// Nothing in the checker enforces approval; the manifest review flow
    /// uses this list to decide what to prompt for.
    pub fn capabilities_requiring_approval(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|cap| get_capability_info(cap).is_some_and(|info| info.requires_user_approval))
            .cloned()
            .collect()
    }

    /// Requested capabilities the registry does not know.
    pub fn unknown_capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|cap| get_capability_info(cap).is_none())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct CheckerState {
    granted: HashSet<Capability>,
    denied: HashSet<Capability>,
    allowed_paths: Vec<PathBuf>,
    blocked_paths: Vec<PathBuf>,
    workspace_path: Option<PathBuf>,
    allowed_hosts: Vec<String>,
    blocked_hosts: Vec<String>,
}

impl CheckerState {
    fn has_capability(&self, cap: &Capability) -> bool {
        if self.denied.iter().any(|d| implies_capability(d, cap)) {
            return false;
        }
        self.granted.contains(cap) || self.granted.iter().any(|g| implies_capability(g, cap))
    }

    fn push_path(list: &mut Vec<PathBuf>, path: &Path) {
        let normalized = normalize_path(path);
        if !list.contains(&normalized) {
            list.push(normalized);
        }
    }

    fn push_host(list: &mut Vec<String>, host: &str) {
        let normalized = normalize_host_pattern(host);
        if !list.contains(&normalized) {
            list.push(normalized);
        }
    }
}

/// Authorization state for one loaded plugin.
#[derive(Debug)]
pub struct PermissionChecker {
    plugin_id: String,
    state: RwLock<CheckerState>,
}

impl PermissionChecker {
    /// Creates a checker with nothing granted.
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            state: RwLock::new(CheckerState::default()),
        }
    }

    /// Creates a checker pre-populated from a permission set.
    pub fn with_permissions(plugin_id: impl Into<String>, set: &PermissionSet) -> Self {
        let checker = Self::new(plugin_id);
        checker.apply_permission_set(set);
        checker
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn read(&self) -> RwLockReadGuard<'_, CheckerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CheckerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ================================================================
    // Capabilities
    // ================================================================

    pub fn grant(&self, cap: Capability) {
        debug!(plugin_id = %self.plugin_id, capability = %cap, "Capability granted");
        self.write().granted.insert(cap);
    }

    pub fn revoke(&self, cap: &Capability) {
        if self.write().granted.remove(cap) {
            debug!(plugin_id = %self.plugin_id, capability = %cap, "Capability revoked");
        }
    }

    pub fn grant_all(&self, caps: impl IntoIterator<Item = Capability>) {
        let mut state = self.write();
        for cap in caps {
            debug!(plugin_id = %self.plugin_id, capability = %cap, "Capability granted");
            state.granted.insert(cap);
        }
    }

    /// Removes `cap` and everything under it from whatever is granted.
    pub fn deny(&self, cap: Capability) {
        debug!(plugin_id = %self.plugin_id, capability = %cap, "Capability denied");
        self.write().denied.insert(cap);
    }

    /// True if `cap` is granted directly or through a coarser grant and no
    /// denial covers it.
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.read().has_capability(cap)
    }

    /// Fails with a "not granted" error if `cap` is not held.
    pub fn check_capability(&self, cap: &Capability) -> Result<(), CapabilityError> {
        self.require(cap, "")
    }

    fn require(&self, cap: &Capability, operation: &str) -> Result<(), CapabilityError> {
        if self.has_capability(cap) {
            Ok(())
        } else {
            Err(CapabilityError::new(cap.clone(), operation, REASON_NOT_GRANTED))
        }
    }

    /// Directly granted capabilities, sorted.
    pub fn granted_capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.read().granted.iter().cloned().collect();
        caps.sort();
        caps
    }

    // ================================================================
    // Filesystem
    // ================================================================

    pub fn allow_path(&self, path: impl AsRef<Path>) {
        CheckerState::push_path(&mut self.write().allowed_paths, path.as_ref());
    }

    pub fn block_path(&self, path: impl AsRef<Path>) {
        CheckerState::push_path(&mut self.write().blocked_paths, path.as_ref());
    }

    /// Sets the root that bounds file access when no allowed paths are set.
    pub fn set_workspace_path(&self, path: impl AsRef<Path>) {
        self.write().workspace_path = Some(normalize_path(path));
    }

    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.read().workspace_path.clone()
    }

    pub fn check_file_read(&self, path: impl AsRef<Path>) -> Result<(), CapabilityError> {
        self.check_path(&Capability::FILESYSTEM_READ, "read", path.as_ref())
    }

    pub fn check_file_write(&self, path: impl AsRef<Path>) -> Result<(), CapabilityError> {
        self.check_path(&Capability::FILESYSTEM_WRITE, "write", path.as_ref())
    }

    fn check_path(&self, cap: &Capability, verb: &str, path: &Path) -> Result<(), CapabilityError> {
        let target = normalize_path(path);
        let operation = format!("{verb} {}", target.display());
        let state = self.read();

        if !state.has_capability(cap) {
            return Err(CapabilityError::new(cap.clone(), operation, REASON_NOT_GRANTED));
        }

        if state.blocked_paths.iter().any(|base| is_within(base, &target)) {
            return Err(CapabilityError::new(cap.clone(), operation, REASON_PATH_BLOCKED));
        }

        if !state.allowed_paths.is_empty() {
            if state.allowed_paths.iter().any(|base| is_within(base, &target)) {
                return Ok(());
            }
            return Err(CapabilityError::new(cap.clone(), operation, REASON_PATH_NOT_ALLOWED));
        }

        match &state.workspace_path {
            Some(workspace) if !is_within(workspace, &target) => Err(CapabilityError::new(
                cap.clone(),
                operation,
                REASON_PATH_OUTSIDE_WORKSPACE,
            )),
            _ => Ok(()),
        }
    }

    // ================================================================
    // Network
    // ================================================================

    /// Allows a host or a `*.suffix` wildcard.
    pub fn allow_host(&self, host: &str) {
        CheckerState::push_host(&mut self.write().allowed_hosts, host);
    }

    /// Blocks a host or a `*.suffix` wildcard.
    pub fn block_host(&self, host: &str) {
        CheckerState::push_host(&mut self.write().blocked_hosts, host);
    }

    /// Checks an outbound connection to `hostport` (`host`, `host:port`,
    /// `[v6]:port`, `[v6]` or a bare IPv6 address).
    pub fn check_network(&self, hostport: &str) -> Result<(), CapabilityError> {
        let host = extract_host(hostport).to_lowercase();
        let operation = format!("connect {hostport}");
        let state = self.read();

        if !state.has_capability(&Capability::NETWORK) {
            return Err(CapabilityError::new(Capability::NETWORK, operation, REASON_NOT_GRANTED));
        }

        if state.blocked_hosts.iter().any(|p| host_matches(p, &host)) {
            return Err(CapabilityError::new(Capability::NETWORK, operation, REASON_HOST_BLOCKED));
        }

        if !state.allowed_hosts.is_empty()
            && !state.allowed_hosts.iter().any(|p| host_matches(p, &host))
        {
            return Err(CapabilityError::new(
                Capability::NETWORK,
                operation,
                REASON_HOST_NOT_ALLOWED,
            ));
        }

        Ok(())
    }

    // ================================================================
    // Pure capability gates
    // ================================================================

    pub fn check_shell(&self, cmd: &str) -> Result<(), CapabilityError> {
        self.require(&Capability::SHELL, &format!("shell command {cmd:?}"))
    }

    pub fn check_process(&self, exe: &str) -> Result<(), CapabilityError> {
        self.require(&Capability::PROCESS, &format!("spawn {exe}"))
    }

    pub fn check_clipboard(&self, op: &str) -> Result<(), CapabilityError> {
        self.require(&Capability::CLIPBOARD, &format!("clipboard {op}"))
    }

    // ================================================================
    // Bulk state
    // ================================================================

    /// Adds everything in `set` to the current state. Never removes.
    pub fn apply_permission_set(&self, set: &PermissionSet) {
        let mut state = self.write();
        for cap in &set.capabilities {
            state.granted.insert(cap.clone());
        }
        for cap in &set.denied_capabilities {
            state.denied.insert(cap.clone());
        }
        for path in &set.allowed_paths {
            CheckerState::push_path(&mut state.allowed_paths, path);
        }
        for path in &set.blocked_paths {
            CheckerState::push_path(&mut state.blocked_paths, path);
        }
        for host in &set.allowed_hosts {
            CheckerState::push_host(&mut state.allowed_hosts, host);
        }
        for host in &set.blocked_hosts {
            CheckerState::push_host(&mut state.blocked_hosts, host);
        }
        debug!(
            plugin_id = %self.plugin_id,
            capabilities = set.capabilities.len(),
            "Permission set applied"
        );
    }

    /// Exports the current state as a permission set.
    pub fn snapshot(&self) -> PermissionSet {
        let state = self.read();
        let mut capabilities: Vec<Capability> = state.granted.iter().cloned().collect();
        capabilities.sort();
        let mut denied_capabilities: Vec<Capability> = state.denied.iter().cloned().collect();
        denied_capabilities.sort();
        PermissionSet {
            capabilities,
            allowed_paths: state.allowed_paths.clone(),
            blocked_paths: state.blocked_paths.clone(),
            allowed_hosts: state.allowed_hosts.clone(),
            blocked_hosts: state.blocked_hosts.clone(),
            denied_capabilities,
        }
    }

    /// Clears every grant and denial, the path and host lists, and the workspace root.
    pub fn reset(&self) {
        *self.write() = CheckerState::default();
        debug!(plugin_id = %self.plugin_id, "Permissions reset");
    }
}
