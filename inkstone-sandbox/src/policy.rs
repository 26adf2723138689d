//! Host sandbox policy: reads `~/.inkstone/sandbox.toml` and decides which
//! plugins may load, which limit preset each one runs under, and which
//! capabilities are never granted regardless of what a manifest asks for.

use crate::error::SandboxError;
use crate::limits::{LimitOverrides, LimitPreset, ResourceLimits};
use crate::permissions::PermissionSet;
use inkstone_capability::{children_of, implies_capability, is_child_of, Capability};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default bound for each plugin's callback queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Plugin admission mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Only listed plugins load.
    Allowlist,
    /// Every plugin except the listed ones loads.
    Denylist,
    #[default]
    Unrestricted,
}

/// Parsed sandbox policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    /// Allowlist or denylist entries, depending on `mode`.
    pub plugin_ids: Vec<String>,
    /// Plugins that run under the relaxed preset.
    pub trusted_plugins: Vec<String>,
    /// Plugins that run under the strict preset.
    pub untrusted_plugins: Vec<String>,
    pub default_preset: LimitPreset,
    pub limit_overrides: LimitOverrides,
    pub denied_capabilities: Vec<Capability>,
    pub queue_capacity: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Unrestricted,
            plugin_ids: Vec::new(),
            trusted_plugins: Vec::new(),
            untrusted_plugins: Vec::new(),
            default_preset: LimitPreset::Default,
            limit_overrides: LimitOverrides::default(),
            denied_capabilities: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Applies the host's sandbox policy to plugins as they load.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    config: PolicyConfig,
    policy_path: Option<PathBuf>,
}

impl SandboxPolicy {
    /// Loads policy from `~/.inkstone/sandbox.toml` if it exists.
    pub fn load() -> Self {
        Self::load_from(config_dir().join("sandbox.toml"))
    }

    /// Loads policy from an explicit path.
    /// Missing files mean defaults; unreadable or malformed files log a
    /// warning and also fall back to defaults.
    pub fn load_from(policy_path: PathBuf) -> Self {
        if !policy_path.exists() {
            info!("No sandbox policy at {:?}, using defaults", policy_path);
            return Self {
                config: PolicyConfig::default(),
                policy_path: None,
            };
        }

        match read_policy(&policy_path) {
            Ok(config) => {
                info!("Loaded sandbox policy from {:?}", policy_path);
                Self {
                    config,
                    policy_path: Some(policy_path),
                }
            }
            Err(e) => {
                warn!("{}. Falling back to default sandbox policy.", e);
                Self {
                    config: PolicyConfig::default(),
                    policy_path: Some(policy_path),
                }
            }
        }
    }

    /// Parses policy text, failing on malformed input.
    pub fn parse(contents: &str) -> Result<Self, SandboxError> {
        let file: PolicyFile = toml::from_str(contents)?;
        Ok(Self::with_config(file.into_config()))
    }

    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            config,
            policy_path: None,
        }
    }

    pub fn has_policy_file(&self) -> bool {
        self.policy_path.is_some()
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity.max(1)
    }

    pub fn is_plugin_allowed(&self, plugin_id: &str) -> bool {
        let listed = self.config.plugin_ids.iter().any(|id| id == plugin_id);
        match self.config.mode {
            PolicyMode::Unrestricted => true,
            PolicyMode::Allowlist => listed,
            PolicyMode::Denylist => !listed,
        }
    }

    /// Untrusted wins over trusted when a plugin is listed in both.
    pub fn preset_for(&self, plugin_id: &str) -> LimitPreset {
        if self.config.untrusted_plugins.iter().any(|id| id == plugin_id) {
            LimitPreset::Strict
        } else if self.config.trusted_plugins.iter().any(|id| id == plugin_id) {
            LimitPreset::Relaxed
        } else {
            self.config.default_preset
        }
    }

    pub fn limits_for(&self, plugin_id: &str) -> ResourceLimits {
        self.config
            .limit_overrides
            .apply(self.preset_for(plugin_id).limits())
    }

    /// True if a denied capability covers `cap`.
    pub fn is_capability_denied(&self, cap: &Capability) -> bool {
        self.config
            .denied_capabilities
            .iter()
            .any(|denied| implies_capability(denied, cap))
    }

    /// Strips denied capabilities from a manifest's request.
    ///
    /// A request covered by a denial is dropped. A request that is an
    /// ancestor of a denial is narrowed into its registered children that
    /// remain allowed, so denying `filesystem.write` turns a `filesystem`
    /// request into `filesystem.read`. Narrowing stops at registry leaves:
    /// a leaf with a denial below it is kept, and that denial is carried in
    /// `denied_capabilities` for the checker to subtract. Path and host
    /// lists pass through.
    pub fn filter_permission_set(&self, set: &PermissionSet) -> PermissionSet {
        let mut capabilities = Vec::with_capacity(set.capabilities.len());
        for cap in &set.capabilities {
            self.narrow(cap, &mut capabilities);
        }
        let mut denied_capabilities = set.denied_capabilities.clone();
        for denied in &self.config.denied_capabilities {
            let shadowed = capabilities
                .iter()
                .any(|kept| implies_capability(kept, denied));
            if shadowed && !denied_capabilities.contains(denied) {
                denied_capabilities.push(denied.clone());
            }
        }
        PermissionSet {
            capabilities,
            denied_capabilities,
            ..set.clone()
        }
    }

    fn narrow(&self, cap: &Capability, out: &mut Vec<Capability>) {
        if self.is_capability_denied(cap) {
            debug!(capability = %cap, "Capability denied by sandbox policy");
            return;
        }
        let shadows_denial = self
            .config
            .denied_capabilities
            .iter()
            .any(|denied| is_child_of(denied, cap));
        if !shadows_denial {
            if !out.contains(cap) {
                out.push(cap.clone());
            }
            return;
        }
        let children = children_of(cap);
        if children.is_empty() {
            debug!(capability = %cap, "Denial below registry leaf, keeping capability");
            if !out.contains(cap) {
                out.push(cap.clone());
            }
            return;
        }
        for child in children {
            self.narrow(&child, out);
        }
    }
}

fn read_policy(path: &Path) -> Result<PolicyConfig, SandboxError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SandboxError::PolicyRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file: PolicyFile = toml::from_str(&contents)?;
    Ok(file.into_config())
}

/// Raw TOML structure matching the sandbox.toml format.
#[derive(Deserialize, Default)]
struct PolicyFile {
    #[serde(default)]
    policy: PolicySection,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PolicySection {
    #[serde(default)]
    mode: PolicyMode,
    #[serde(default)]
    default_preset: LimitPreset,
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default)]
    denied_capabilities: Vec<Capability>,
    #[serde(default)]
    plugins: PluginLists,
    #[serde(default)]
    limits: LimitOverrides,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
            default_preset: LimitPreset::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            denied_capabilities: Vec::new(),
            plugins: PluginLists::default(),
            limits: LimitOverrides::default(),
        }
    }
}

#[derive(Deserialize, Default)]
struct PluginLists {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    trusted: Vec<String>,
    #[serde(default)]
    untrusted: Vec<String>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl PolicyFile {
    fn into_config(self) -> PolicyConfig {
        let section = self.policy;
        PolicyConfig {
            mode: section.mode,
            plugin_ids: section.plugins.ids,
            trusted_plugins: section.plugins.trusted,
            untrusted_plugins: section.plugins.untrusted,
            default_preset: section.default_preset,
            limit_overrides: section.limits,
            denied_capabilities: section.denied_capabilities,
            queue_capacity: section.queue_capacity,
        }
    }
}

/// Resolve the Inkstone config directory.
fn config_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".inkstone"),
        None => PathBuf::from(".inkstone"),
    }
}
