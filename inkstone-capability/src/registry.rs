//! Static capability metadata.
//!
//! Risk levels:
//! - Low: read-only or purely cosmetic access to editor state
//! - Medium: mutations contained within the editor process
//! - High: data leaves the editor (disk writes, network, debugger attach)
//! - Critical: arbitrary code runs outside the interpreter (shell, processes)
//!
//! High and Critical capabilities carry `requires_user_approval`. The flag is
//! descriptive; the manifest review flow decides what to do with it.

use crate::capability::Capability;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// How much damage a capability can do in the wrong hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Descriptive metadata for a registered capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityInfo {
    pub name: Capability,
    pub display_name: &'static str,
    pub description: &'static str,
    pub parent: Option<Capability>,
    pub risk: RiskLevel,
    pub requires_user_approval: bool,
}

const fn info(
    name: Capability,
    display_name: &'static str,
    description: &'static str,
    parent: Option<Capability>,
    risk: RiskLevel,
) -> CapabilityInfo {
    CapabilityInfo {
        name,
        display_name,
        description,
        parent,
        risk,
        requires_user_approval: matches!(risk, RiskLevel::High | RiskLevel::Critical),
    }
}

static DEFINITIONS: &[CapabilityInfo] = &[
    // Editor state
    info(
        Capability::EDITOR,
        "Editor",
        "Full access to buffers, cursors and selections",
        None,
        RiskLevel::Medium,
    ),
    info(
        Capability::EDITOR_BUFFER,
        "Buffers",
        "Read and edit open buffers",
        Some(Capability::EDITOR),
        RiskLevel::Low,
    ),
    info(
        Capability::EDITOR_CURSOR,
        "Cursors",
        "Read and move cursors",
        Some(Capability::EDITOR),
        RiskLevel::Low,
    ),
    info(
        Capability::EDITOR_SELECTION,
        "Selections",
        "Read and change selections",
        Some(Capability::EDITOR),
        RiskLevel::Low,
    ),
    info(
        Capability::COMMANDS,
        "Commands",
        "Register and run editor commands",
        None,
        RiskLevel::Low,
    ),
    info(
        Capability::EVENTS,
        "Events",
        "Subscribe to editor events",
        None,
        RiskLevel::Low,
    ),
    // Configuration
    info(
        Capability::CONFIG,
        "Configuration",
        "Read and write editor settings",
        None,
        RiskLevel::Medium,
    ),
    info(
        Capability::CONFIG_READ,
        "Read configuration",
        "Read editor settings and watch for changes",
        Some(Capability::CONFIG),
        RiskLevel::Low,
    ),
    info(
        Capability::CONFIG_WRITE,
        "Write configuration",
        "Change editor settings",
        Some(Capability::CONFIG),
        RiskLevel::Medium,
    ),
    // UI
    info(
        Capability::UI,
        "User interface",
        "Show notifications and panels",
        None,
        RiskLevel::Low,
    ),
    info(
        Capability::UI_NOTIFICATION,
        "Notifications",
        "Show transient notifications",
        Some(Capability::UI),
        RiskLevel::Low,
    ),
    info(
        Capability::UI_PANEL,
        "Panels",
        "Open and render custom panels",
        Some(Capability::UI),
        RiskLevel::Low,
    ),
    // Tooling
    info(
        Capability::LSP,
        "Language servers",
        "Query and drive language server sessions",
        None,
        RiskLevel::Medium,
    ),
    info(
        Capability::INTEGRATION,
        "Integrations",
        "Use version control and debugger integrations",
        None,
        RiskLevel::Medium,
    ),
    info(
        Capability::INTEGRATION_GIT,
        "Git",
        "Query repository status and history",
        Some(Capability::INTEGRATION),
        RiskLevel::Medium,
    ),
    info(
        Capability::INTEGRATION_DEBUGGER,
        "Debugger",
        "Attach to and control debug sessions",
        Some(Capability::INTEGRATION),
        RiskLevel::High,
    ),
    // Outside the editor
    info(
        Capability::FILESYSTEM,
        "Filesystem",
        "Read and write files on disk",
        None,
        RiskLevel::High,
    ),
    info(
        Capability::FILESYSTEM_READ,
        "Read files",
        "Read files on disk",
        Some(Capability::FILESYSTEM),
        RiskLevel::Medium,
    ),
    info(
        Capability::FILESYSTEM_WRITE,
        "Write files",
        "Create, modify and delete files on disk",
        Some(Capability::FILESYSTEM),
        RiskLevel::High,
    ),
    info(
        Capability::NETWORK,
        "Network",
        "Open outbound network connections",
        None,
        RiskLevel::High,
    ),
    info(
        Capability::CLIPBOARD,
        "Clipboard",
        "Read and write the system clipboard",
        None,
        RiskLevel::Medium,
    ),
    info(
        Capability::SHELL,
        "Shell",
        "Run shell commands",
        None,
        RiskLevel::Critical,
    ),
    info(
        Capability::PROCESS,
        "Processes",
        "Spawn external programs",
        None,
        RiskLevel::Critical,
    ),
];

static REGISTRY: LazyLock<HashMap<&'static str, &'static CapabilityInfo>> =
    LazyLock::new(|| DEFINITIONS.iter().map(|i| (i.name.as_str(), i)).collect());

/// Every registered capability's metadata, in definition order.
pub fn registered() -> &'static [CapabilityInfo] {
    DEFINITIONS
}

/// Looks up metadata for a capability.
pub fn get_capability_info(cap: &Capability) -> Option<&'static CapabilityInfo> {
    REGISTRY.get(cap.as_str()).copied()
}

/// True if the capability is in the registry.
pub fn is_valid_capability(cap: &Capability) -> bool {
    REGISTRY.contains_key(cap.as_str())
}

/// Every registered capability.
pub fn all_capabilities() -> HashSet<Capability> {
    DEFINITIONS.iter().map(|i| i.name.clone()).collect()
}

/// Capabilities that should be confirmed by the user before being granted.
pub fn high_risk_capabilities() -> HashSet<Capability> {
    DEFINITIONS
        .iter()
        .filter(|i| i.requires_user_approval)
        .map(|i| i.name.clone())
        .collect()
}

/// Registered capabilities whose declared parent is `cap`.
pub fn children_of(cap: &Capability) -> Vec<Capability> {
    DEFINITIONS
        .iter()
        .filter(|i| i.parent.as_ref() == Some(cap))
        .map(|i| i.name.clone())
        .collect()
}
