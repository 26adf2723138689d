//! The capability identifier type and hierarchy resolution.
//!
//! Capabilities are flat strings with `.`-separated namespaces. There is no
//! type hierarchy: `editor.buffer` is nested under `editor` purely because
//! its text starts with `editor.`.

use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt;
use std::str::FromStr;

/// A hierarchical permission identifier, e.g. `filesystem.read`.
///
/// Registered capabilities are available as associated constants. Unknown
/// identifiers can still be constructed (manifests may name capabilities
/// from a newer host); use [`crate::is_valid_capability`] to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub const EDITOR: Self = Self::from_static("editor");
    pub const EDITOR_BUFFER: Self = Self::from_static("editor.buffer");
    pub const EDITOR_CURSOR: Self = Self::from_static("editor.cursor");
    pub const EDITOR_SELECTION: Self = Self::from_static("editor.selection");
    pub const COMMANDS: Self = Self::from_static("commands");
    pub const EVENTS: Self = Self::from_static("events");
    pub const CONFIG: Self = Self::from_static("config");
    pub const CONFIG_READ: Self = Self::from_static("config.read");
    pub const CONFIG_WRITE: Self = Self::from_static("config.write");
    pub const UI: Self = Self::from_static("ui");
    pub const UI_NOTIFICATION: Self = Self::from_static("ui.notification");
    pub const UI_PANEL: Self = Self::from_static("ui.panel");
    pub const LSP: Self = Self::from_static("lsp");
    pub const INTEGRATION: Self = Self::from_static("integration");
    pub const INTEGRATION_GIT: Self = Self::from_static("integration.git");
    pub const INTEGRATION_DEBUGGER: Self = Self::from_static("integration.debugger");
    pub const FILESYSTEM: Self = Self::from_static("filesystem");
    pub const FILESYSTEM_READ: Self = Self::from_static("filesystem.read");
    pub const FILESYSTEM_WRITE: Self = Self::from_static("filesystem.write");
    pub const NETWORK: Self = Self::from_static("network");
    pub const CLIPBOARD: Self = Self::from_static("clipboard");
    pub const SHELL: Self = Self::from_static("shell");
    pub const PROCESS: Self = Self::from_static("process");

    /// Creates a capability from a string known at compile time.
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Creates a capability from an owned or runtime string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lexical parent (`editor` for `editor.buffer`), if any.
    #[must_use]
    pub fn parent(&self) -> Option<Capability> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| Capability::new(parent))
    }

    /// True if `self` is nested anywhere under `parent`.
    #[must_use]
    pub fn is_child_of(&self, parent: &Capability) -> bool {
        is_child_of(self, parent)
    }

    /// True if holding `self` satisfies a requirement for `required`.
    #[must_use]
    pub fn implies(&self, required: &Capability) -> bool {
        implies_capability(self, required)
    }
}

/// `child` is nested under `parent` iff it begins with `parent + "."`.
///
/// Compares without allocating; `editorial` is not a child of `editor`.
pub fn is_child_of(child: &Capability, parent: &Capability) -> bool {
    child
        .as_str()
        .strip_prefix(parent.as_str())
        .is_some_and(|rest| rest.starts_with('.'))
}

/// A granted capability implies a required one if they are equal or the
/// required capability is nested under the granted one.
pub fn implies_capability(granted: &Capability, required: &Capability) -> bool {
    granted == required || is_child_of(required, granted)
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
