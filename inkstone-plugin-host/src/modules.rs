//! Capability-gated host modules.
//!
//! A module is a host API surface a script can import (`buffer`, `ui`, ...).
//! Each one names the capability it needs; a plugin only sees modules its
//! checker grants.

use inkstone_capability::Capability;
use inkstone_sandbox::PermissionChecker;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSpec {
    pub name: String,
    pub capability: Capability,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleSpec>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The editor's built-in modules.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (name, capability) in [
            ("buffer", Capability::EDITOR_BUFFER),
            ("cursor", Capability::EDITOR_CURSOR),
            ("command", Capability::COMMANDS),
            ("event", Capability::EVENTS),
            ("config", Capability::CONFIG_READ),
            ("ui", Capability::UI),
            ("lsp", Capability::LSP),
            ("integration", Capability::INTEGRATION),
        ] {
            registry.register(name, capability);
        }
        registry
    }

    /// Adds a module, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, capability: Capability) {
        let spec = ModuleSpec::new(name, capability);
        match self.modules.iter_mut().find(|m| m.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.modules.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn modules(&self) -> &[ModuleSpec] {
        &self.modules
    }

    /// Modules the plugin behind `checker` may import, in registration order.
    pub fn exposed_for(&self, checker: &PermissionChecker) -> Vec<&ModuleSpec> {
        self.modules
            .iter()
            .filter(|m| {
                let granted = checker.has_capability(&m.capability);
                if !granted {
                    debug!(
                        plugin_id = %checker.plugin_id(),
                        module = %m.name,
                        capability = %m.capability,
                        "Module not exposed"
                    );
                }
                granted
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(specs: Vec<&ModuleSpec>) -> Vec<&str> {
        specs.into_iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn standard_registry_layout() {
        let registry = ModuleRegistry::standard();
        assert_eq!(registry.modules().len(), 8);
        assert_eq!(registry.get("config").unwrap().capability, Capability::CONFIG_READ);
        assert_eq!(registry.get("command").unwrap().capability, Capability::COMMANDS);
        assert!(registry.get("shell").is_none());
    }

    #[test]
    fn nothing_exposed_without_grants() {
        let checker = PermissionChecker::new("bare");
        assert!(ModuleRegistry::standard().exposed_for(&checker).is_empty());
    }

    #[test]
    fn parent_grant_exposes_child_modules() {
        let checker = PermissionChecker::new("editor");
        checker.grant(Capability::EDITOR);
        checker.grant(Capability::CONFIG);
        assert_eq!(
            names(ModuleRegistry::standard().exposed_for(&checker)),
            vec!["buffer", "cursor", "config"]
        );
    }

    #[test]
    fn child_grant_does_not_expose_parent_module() {
        let checker = PermissionChecker::new("git");
        checker.grant(Capability::INTEGRATION_GIT);
        assert!(ModuleRegistry::standard().exposed_for(&checker).is_empty());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = ModuleRegistry::standard();
        registry.register("ui", Capability::UI_PANEL);
        registry.register("clipboard", Capability::CLIPBOARD);
        assert_eq!(registry.modules().len(), 9);
        assert_eq!(registry.get("ui").unwrap().capability, Capability::UI_PANEL);
    }
}
