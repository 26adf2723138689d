//! Loading `sandbox.toml` from disk.

use inkstone_capability::Capability;
use inkstone_sandbox::{
    LimitPreset, PermissionSet, PolicyConfig, PolicyMode, ResourceLimits, SandboxPolicy,
    DEFAULT_QUEUE_CAPACITY,
};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

const POLICY: &str = r#"
[policy]
mode = "allowlist"
default-preset = "strict"
queue-capacity = 32
denied-capabilities = ["shell", "filesystem.write"]

[policy.plugins]
ids = ["inkstone.git", "inkstone.lsp"]
trusted = ["inkstone.git"]

[policy.limits]
instruction-limit = 5000
max-tasks = 1
"#;

#[test]
fn missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let policy = SandboxPolicy::load_from(dir.path().join("sandbox.toml"));
    assert!(!policy.has_policy_file());
    assert_eq!(policy.config(), &PolicyConfig::default());
}

#[test]
fn valid_file_is_applied() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sandbox.toml");
    fs::write(&path, POLICY).unwrap();

    let policy = SandboxPolicy::load_from(path);
    assert!(policy.has_policy_file());
    assert_eq!(policy.config().mode, PolicyMode::Allowlist);
    assert_eq!(policy.queue_capacity(), 32);

    assert!(policy.is_plugin_allowed("inkstone.lsp"));
    assert!(!policy.is_plugin_allowed("someone.else"));

    assert_eq!(policy.preset_for("inkstone.git"), LimitPreset::Relaxed);
    assert_eq!(policy.preset_for("inkstone.lsp"), LimitPreset::Strict);

    let limits = policy.limits_for("inkstone.lsp");
    assert_eq!(limits.instruction_limit, 5_000);
    assert_eq!(limits.max_tasks, 1);
    assert_eq!(limits.memory_limit, ResourceLimits::strict().memory_limit);

    let requested = PermissionSet::new()
        .with_capability(Capability::FILESYSTEM)
        .with_capability(Capability::SHELL)
        .with_capability(Capability::EDITOR);
    let filtered = policy.filter_permission_set(&requested);
    assert_eq!(
        filtered.capabilities,
        vec![Capability::FILESYSTEM_READ, Capability::EDITOR]
    );
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sandbox.toml");
    fs::write(&path, "[policy\nmode = ").unwrap();

    let policy = SandboxPolicy::load_from(path);
    assert!(policy.has_policy_file());
    assert_eq!(policy.config(), &PolicyConfig::default());
}

#[test]
fn unreadable_path_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    // a directory exists but cannot be read as a file
    let policy = SandboxPolicy::load_from(dir.path().to_path_buf());
    assert_eq!(policy.config(), &PolicyConfig::default());
    assert_eq!(policy.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
}

#[test]
fn parse_reports_errors() {
    assert!(SandboxPolicy::parse("policy = 3").is_err());
    let policy = SandboxPolicy::parse("").unwrap();
    assert_eq!(policy.config(), &PolicyConfig::default());
}
