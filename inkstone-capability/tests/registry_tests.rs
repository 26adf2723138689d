use inkstone_capability::*;
use pretty_assertions::assert_eq;
use std::collections::HashSet;

// ── Lookup ────────────────────────────────────────────────────────

#[test]
fn info_for_filesystem_write() {
    let info = get_capability_info(&Capability::FILESYSTEM_WRITE).unwrap();
    assert_eq!(info.name, Capability::FILESYSTEM_WRITE);
    assert_eq!(info.parent, Some(Capability::FILESYSTEM));
    assert_eq!(info.risk, RiskLevel::High);
    assert!(info.requires_user_approval);
}

#[test]
fn info_for_owned_identifier() {
    let cap: Capability = "editor.buffer".parse().unwrap();
    let info = get_capability_info(&cap).unwrap();
    assert_eq!(info.display_name, "Buffers");
    assert!(!info.requires_user_approval);
}

#[test]
fn unknown_capability_is_invalid() {
    assert!(!is_valid_capability(&Capability::new("editor.telepathy")));
    assert!(!is_valid_capability(&Capability::new("")));
}

// ── Sets ──────────────────────────────────────────────────────────

#[test]
fn high_risk_set_is_exact() {
    let expected: HashSet<Capability> = [
        Capability::INTEGRATION_DEBUGGER,
        Capability::FILESYSTEM,
        Capability::FILESYSTEM_WRITE,
        Capability::NETWORK,
        Capability::SHELL,
        Capability::PROCESS,
    ]
    .into_iter()
    .collect();
    assert_eq!(high_risk_capabilities(), expected);
}

#[test]
fn high_risk_is_subset_of_all() {
    let all = all_capabilities();
    assert!(high_risk_capabilities().is_subset(&all));
    assert_eq!(all.len(), 23);
}

#[test]
fn children_of_filesystem() {
    let mut children = children_of(&Capability::FILESYSTEM);
    children.sort();
    assert_eq!(
        children,
        vec![Capability::FILESYSTEM_READ, Capability::FILESYSTEM_WRITE]
    );
}

#[test]
fn leaf_has_no_children() {
    assert!(children_of(&Capability::SHELL).is_empty());
}

// ── Serialization ─────────────────────────────────────────────────

#[test]
fn capability_serializes_as_plain_string() {
    let json = serde_json::to_string(&Capability::CONFIG_READ).unwrap();
    assert_eq!(json, "\"config.read\"");
    let parsed: Capability = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, Capability::CONFIG_READ);
}

#[test]
fn info_serializes_risk_lowercase() {
    let info = get_capability_info(&Capability::SHELL).unwrap();
    let value = serde_json::to_value(info).unwrap();
    assert_eq!(value["risk"], "critical");
    assert_eq!(value["parent"], serde_json::Value::Null);
}
