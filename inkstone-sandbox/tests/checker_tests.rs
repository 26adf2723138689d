//! Authorization scenarios for `PermissionChecker`.

use inkstone_capability::Capability;
use inkstone_sandbox::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn checker(caps: &[Capability]) -> PermissionChecker {
    let checker = PermissionChecker::new("scenario.plugin");
    checker.grant_all(caps.iter().cloned());
    checker
}

// ================================================================
// Capability hierarchy
// ================================================================

#[test]
fn granting_parent_grants_every_registered_child() {
    for info in inkstone_capability::registered() {
        if let Some(parent) = &info.parent {
            let checker = checker(&[parent.clone()]);
            assert!(checker.has_capability(&info.name), "{} via {}", info.name, parent);
        }
    }
}

#[test]
fn grant_revoke_round_trip() {
    let checker = checker(&[]);
    checker.grant(Capability::UI_PANEL);
    assert!(checker.has_capability(&Capability::UI_PANEL));
    checker.revoke(&Capability::UI_PANEL);
    assert!(!checker.has_capability(&Capability::UI_PANEL));
}

// ================================================================
// Paths
// ================================================================

#[test]
fn blocked_path_beats_allowed_parent() {
    let checker = checker(&[Capability::FILESYSTEM_READ]);
    checker.allow_path("/tmp");
    checker.block_path("/tmp/secret");

    let err = checker.check_file_read("/tmp/secret/data.txt").unwrap_err();
    assert_eq!(err.message, REASON_PATH_BLOCKED);
    assert!(checker.check_file_read("/tmp/public.txt").is_ok());
}

#[test]
fn sibling_prefix_is_not_blocked() {
    let checker = checker(&[Capability::FILESYSTEM_READ]);
    checker.block_path("/tmp/blocked");

    assert!(checker.check_file_read("/tmp/blockedfiles/x").is_ok());
    let err = checker.check_file_read("/tmp/blocked/x").unwrap_err();
    assert_eq!(err.message, REASON_PATH_BLOCKED);
}

#[test]
fn blocked_directory_itself_is_blocked() {
    let checker = checker(&[Capability::FILESYSTEM_WRITE]);
    checker.block_path("/etc");
    assert_eq!(
        checker.check_file_write("/etc").unwrap_err().message,
        REASON_PATH_BLOCKED
    );
    assert_eq!(
        checker.check_file_write("/etc/../etc/passwd").unwrap_err().message,
        REASON_PATH_BLOCKED
    );
}

#[test]
fn editor_only_plugin_never_reads_files() {
    let checker = checker(&[Capability::EDITOR]);
    checker.allow_path("/tmp");
    checker.set_workspace_path("/tmp");

    for path in ["/tmp/a.txt", "/etc/passwd", "relative.txt"] {
        let err = checker.check_file_read(path).unwrap_err();
        assert_eq!(err.message, REASON_NOT_GRANTED);
        assert_eq!(err.capability, Capability::FILESYSTEM_READ);
    }
}

#[test]
fn error_rendering_includes_operation() {
    let checker = checker(&[Capability::FILESYSTEM_READ]);
    checker.allow_path("/srv");
    let err = checker.check_file_read("/home/me/.ssh/id_rsa").unwrap_err();
    assert_eq!(
        err.to_string(),
        "capability \"filesystem.read\" required for read /home/me/.ssh/id_rsa: path not in allowed list"
    );
}

// ================================================================
// Hosts
// ================================================================

#[test]
fn wildcard_host_allow_list() {
    let checker = checker(&[Capability::NETWORK]);
    checker.allow_host("*.example.com");

    assert!(checker.check_network("api.example.com").is_ok());
    assert!(checker.check_network("deep.api.example.com").is_ok());
    assert_eq!(
        checker.check_network("example.com").unwrap_err().message,
        REASON_HOST_NOT_ALLOWED
    );
    assert_eq!(
        checker.check_network("other.com").unwrap_err().message,
        REASON_HOST_NOT_ALLOWED
    );
}

#[test]
fn wildcard_block_spares_apex() {
    let checker = checker(&[Capability::NETWORK]);
    checker.block_host("*.ads.net");
    assert!(checker.check_network("ads.net:443").is_ok());
    assert_eq!(
        checker.check_network("track.ads.net:443").unwrap_err().message,
        REASON_HOST_BLOCKED
    );
}

#[test]
fn host_extraction_cases() {
    assert_eq!(extract_host("[::1]:8080"), "::1");
    assert_eq!(extract_host("[2001:db8::1]:443"), "2001:db8::1");
    assert_eq!(extract_host("example.com:443"), "example.com");
}

// ================================================================
// Bulk state
// ================================================================

#[test]
fn apply_permission_set_then_reset() {
    let checker = PermissionChecker::with_permissions(
        "bulk",
        &PermissionSet::new()
            .with_capability(Capability::FILESYSTEM)
            .with_capability(Capability::NETWORK)
            .with_allowed_path("/work")
            .with_blocked_path("/work/.env")
            .with_allowed_host("*.github.com")
            .with_blocked_host("gist.github.com"),
    );

    assert!(checker.check_file_write("/work/src/a.rs").is_ok());
    assert!(checker.check_file_read("/work/.env").is_err());
    assert!(checker.check_network("api.github.com:443").is_ok());
    assert!(checker.check_network("gist.github.com:443").is_err());

    checker.reset();
    assert_eq!(checker.snapshot(), PermissionSet::default());
    assert!(checker.check_file_read("/work/src/a.rs").unwrap_err().is_not_granted());
    assert!(checker.check_network("api.github.com").unwrap_err().is_not_granted());
}

#[test]
fn checker_is_shareable_across_threads() {
    let checker = Arc::new(checker(&[Capability::FILESYSTEM_READ]));
    checker.allow_path("/data");

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let checker = Arc::clone(&checker);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    assert!(checker.check_file_read(format!("/data/{i}.bin")).is_ok());
                }
            })
        })
        .collect();

    let writer = {
        let checker = Arc::clone(&checker);
        std::thread::spawn(move || {
            for _ in 0..200 {
                checker.grant(Capability::CLIPBOARD);
                checker.revoke(&Capability::CLIPBOARD);
            }
        })
    };

    for handle in readers {
        handle.join().unwrap();
    }
    writer.join().unwrap();
    assert!(!checker.has_capability(&Capability::CLIPBOARD));
}
