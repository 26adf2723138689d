//! Property tests for path and host containment.

use inkstone_sandbox::{host_matches, is_within, normalize_path};
use proptest::prelude::*;
use std::path::PathBuf;

fn segment() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,10}").unwrap()
}

fn abs_path() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec(segment(), 1..5).prop_map(|parts| {
        let mut path = PathBuf::from("/");
        path.extend(parts);
        path
    })
}

proptest! {
    /// Anything built by joining segments under a base is within it.
    #[test]
    fn nested_paths_are_within(base in abs_path(), rest in prop::collection::vec(segment(), 0..4)) {
        let mut target = base.clone();
        target.extend(rest);
        prop_assert!(is_within(&normalize_path(&base), &normalize_path(&target)));
    }

    /// Extending the last segment's name produces a sibling outside the base.
    #[test]
    fn sibling_with_shared_prefix_is_outside(base in abs_path(), tail in "[a-z0-9]{1,6}") {
        let sibling = PathBuf::from(format!("{}{}", base.display(), tail));
        prop_assert!(!is_within(&normalize_path(&base), &normalize_path(&sibling)));
    }

    /// Climbing out with `..` is undone by normalization.
    #[test]
    fn dot_dot_escape_is_outside(base in abs_path(), other in segment()) {
        let escape = base.join("..").join(format!("{other}~"));
        prop_assert!(!is_within(&normalize_path(&base), &normalize_path(&escape)));
    }

    /// Normalization is idempotent.
    #[test]
    fn normalize_is_idempotent(path in abs_path(), noise in prop::collection::vec(prop_oneof![Just("."), Just("..")], 0..3)) {
        let mut noisy = path.clone();
        noisy.extend(noise);
        let once = normalize_path(&noisy);
        prop_assert_eq!(normalize_path(&once), once.clone());
    }

    /// A wildcard matches every proper subdomain and never the apex.
    #[test]
    fn wildcard_subdomains(label in "[a-z0-9]{1,10}", domain in "[a-z]{1,10}\\.[a-z]{2,4}") {
        let pattern = format!("*.{domain}");
        let sub = format!("{label}.{domain}");
        prop_assert!(host_matches(&pattern, &sub));
        prop_assert!(!host_matches(&pattern, &domain));
    }
}
