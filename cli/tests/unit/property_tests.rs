//! Property-based tests for parsing and naming rules.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use shipyard_cli::domain::release::{shell_quote, stale_releases};
use shipyard_cli::domain::target::{discover, normalize_name};
use shipyard_cli::domain::version::clean_native_output;

// ============================================================================
// Target names and discovery
// ============================================================================

proptest! {
    /// Normalisation is idempotent and produces lowercase, dash-separated names.
    #[test]
    fn prop_normalize_name_is_idempotent(raw in "[A-Za-z0-9_-]{1,24}") {
        let once = normalize_name(&raw).unwrap();
        prop_assert!(!once.contains('_'), "underscore left in {once}");
        prop_assert_eq!(once.to_ascii_lowercase(), once.clone());
        prop_assert_eq!(normalize_name(&once).unwrap(), once);
    }

    /// Names with characters outside the allowed set are rejected.
    #[test]
    fn prop_normalize_name_rejects_other_characters(
        prefix in "[a-z]{0,5}",
        bad in "[ ./:@$]",
        suffix in "[a-z]{0,5}",
    ) {
        let raw = format!("{prefix}{bad}{suffix}");
        prop_assert!(normalize_name(&raw).is_err(), "accepted {raw}");
    }

    /// Every assigned host field registers exactly one host under the
    /// normalised name.
    #[test]
    fn prop_discover_registers_host_per_name(
        name in "[A-Z][A-Z0-9]{0,8}",
        field in prop::sample::select(vec!["IP", "USER", "SSH_KEY", "PASSPHRASE"]),
        value in "[a-z0-9.]{1,16}",
    ) {
        let key = format!("SHIPYARD_HOST_{name}_{field}");
        let set = discover([(key.as_str(), value.as_str())]);
        prop_assert_eq!(set.hosts.len(), 1);
        prop_assert!(set.registries.is_empty());
        prop_assert!(set.hosts.contains_key(&name.to_ascii_lowercase()));
    }

    /// Keys without a known prefix never create targets.
    #[test]
    fn prop_discover_ignores_unrelated_keys(key in "[A-Z_]{1,30}", value in "[a-z]{1,8}") {
        prop_assume!(!key.starts_with("SHIPYARD_"));
        let set = discover([(key.as_str(), value.as_str())]);
        prop_assert!(set.hosts.is_empty() && set.registries.is_empty());
    }
}

// ============================================================================
// Native version output
// ============================================================================

proptest! {
    /// A version printed after arbitrary banner noise is recovered.
    #[test]
    fn prop_clean_native_output_finds_trailing_version(
        major in 0u32..100,
        minor in 0u32..100,
        patch in 0u32..100,
        banners in prop::collection::vec("\\[cargo-make\\] INFO - [a-z ]{0,20}", 0..4),
    ) {
        let version = format!("{major}.{minor}.{patch}");
        let mut out = banners.join("\n");
        out.push_str(&format!("\n\x1b[32m{version}\x1b[0m\n\n"));
        prop_assert_eq!(clean_native_output(&out), Some(version));
    }
}

// ============================================================================
// Shell quoting
// ============================================================================

proptest! {
    /// Values pass through untouched only when they are shell-safe; anything
    /// else is single-quoted with embedded quotes escaped.
    #[test]
    fn prop_shell_quote_wraps_unsafe_values(value in ".{0,32}") {
        let quoted = shell_quote(&value);
        if quoted == value {
            prop_assert!(!value.is_empty());
            prop_assert!(!value.contains(|c: char| " '\"$`;|&<>()*?!\n\t".contains(c)));
        } else {
            prop_assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace(r"'\''", "'"), value);
        }
    }
}

// ============================================================================
// Release pruning
// ============================================================================

proptest! {
    /// Pruning never removes the current release or one of the newest `keep`,
    /// whatever order the listing comes in.
    #[test]
    fn prop_stale_releases_respect_keep_and_current(
        count in 0usize..12,
        keep in 0usize..6,
        current_idx in prop::option::of(0usize..12),
    ) {
        let releases: Vec<String> = (0..count).map(|i| format!("1.0.{i}")).collect();
        let current = current_idx
            .filter(|i| *i < count)
            .map(|i| releases[i].clone());

        let stale = stale_releases(&releases, keep, current.as_deref());

        prop_assert!(stale.len() <= count.saturating_sub(keep));
        if let Some(current) = &current {
            prop_assert!(!stale.contains(current));
        }
        for kept in releases.iter().rev().take(keep) {
            prop_assert!(!stale.contains(kept));
        }
    }
}

#[test]
fn test_stale_releases_keeps_newest_first() {
    let releases: Vec<String> = ["1.3.0", "1.2.0", "1.1.0", "1.0.0"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(stale_releases(&releases, 2, Some("1.3.0")), ["1.1.0", "1.0.0"]);
    assert_eq!(stale_releases(&releases, 2, Some("1.0.0")), ["1.1.0"]);
}
