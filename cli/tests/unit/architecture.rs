//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries hold:
//! domain stays pure, services talk to the outside world only through ports.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

fn src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Lines in `dir` containing any of `forbidden`, as `file:line: text`.
fn find_violations(dir: &Path, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            for needle in forbidden {
                if line.contains(needle) {
                    violations.push(format!("{rel}:{}: `{needle}`: {line}", i + 1));
                }
            }
        }
    }
    violations
}

#[test]
fn domain_has_no_io_or_outer_layer_imports() {
    let violations = find_violations(
        &src_dir().join("domain"),
        &[
            "crate::application",
            "crate::infra",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay pure and synchronous:\n{}",
        violations.join("\n")
    );
}

#[test]
fn services_only_depend_on_domain_and_ports() {
    let violations = find_violations(
        &src_dir().join("application").join("services"),
        &[
            "crate::infra",
            "crate::commands",
            "crate::output",
            "std::process::Command",
            "tokio::process",
        ],
    );
    assert!(
        violations.is_empty(),
        "application/services/ must reach the outside world through ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = find_violations(&src_dir().join("infra"), &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn concrete_connections_are_built_only_in_commands() {
    let mut violations = Vec::new();
    for dir in ["domain", "application", "output"] {
        violations.extend(find_violations(
            &src_dir().join(dir),
            &["SshConnection::new", "RegistryConnection::new", "TokioCommandRunner::new"],
        ));
    }
    assert!(
        violations.is_empty(),
        "infrastructure types must be wired up in commands/, not constructed in inner layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn no_inline_json_branching_in_commands() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            let trimmed = line.trim();
            if line.contains("json: bool") || trimmed.starts_with("if json") || trimmed.starts_with("if !json") {
                violations.push(format!("{rel}:{}: inline JSON flag: {line}", i + 1));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "commands/ must use app.is_json() instead of threading a json flag:\n{}",
        violations.join("\n")
    );
}

#[test]
fn services_do_not_print() {
    let violations = find_violations(
        &src_dir().join("application"),
        &["println!", "eprintln!", "print!(", "eprint!("],
    );
    assert!(
        violations.is_empty(),
        "application/ must report through ProgressReporter or tracing:\n{}",
        violations.join("\n")
    );
}
