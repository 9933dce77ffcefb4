//! Version string extraction and validation.
//!
//! Pure functions only. Callers supply command output or file content.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::module::VersionFile;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // constant pattern
    Regex::new(r"\x1b\[[0-9;]*m").unwrap()
});

static CARGO_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // constant pattern
    Regex::new(r#"(?m)^version\s*=\s*"([^"]+)""#).unwrap()
});

/// Extract the version from the stdout of a native version command.
///
/// Build tools surround the version with noise (ANSI colour codes,
/// `[cargo-make]` banners, npm `>` script echoes). The version is the last
/// line left after stripping that noise.
#[must_use]
pub fn clean_native_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(|line| ANSI_ESCAPE.replace_all(line, "").trim().to_string())
        .filter(|line| {
            !line.is_empty()
                && !line.contains("[cargo-make]")
                && !line.contains("INFO")
                && !line.starts_with('>')
        })
        .last()
}

/// Read the version out of a version file's content.
#[must_use]
pub fn extract_from_file(format: VersionFile, content: &str) -> Option<String> {
    match format {
        VersionFile::PackageJson => serde_json::from_str::<serde_json::Value>(content)
            .ok()?
            .get("version")?
            .as_str()
            .map(str::to_owned),
        VersionFile::CargoToml => CARGO_VERSION
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_owned()),
    }
}

static DOCKER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // constant pattern
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap()
});

/// Latest released version in a `git tag -l '<prefix>*'` listing.
///
/// Tags that do not parse as semver after stripping `prefix` are ignored.
/// The highest version wins regardless of listing order.
#[must_use]
pub fn latest_released(tag_listing: &str, prefix: &str) -> Option<String> {
    tag_listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix(prefix))
        .filter_map(|v| semver::Version::parse(v).ok())
        .max()
        .map(|v| v.to_string())
}

/// Whether `current` is strictly greater than `released` in semver order.
///
/// # Errors
///
/// Returns the parser's message when either side is not valid semver.
pub fn is_newer(current: &str, released: &str) -> Result<bool, String> {
    let current = semver::Version::parse(current).map_err(|e| format!("'{current}': {e}"))?;
    let released = semver::Version::parse(released).map_err(|e| format!("'{released}': {e}"))?;
    Ok(current > released)
}

/// Docker image tag for `version`.
///
/// Build metadata separators (`+`) are not allowed in tags and become `_`.
/// Returns `None` if the result still breaks the tag grammar.
#[must_use]
pub fn docker_tag(version: &str) -> Option<String> {
    let tag = version.replace('+', "_");
    DOCKER_TAG.is_match(&tag).then_some(tag)
}

/// Check that `version` is a semantic version.
///
/// # Errors
///
/// Returns the parser's message when `version` is not valid semver.
pub fn validate(version: &str) -> Result<(), String> {
    semver::Version::parse(version)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
