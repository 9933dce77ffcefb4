//! Deployable module catalogue.
//!
//! Pure data: where each module lives, how its version is read, and where its
//! pre-built artifacts are expected.

use std::path::{Path, PathBuf};

use shipyard_common::{ModuleName, TargetKind};

/// How the fallback version is read from a module's version file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFile {
    /// `package.json` with a top-level `"version"` field.
    PackageJson,
    /// `Cargo.toml` with a `version = "..."` line.
    CargoToml,
}

/// Static description of a deployable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: ModuleName,
    pub display_name: &'static str,
    /// Directory of the module relative to the repository root.
    pub path: &'static str,
    /// Version file relative to the repository root.
    pub version_file: &'static str,
    pub version_format: VersionFile,
    /// Native command (program followed by args) that prints the version.
    pub native_command: &'static [&'static str],
    pub tag_prefix: &'static str,
    pub default_target: TargetKind,
    /// Image repository name for registry targets.
    pub image_repository: &'static str,
    /// systemd unit restarted on host targets.
    pub service_unit: &'static str,
    pub health_port: u16,
    pub health_path: &'static str,
}

static MODULES: [ModuleSpec; 3] = [
    ModuleSpec {
        name: ModuleName::Website,
        display_name: "Website",
        path: "web/bible-on-site",
        version_file: "web/bible-on-site/package.json",
        version_format: VersionFile::PackageJson,
        native_command: &["npm", "run", "version", "--silent"],
        tag_prefix: "website-v",
        default_target: TargetKind::Host,
        image_repository: "bible-on-site",
        service_unit: "bible-on-site-website",
        health_port: 3000,
        health_path: "/api/health/ready",
    },
    ModuleSpec {
        name: ModuleName::Api,
        display_name: "API",
        path: "web/api",
        version_file: "web/api/Cargo.toml",
        version_format: VersionFile::CargoToml,
        native_command: &["cargo", "make", "version"],
        tag_prefix: "api-v",
        default_target: TargetKind::Registry,
        image_repository: "bible-on-site-api",
        service_unit: "bible-on-site-api",
        health_port: 3003,
        health_path: "/health",
    },
    ModuleSpec {
        name: ModuleName::Bulletin,
        display_name: "Bulletin",
        path: "web/bulletin",
        version_file: "web/bulletin/Cargo.toml",
        version_format: VersionFile::CargoToml,
        native_command: &["cargo", "make", "version"],
        tag_prefix: "bulletin-v",
        default_target: TargetKind::Registry,
        image_repository: "bible-on-site-bulletin",
        service_unit: "bible-on-site-bulletin",
        health_port: 3004,
        health_path: "/health",
    },
];

/// Look up the catalogue entry for a module.
#[must_use]
pub fn module_spec(name: ModuleName) -> &'static ModuleSpec {
    match name {
        ModuleName::Website => &MODULES[0],
        ModuleName::Api => &MODULES[1],
        ModuleName::Bulletin => &MODULES[2],
    }
}

impl ModuleSpec {
    /// Human-readable form of the native version command.
    #[must_use]
    pub fn native_command_line(&self) -> String {
        self.native_command.join(" ")
    }

    /// Release tag for a version, e.g. `api-v1.2.3`.
    #[must_use]
    pub fn tag(&self, version: &str) -> String {
        format!("{}{version}", self.tag_prefix)
    }

    /// Default location of the pre-built artifact for `version`.
    ///
    /// Host targets receive a gzipped release tarball; registry targets an
    /// image archive produced by `docker save`.
    #[must_use]
    pub fn default_artifact_path(&self, repo_root: &Path, kind: TargetKind, version: &str) -> PathBuf {
        let file = match kind {
            TargetKind::Host => format!("{}-{version}.tar.gz", self.name),
            TargetKind::Registry => format!("{}-{version}.image.tar", self.name),
        };
        repo_root.join(self.path).join(".release").join(file)
    }
}
