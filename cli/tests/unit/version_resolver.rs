//! `VersionResolver`: override, native command, file fallback, memoization.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use shipyard_cli::application::services::VersionResolver;
use shipyard_cli::domain::{ResolutionError, module_spec};
use shipyard_common::ModuleName;

use crate::mocks::{MapFs, ScriptedRunner, err_output, ok_output};

const NPM_OUTPUT: &[u8] = b"\n> bible-on-site@4.1.0 version\n> echo $npm_package_version\n\n4.1.0\n";

#[tokio::test]
async fn override_wins_without_running_anything() {
    let runner = ScriptedRunner::new();
    let fs = MapFs::new();
    let resolver = VersionResolver::new(runner.clone(), fs.clone(), "/repo")
        .with_override(Some("9.9.9".to_string()));

    let version = resolver.get_version(module_spec(ModuleName::Website)).await.unwrap();

    assert_eq!(version, "9.9.9");
    assert_eq!(runner.call_count(), 0);
    assert_eq!(fs.read_count(), 0);
    assert_eq!(resolver.cached(ModuleName::Website).await.as_deref(), Some("9.9.9"));
}

#[tokio::test]
async fn invalid_override_is_rejected() {
    let resolver = VersionResolver::new(ScriptedRunner::new(), MapFs::new(), "/repo")
        .with_override(Some("latest".to_string()));
    let err = resolver
        .get_version(module_spec(ModuleName::Api))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidOverride { .. }));
    assert!(resolver.cached(ModuleName::Api).await.is_none());
}

#[tokio::test]
async fn native_command_runs_in_module_directory() {
    let runner = ScriptedRunner::new().then(ok_output(NPM_OUTPUT));
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo");

    let version = resolver.get_version(module_spec(ModuleName::Website)).await.unwrap();

    assert_eq!(version, "4.1.0");
    assert_eq!(runner.calls(), ["npm run version --silent"]);
    assert_eq!(
        runner.cwds(),
        [Some(PathBuf::from("/repo/web/bible-on-site"))]
    );
}

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let runner = ScriptedRunner::new().then(ok_output(b"2.3.4\n"));
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo");
    let api = module_spec(ModuleName::Api);

    assert_eq!(resolver.get_version(api).await.unwrap(), "2.3.4");
    assert_eq!(resolver.get_version(api).await.unwrap(), "2.3.4");

    assert_eq!(runner.call_count(), 1);
    let snapshot = resolver.cache_snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[&ModuleName::Api], "2.3.4");
}

#[tokio::test]
async fn concurrent_first_calls_compute_once() {
    let runner = ScriptedRunner::new().then(ok_output(b"2.3.4\n"));
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo");
    let api = module_spec(ModuleName::Api);

    let (a, b) = tokio::join!(resolver.get_version(api), resolver.get_version(api));

    assert_eq!(a.unwrap(), "2.3.4");
    assert_eq!(b.unwrap(), "2.3.4");
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn modules_are_cached_independently() {
    let runner = ScriptedRunner::new()
        .then(ok_output(b"1.0.0\n"))
        .then(ok_output(b"2.0.0\n"));
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo");

    assert_eq!(
        resolver.get_version(module_spec(ModuleName::Api)).await.unwrap(),
        "1.0.0"
    );
    assert_eq!(
        resolver.get_version(module_spec(ModuleName::Bulletin)).await.unwrap(),
        "2.0.0"
    );
    assert_eq!(runner.call_count(), 2);
}

#[tokio::test]
async fn failing_command_falls_back_to_package_json() {
    let runner = ScriptedRunner::new().then(err_output(127, b"sh: npm: command not found"));
    let fs = MapFs::new().with_file(
        "/repo/web/bible-on-site/package.json",
        r#"{ "name": "bible-on-site", "version": "4.2.0" }"#,
    );
    let resolver = VersionResolver::new(runner, fs.clone(), "/repo");

    let version = resolver.get_version(module_spec(ModuleName::Website)).await.unwrap();

    assert_eq!(version, "4.2.0");
    assert_eq!(fs.read_count(), 1);
}

#[tokio::test]
async fn spawn_error_falls_back_to_cargo_toml() {
    let runner = ScriptedRunner::new().then_spawn_error("cargo: not found");
    let fs = MapFs::new().with_file(
        "/repo/web/api/Cargo.toml",
        "[package]\nname = \"api\"\nversion = \"0.7.1\"\nedition = \"2021\"\n",
    );
    let resolver = VersionResolver::new(runner, fs, "/repo");

    let version = resolver.get_version(module_spec(ModuleName::Api)).await.unwrap();

    assert_eq!(version, "0.7.1");
}

#[tokio::test]
async fn garbage_command_output_falls_back_to_file() {
    let runner = ScriptedRunner::new().then(ok_output(b"[cargo-make] INFO - Build Done\nnot-a-version\n"));
    let fs = MapFs::new().with_file("/repo/web/bulletin/Cargo.toml", "version = \"3.0.0\"\n");
    let resolver = VersionResolver::new(runner, fs, "/repo");

    let version = resolver
        .get_version(module_spec(ModuleName::Bulletin))
        .await
        .unwrap();

    assert_eq!(version, "3.0.0");
}

#[tokio::test]
async fn both_sources_failing_names_command_and_file() {
    let runner = ScriptedRunner::new().then(err_output(1, b"boom"));
    let resolver = VersionResolver::new(runner, MapFs::new(), "/repo");

    let err = resolver
        .get_version(module_spec(ModuleName::Api))
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, ResolutionError::Unresolvable { .. }));
    assert!(msg.contains("cargo make version"), "{msg}");
    assert!(msg.contains("web/api/Cargo.toml"), "{msg}");
    assert!(resolver.cached(ModuleName::Api).await.is_none());
}

// --- release baseline ---

fn api_resolver(tag_listing: &[u8]) -> (VersionResolver<ScriptedRunner, MapFs>, ScriptedRunner) {
    let runner = ScriptedRunner::new()
        .then(ok_output(b"2.0.0\n"))
        .then(ok_output(tag_listing));
    (VersionResolver::new(runner.clone(), MapFs::new(), "/repo"), runner)
}

#[tokio::test]
async fn released_version_lists_prefixed_tags_at_repo_root() {
    let runner = ScriptedRunner::new().then(ok_output(b"api-v1.4.0\napi-v1.3.9\n"));
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo");
    let api = module_spec(ModuleName::Api);

    assert_eq!(resolver.released_version(api).await.as_deref(), Some("1.4.0"));
    assert_eq!(resolver.released_version(api).await.as_deref(), Some("1.4.0"));

    assert_eq!(runner.calls(), ["git tag -l api-v* --sort=-v:refname"]);
    assert_eq!(runner.cwds(), [Some(PathBuf::from("/repo"))]);
}

#[tokio::test]
async fn no_release_tags_passes_baseline() {
    let (resolver, runner) = api_resolver(b"");
    let api = module_spec(ModuleName::Api);

    resolver.ensure_newer_than_released(api).await.unwrap();

    assert_eq!(resolver.released_version(api).await, None);
    assert_eq!(runner.call_count(), 2);
}

#[tokio::test]
async fn older_release_passes_baseline() {
    let (resolver, _) = api_resolver(b"api-v1.9.3\napi-v1.10.0\n");

    resolver
        .ensure_newer_than_released(module_spec(ModuleName::Api))
        .await
        .unwrap();
}

#[tokio::test]
async fn equal_release_is_refused() {
    let (resolver, _) = api_resolver(b"api-v2.0.0\napi-v1.10.0\n");

    let err = resolver
        .ensure_newer_than_released(module_spec(ModuleName::Api))
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, ResolutionError::NotNewerThanReleased { .. }));
    assert!(msg.contains("not greater than released version 2.0.0"), "{msg}");
    assert!(msg.contains("web/api/Cargo.toml"), "{msg}");
}

#[tokio::test]
async fn newer_release_is_refused() {
    let (resolver, _) = api_resolver(b"api-v2.1.0\n");

    let err = resolver
        .ensure_newer_than_released(module_spec(ModuleName::Api))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolutionError::NotNewerThanReleased { ref released, .. } if released == "2.1.0"
    ));
}

#[tokio::test]
async fn unlistable_tags_pass_baseline() {
    let runner = ScriptedRunner::new()
        .then(ok_output(b"2.0.0\n"))
        .then(err_output(128, b"fatal: not a git repository"));
    let resolver = VersionResolver::new(runner, MapFs::new(), "/repo");

    resolver
        .ensure_newer_than_released(module_spec(ModuleName::Api))
        .await
        .unwrap();
}

#[tokio::test]
async fn override_skips_baseline_check() {
    let runner = ScriptedRunner::new();
    let resolver = VersionResolver::new(runner.clone(), MapFs::new(), "/repo")
        .with_override(Some("0.0.1".to_string()));

    resolver
        .ensure_newer_than_released(module_spec(ModuleName::Api))
        .await
        .unwrap();

    assert_eq!(runner.call_count(), 0);
}
