//! Agent update version gating — the download/install sub-sequence runs only
//! when the installed and desired version tags differ.

use std::path::PathBuf;

use finchctl::agent::{Agent, UpdateOptions, VersionSpec};

use crate::mocks::{RecordingReporter, ScriptedReleaseSource, ScriptedTarget, release_zip};

fn linux_target(installed_version: &str) -> ScriptedTarget {
    ScriptedTarget::new("tester", "observer.internal")
        .respond("uname -sm", b"Linux x86_64\n")
        .respond(
            "alloy --version",
            format!("alloy, version {installed_version} (branch: HEAD)\n").as_bytes(),
        )
}

fn config_file() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("alloy.config");
    std::fs::write(&path, b"logging {}\n").expect("write config");
    (dir, path)
}

#[tokio::test]
async fn test_update_with_equal_versions_skips_download_and_install() {
    let (_guard, config) = config_file();
    let target = linux_target("v1.4.2");
    let commands = target.commands_handle();
    let copies = target.copies_handle();
    let source = ScriptedReleaseSource::new("v1.4.2", release_zip("alloy-linux-amd64", b"#!fake-alloy-binary"));
    let fetches = source.fetches_handle();
    let reporter = RecordingReporter::new();

    let agent = Agent::with_release_source(
        target,
        config,
        VersionSpec::Latest,
        source,
        reporter,
        false,
    );
    agent
        .update(&UpdateOptions::default())
        .await
        .expect("update must succeed");

    assert!(
        fetches.lock().expect("lock").is_empty(),
        "equal versions must not download"
    );
    let copies = copies.lock().expect("lock");
    assert!(
        !copies.iter().any(|(dest, _)| dest == "/usr/bin/alloy"),
        "equal versions must not reinstall the binary"
    );
    assert!(
        copies.iter().any(|(dest, _)| dest == "/etc/alloy/alloy.config"),
        "configuration is still re-applied"
    );
    let commands = commands.lock().expect("lock");
    assert!(
        commands.contains(&"sudo systemctl restart alloy.service".to_string()),
        "update always restarts the service"
    );
}

#[tokio::test]
async fn test_update_with_differing_versions_runs_full_install_sequence() {
    let (_guard, config) = config_file();
    let target = linux_target("v1.4.1");
    let copies = target.copies_handle();
    let source = ScriptedReleaseSource::new("v1.4.2", release_zip("alloy-linux-amd64", b"#!fake-alloy-binary"));
    let fetches = source.fetches_handle();
    let reporter = RecordingReporter::new();

    let agent = Agent::with_release_source(
        target,
        config,
        VersionSpec::Latest,
        source,
        reporter,
        false,
    );
    agent
        .update(&UpdateOptions::default())
        .await
        .expect("update must succeed");

    let fetches = fetches.lock().expect("lock");
    assert_eq!(fetches.len(), 1, "differing versions download exactly once");
    assert!(
        fetches[0].contains("/download/v1.4.2/alloy-linux-amd64.zip"),
        "download must pin the resolved tag: {}",
        fetches[0]
    );
    let copies = copies.lock().expect("lock");
    let binary = copies
        .iter()
        .find(|(dest, _)| dest == "/usr/bin/alloy")
        .expect("binary must be installed");
    assert_eq!(binary.1, b"#!fake-alloy-binary", "unpacked binary content");
}

#[tokio::test]
async fn test_update_version_comparison_is_string_equality_not_semver() {
    // "v1.4.2" vs "1.4.2": semantically equal, textually different — the
    // gate must treat them as different and reinstall.
    let (_guard, config) = config_file();
    let target = linux_target("1.4.2");
    let source = ScriptedReleaseSource::new("v1.4.2", release_zip("alloy-linux-amd64", b"#!fake-alloy-binary"));
    let fetches = source.fetches_handle();
    let reporter = RecordingReporter::new();

    let agent = Agent::with_release_source(
        target,
        config,
        VersionSpec::Latest,
        source,
        reporter,
        false,
    );
    agent
        .update(&UpdateOptions::default())
        .await
        .expect("update must succeed");

    assert_eq!(fetches.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn test_update_skip_flags_leave_config_and_binary_untouched() {
    let target = linux_target("v1.4.1");
    let commands = target.commands_handle();
    let copies = target.copies_handle();
    let source = ScriptedReleaseSource::new("v1.4.2", release_zip("alloy-linux-amd64", b"#!fake-alloy-binary"));
    let fetches = source.fetches_handle();
    let reporter = RecordingReporter::new();

    let agent = Agent::with_release_source(
        target,
        PathBuf::new(),
        VersionSpec::Latest,
        source,
        reporter,
        false,
    );
    agent
        .update(&UpdateOptions {
            skip_config: true,
            skip_install: true,
        })
        .await
        .expect("update must succeed");

    assert!(copies.lock().expect("lock").is_empty());
    assert!(fetches.lock().expect("lock").is_empty());
    assert!(
        commands
            .lock()
            .expect("lock")
            .contains(&"sudo systemctl restart alloy.service".to_string())
    );
}

#[tokio::test]
async fn test_update_fails_when_installed_version_is_unreadable() {
    let (_guard, config) = config_file();
    let target = ScriptedTarget::new("tester", "observer.internal")
        .respond("uname -sm", b"Linux x86_64\n")
        .respond("alloy --version", b"garbled output\n");
    let source = ScriptedReleaseSource::new("v1.4.2", release_zip("alloy-linux-amd64", b"#!fake-alloy-binary"));
    let reporter = RecordingReporter::new();

    let agent = Agent::with_release_source(
        target,
        config,
        VersionSpec::Latest,
        source,
        reporter,
        false,
    );
    let err = agent
        .update(&UpdateOptions::default())
        .await
        .expect_err("unparsable version must fail");
    assert!(
        err.to_string().starts_with("Failed to update agent:"),
        "{err}"
    );
}
