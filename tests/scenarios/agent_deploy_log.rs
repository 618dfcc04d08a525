//! Dry-run agent deploy against a local target must report a fixed step
//! sequence — a regression guard against accidentally adding or removing
//! provisioning steps.

use std::path::PathBuf;
use std::time::Duration;

use finchctl::agent::{Agent, VersionSpec};
use finchctl::output::SharedReporter;
use finchctl::target::{HostSpec, LocalTarget};

use crate::mocks::RecordingReporter;

fn dry_run_target(reporter: SharedReporter) -> LocalTarget {
    let spec = HostSpec {
        user: "tester".to_string(),
        host: "localhost".to_string(),
        port: 22,
    };
    LocalTarget::new(spec, reporter, true, Duration::from_secs(5))
}

#[tokio::test]
async fn test_dry_run_deploy_reports_fixed_step_sequence() {
    let reporter = RecordingReporter::new();
    let target = dry_run_target(reporter.clone());
    let agent = Agent::new(
        target,
        PathBuf::from("/tmp/alloy.config"),
        VersionSpec::Latest,
        reporter.clone(),
        true,
    );

    agent.deploy().await.expect("dry-run deploy must succeed");

    let lines = reporter.lines();
    assert_eq!(
        lines.len(),
        12,
        "step count changed — deploy sequence was modified:\n{lines:#?}"
    );
    assert_eq!(lines[0], "Running 'command -v sudo' as tester@localhost");
    assert_eq!(
        lines[lines.len() - 2],
        "Running 'sudo systemctl enable --now alloy' as tester@localhost"
    );
    assert_eq!(
        lines[lines.len() - 1],
        "Running 'sudo systemctl is-active alloy' as tester@localhost"
    );
}

#[tokio::test]
async fn test_dry_run_deploy_reports_download_and_unzip_on_operator_machine() {
    let reporter = RecordingReporter::new();
    let target = dry_run_target(reporter.clone());
    let agent = Agent::new(
        target,
        PathBuf::from("/tmp/alloy.config"),
        VersionSpec::Latest,
        reporter.clone(),
        true,
    );

    agent.deploy().await.expect("dry-run deploy must succeed");

    let lines = reporter.lines();
    assert_eq!(
        lines[6],
        "Downloading 'https://github.com/grafana/alloy/releases/latest/download/alloy-linux-amd64.zip' as tester@localhost"
    );
    assert!(
        lines[7].starts_with("Unzipping '"),
        "line 8 must be the unzip step: {}",
        lines[7]
    );
}

#[tokio::test]
async fn test_dry_run_deploy_with_pinned_release_uses_versioned_url() {
    let reporter = RecordingReporter::new();
    let target = dry_run_target(reporter.clone());
    let agent = Agent::new(
        target,
        PathBuf::from("/tmp/alloy.config"),
        VersionSpec::Pinned("v1.4.2".to_string()),
        reporter.clone(),
        true,
    );

    agent.deploy().await.expect("dry-run deploy must succeed");

    let lines = reporter.lines();
    assert_eq!(
        lines[6],
        "Downloading 'https://github.com/grafana/alloy/releases/download/v1.4.2/alloy-linux-amd64.zip' as tester@localhost"
    );
}

#[tokio::test]
async fn test_dry_run_teardown_reports_fixed_step_sequence() {
    let reporter = RecordingReporter::new();
    let target = dry_run_target(reporter.clone());
    let agent = Agent::new(
        target,
        PathBuf::new(),
        VersionSpec::Latest,
        reporter.clone(),
        true,
    );

    agent.teardown().await.expect("dry-run teardown must succeed");

    let lines = reporter.lines();
    // requirements (2) + uname (1) + stop/disable/rm unit (3) + rm dirs (2)
    // + rm binary (1)
    assert_eq!(lines.len(), 9, "{lines:#?}");
    assert_eq!(
        lines[3],
        "Running 'sudo systemctl stop alloy.service' as tester@localhost"
    );
    assert_eq!(
        lines[lines.len() - 1],
        "Running 'sudo rm -f /usr/bin/alloy' as tester@localhost"
    );
}
