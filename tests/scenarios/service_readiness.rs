//! Service deploy readiness wait — a never-ready stack fails after the fixed
//! polling budget, not earlier and not indefinitely.

use finchctl::errors::Operation;
use finchctl::service::{READY_INTERVAL, READY_TIMEOUT, Service, ServiceConfig};
use finchctl::store::CredentialStore;

use crate::mocks::{RecordingReporter, ScriptedTarget};

fn deploy_config() -> ServiceConfig {
    ServiceConfig {
        hostname: "observer.example.com".to_string(),
        username: "finch".to_string(),
        password: "s3cret".to_string(),
        ..ServiceConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_deploy_fails_after_fixed_readiness_budget() {
    let target = ScriptedTarget::new("tester", "observer.internal")
        .fail("curl -s -o /dev/null", "connection refused");
    let commands = target.commands_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::with_path(dir.path().join("config.json"));
    let service = Service::new(
        deploy_config(),
        target,
        store,
        RecordingReporter::new(),
        false,
    );

    let err = service.deploy().await.expect_err("deploy must fail");
    assert_eq!(err.operation, Operation::Deploy);
    assert!(
        err.to_string().contains("did not become ready within 180s"),
        "{err}"
    );

    // Probes run every 2s inside a 180s budget: one at t=0 plus 90 more.
    let expected_probes = READY_TIMEOUT.as_secs() / READY_INTERVAL.as_secs() + 1;
    let probes = commands
        .lock()
        .expect("lock")
        .iter()
        .filter(|c| c.starts_with("curl -s -o /dev/null"))
        .count();
    assert_eq!(probes as u64, expected_probes, "budget must be exhausted exactly");
}

#[tokio::test]
async fn test_deploy_succeeds_when_front_door_answers() {
    let target = ScriptedTarget::new("tester", "observer.internal")
        .respond("curl -s -o /dev/null", b"302");
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let store_path = dir.path().join("config.json");
    let store = CredentialStore::with_path(store_path.clone());
    let service = Service::new(
        deploy_config(),
        target,
        store,
        RecordingReporter::new(),
        false,
    );

    service.deploy().await.expect("deploy must succeed");

    // Credentials persisted after readiness.
    let store = CredentialStore::with_path(store_path);
    let (user, pass) = store
        .lookup_auth("observer.example.com")
        .expect("auth persisted");
    assert_eq!((user.as_str(), pass.as_str()), ("finch", "s3cret"));
    let (cert, _key) = store
        .lookup_certificate("observer.example.com")
        .expect("client certificate persisted");
    assert!(cert.contains("BEGIN CERTIFICATE"));

    // The identity document and compose file landed under the lib root.
    let copies = copies.lock().expect("lock");
    assert!(
        copies.iter().any(|(dest, _)| dest == "/var/lib/finch/finch.json"),
        "identity document must be written"
    );
    assert!(
        copies
            .iter()
            .any(|(dest, _)| dest == "/var/lib/finch/docker-compose.yaml"),
        "compose file must be written"
    );
}

#[tokio::test]
async fn test_deploy_halts_at_first_failing_step() {
    // Docker present but not running: deploy must fail before any
    // configuration is copied.
    let target = ScriptedTarget::new("tester", "observer.internal")
        .fail("sudo docker version", "cannot connect to daemon");
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::with_path(dir.path().join("config.json"));
    let service = Service::new(
        deploy_config(),
        target,
        store,
        RecordingReporter::new(),
        false,
    );

    let err = service.deploy().await.expect_err("deploy must fail");
    assert!(err.to_string().contains("Docker is not running"), "{err}");
    assert!(
        copies.lock().expect("lock").is_empty(),
        "no configuration may land after a failed requirement"
    );
}
