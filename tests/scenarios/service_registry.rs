//! Registration guards and credential rotation against a deployed stack.

use finchctl::service::{Service, ServiceConfig};
use finchctl::store::CredentialStore;

use crate::mocks::{RecordingReporter, ScriptedTarget, identity_json};

const HOSTNAME: &str = "observer.example.com";

fn deployed_target() -> ScriptedTarget {
    ScriptedTarget::new("tester", "observer.internal")
        .respond("sudo cat /var/lib/finch/finch.json", &identity_json(HOSTNAME))
        .fail("test -e /var/lib/finch/traefik/etc/conf.d/letsencrypt.yaml", "absent")
        .respond("curl -s -o /dev/null", b"200")
}

fn service_with_store(
    target: ScriptedTarget,
    dir: &tempfile::TempDir,
) -> (Service<ScriptedTarget>, CredentialStore) {
    let path = dir.path().join("config.json");
    let service = Service::new(
        ServiceConfig::default(),
        target,
        CredentialStore::with_path(path.clone()),
        RecordingReporter::new(),
        false,
    );
    (service, CredentialStore::with_path(path))
}

fn is_ca_artifact(dest: &str) -> bool {
    dest.starts_with("/var/lib/finch/traefik/etc/certs.d/rid:finchctl:")
}

#[tokio::test]
async fn test_register_issues_and_persists_material() {
    let target = deployed_target();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);

    service.register().await.expect("register must succeed");

    let (cert, key) = store.lookup_certificate(HOSTNAME).expect("client pair");
    assert!(cert.contains("BEGIN CERTIFICATE"));
    assert!(key.contains("PRIVATE KEY"));
    assert!(
        copies.lock().expect("lock").iter().any(|(d, _)| is_ca_artifact(d)),
        "CA artifact must land in the trust directory"
    );
}

#[tokio::test]
async fn test_register_refuses_an_already_registered_stack() {
    let target = deployed_target();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);
    store
        .update_auth(HOSTNAME, "finch", "s3cret")
        .expect("seed store");
    let before = std::fs::read(dir.path().join("config.json")).expect("read store");

    let err = service.register().await.expect_err("register must refuse");

    assert!(err.to_string().contains("stack already registered"), "{err}");
    assert!(err.to_string().contains("rotate-certificate"), "{err}");
    let after = std::fs::read(dir.path().join("config.json")).expect("read store");
    assert_eq!(after, before, "the store must not be mutated");
    assert!(
        !copies.lock().expect("lock").iter().any(|(d, _)| is_ca_artifact(d)),
        "no certificate material may be installed"
    );
}

#[tokio::test]
async fn test_rotate_certificate_requires_registration() {
    let target = deployed_target();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, _store) = service_with_store(target, &dir);

    let err = service
        .rotate_certificate()
        .await
        .expect_err("rotate must refuse");

    assert!(err.to_string().contains("stack not registered"), "{err}");
    assert!(
        copies.lock().expect("lock").is_empty(),
        "no certificates may be generated"
    );
}

#[tokio::test]
async fn test_rotate_certificate_replaces_material_and_drops_legacy_ca() {
    let target = deployed_target();
    let commands = target.commands_handle();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);
    store
        .update_certificate(HOSTNAME, "OLD-CERT", "OLD-KEY")
        .expect("seed store");

    service
        .rotate_certificate()
        .await
        .expect("rotate must succeed");

    let (cert, _) = store.lookup_certificate(HOSTNAME).expect("client pair");
    assert_ne!(cert, "OLD-CERT", "material must be replaced wholesale");
    assert!(
        copies.lock().expect("lock").iter().any(|(d, _)| is_ca_artifact(d)),
        "new CA artifact must be installed"
    );
    let commands = commands.lock().expect("lock");
    let rm_index = commands
        .iter()
        .position(|c| c == "sudo rm -f /var/lib/finch/traefik/etc/certs.d/ca.pem")
        .expect("legacy CA must be deleted");
    assert_eq!(
        rm_index,
        commands.len() - 1,
        "legacy CA deletion happens after the new artifact landed"
    );
}

#[tokio::test]
async fn test_deregister_requires_registration_and_cleans_up() {
    let target = deployed_target();
    let commands = target.commands_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);

    let err = service.deregister().await.expect_err("must refuse");
    assert!(err.to_string().contains("stack not registered"), "{err}");

    store
        .update_certificate(HOSTNAME, "CERT", "KEY")
        .expect("seed store");
    service.deregister().await.expect("deregister must succeed");

    assert!(!store.contains(HOSTNAME), "entry must be removed");
    assert!(
        commands
            .lock()
            .expect("lock")
            .iter()
            .any(|c| c.starts_with("sudo rm -f /var/lib/finch/traefik/etc/certs.d/rid:finchctl:")),
        "CA artifact must be removed from the target"
    );
}

#[tokio::test]
async fn test_rotate_secret_rewrites_only_the_secret_and_restarts_finch() {
    let target = deployed_target();
    let commands = target.commands_handle();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, _store) = service_with_store(target, &dir);

    service.rotate_secret().await.expect("rotate must succeed");

    let copies = copies.lock().expect("lock");
    let (_, content) = copies
        .iter()
        .find(|(dest, _)| dest == "/var/lib/finch/finch.json")
        .expect("identity document must be rewritten");
    let rewritten: serde_json::Value =
        serde_json::from_slice(content).expect("valid identity document");
    assert_ne!(
        rewritten["secret"].as_str().expect("secret"),
        "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0ISEhISE=",
        "secret must be replaced"
    );
    assert_eq!(rewritten["hostname"], HOSTNAME, "hostname must be preserved");
    assert_eq!(
        rewritten["id"], "0123456789abcdef",
        "identity id must be preserved"
    );

    assert!(
        commands.lock().expect("lock").contains(
            &"sudo docker compose --file /var/lib/finch/docker-compose.yaml restart finch"
                .to_string()
        ),
        "only the dependent component restarts"
    );
}

#[tokio::test]
async fn test_update_regenerates_missing_certificate_material() {
    let target = deployed_target();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);

    service.update().await.expect("update must succeed");

    assert!(
        store.lookup_certificate(HOSTNAME).is_ok(),
        "missing material must be regenerated"
    );
    assert!(
        copies.lock().expect("lock").iter().any(|(d, _)| is_ca_artifact(d)),
        "CA artifact must be installed"
    );
}

#[tokio::test]
async fn test_update_keeps_unexpired_certificate_material() {
    let (ca_cert, ca_key) = finchctl::mtls::generate_ca(HOSTNAME).expect("ca");
    let (client_cert, client_key) =
        finchctl::mtls::generate_client(HOSTNAME, &ca_cert, &ca_key).expect("client");

    let target = deployed_target();
    let copies = target.copies_handle();
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut service, store) = service_with_store(target, &dir);
    store
        .update_certificate(HOSTNAME, &client_cert, &client_key)
        .expect("seed store");

    service.update().await.expect("update must succeed");

    let (cert, _) = store.lookup_certificate(HOSTNAME).expect("entry");
    assert_eq!(cert, client_cert, "fresh material must be left alone");
    assert!(
        !copies.lock().expect("lock").iter().any(|(d, _)| is_ca_artifact(d)),
        "no CA artifact may be reinstalled"
    );
}
