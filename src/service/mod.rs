//! Observability service lifecycle — the Compose-managed
//! Loki/Grafana/Traefik/Mimir/Pyroscope/Alloy stack on one host.

pub mod assets;
mod deploy;
mod identity;
mod info;
mod registry;
mod teardown;
mod update;

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::errors::{OpError, Operation, Subject};
use crate::output::SharedReporter;
use crate::store::CredentialStore;
use crate::target::Target;

pub use identity::Identity;
pub use info::InfoData;

/// Default service library root on the target.
pub const DEFAULT_LIB_DIR: &str = "/var/lib/finch";

/// Total budget for the post-compose readiness wait.
pub const READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Pause between readiness probes.
pub const READY_INTERVAL: Duration = Duration::from_secs(2);

/// TLS endpoint configuration via Let's Encrypt.
#[derive(Debug, Default, Clone)]
pub struct LetsEncrypt {
    pub enabled: bool,
    pub email: String,
}

/// TLS endpoint configuration via operator-supplied material.
#[derive(Debug, Default, Clone)]
pub struct CustomTls {
    pub enabled: bool,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Deploy-time service configuration, constructed once at the CLI boundary.
/// Update-family operations overwrite the identity fields from the target's
/// on-disk state, which is authoritative.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub letsencrypt: LetsEncrypt,
    pub custom_tls: CustomTls,
    /// Service library root on the target.
    pub lib_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            letsencrypt: LetsEncrypt::default(),
            custom_tls: CustomTls::default(),
            lib_dir: DEFAULT_LIB_DIR.to_string(),
        }
    }
}

/// Orchestrates service operations against one target.
pub struct Service<T: Target> {
    config: ServiceConfig,
    target: T,
    store: CredentialStore,
    reporter: SharedReporter,
    dry_run: bool,
}

impl<T: Target> Service<T> {
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        target: T,
        store: CredentialStore,
        reporter: SharedReporter,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            target,
            store,
            reporter,
            dry_run,
        }
    }

    /// Deploy the full stack.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, deploy-tagged.
    pub async fn deploy(&self) -> Result<(), OpError> {
        let result = self.deploy_inner().await;
        self.reporter.finish();
        result
    }

    /// Update a deployed stack in place.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, update-tagged.
    pub async fn update(&mut self) -> Result<(), OpError> {
        let result = self
            .update_inner()
            .await
            .map_err(|e| e.retag(Operation::Update));
        self.reporter.finish();
        result
    }

    /// Remove the stack, its data and its credential-store entry.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, teardown-tagged.
    pub async fn teardown(&mut self) -> Result<(), OpError> {
        let result = self
            .teardown_inner()
            .await
            .map_err(|e| e.retag(Operation::Teardown));
        self.reporter.finish();
        result
    }

    /// Issue and install mTLS material for a deployed stack that has no
    /// credential-store entry yet.
    ///
    /// # Errors
    ///
    /// Returns a register-tagged error; refuses when already registered.
    pub async fn register(&mut self) -> Result<(), OpError> {
        let result = self
            .register_inner()
            .await
            .map_err(|e| e.retag(Operation::Register));
        self.reporter.finish();
        result
    }

    /// Remove a stack's credential-store entry and its CA artifact.
    ///
    /// # Errors
    ///
    /// Returns a deregister-tagged error; requires an existing entry.
    pub async fn deregister(&mut self) -> Result<(), OpError> {
        let result = self
            .deregister_inner()
            .await
            .map_err(|e| e.retag(Operation::Deregister));
        self.reporter.finish();
        result
    }

    /// Replace the stack's mTLS material wholesale.
    ///
    /// # Errors
    ///
    /// Returns a rotate-certificate-tagged error; requires an existing entry.
    pub async fn rotate_certificate(&mut self) -> Result<(), OpError> {
        let result = self
            .rotate_certificate_inner()
            .await
            .map_err(|e| e.retag(Operation::RotateCertificate));
        self.reporter.finish();
        result
    }

    /// Replace the identity document's secret and restart the component that
    /// depends on it.
    ///
    /// # Errors
    ///
    /// Returns a rotate-secret-tagged error.
    pub async fn rotate_secret(&mut self) -> Result<(), OpError> {
        let result = self
            .rotate_secret_inner()
            .await
            .map_err(|e| e.retag(Operation::RotateSecret));
        self.reporter.finish();
        result
    }

    /// Read the deployed stack's identity summary. Dry-run returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an info-tagged error when the identity document cannot be
    /// read or parsed.
    pub async fn info(&mut self) -> Result<Option<InfoData>, OpError> {
        let result = self
            .info_inner()
            .await
            .map_err(|e| e.retag(Operation::Info));
        self.reporter.finish();
        result
    }

    fn lib_dir(&self) -> &str {
        &self.config.lib_dir
    }

    /// Identifier for this stack's CA artifact in the Traefik trust
    /// directory, derived from the stack hostname.
    fn resource_id(&self) -> String {
        format!("rid:finchctl:{}", &hex_sha256(&self.config.hostname)[..16])
    }

    fn ca_artifact_path(&self) -> String {
        format!(
            "{}/traefik/etc/certs.d/{}.pem",
            self.lib_dir(),
            self.resource_id()
        )
    }

    async fn check_requirements(&self) -> Result<(), OpError> {
        if let Err(e) = self.target.run("command -v sudo").await {
            return Err(
                OpError::new(Operation::Deploy, Subject::Service, "sudo is not installed")
                    .with_reason(e.to_string()),
            );
        }
        if let Err(e) = self.target.run("command -v curl").await {
            return Err(
                OpError::new(Operation::Deploy, Subject::Service, "curl is not installed")
                    .with_reason(e.to_string()),
            );
        }
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<Vec<u8>, OpError> {
        self.target
            .run(command)
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Service, &e))
    }
}

pub(crate) fn hex_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
