//! Service update sequence — the target's on-disk identity document is
//! authoritative; CLI flags are not trusted for a deployed stack.

use crate::errors::{OpError, Operation, Subject};
use crate::mtls;
use crate::target::Target;

use super::{Identity, Service};

impl<T: Target> Service<T> {
    pub(super) async fn update_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;
        self.refresh_certificates().await?;

        self.setup_persistence().await?;
        self.copy_loki_config().await?;
        self.copy_traefik_http_config().await?;
        self.copy_alloy_config().await?;
        self.copy_mimir_config().await?;
        self.copy_dashboards().await?;

        self.update_compose().await?;
        Ok(())
    }

    /// Recover hostname, credentials and TLS mode from the deployed stack.
    pub(crate) async fn read_identity(&mut self) -> Result<(), OpError> {
        let out = self
            .run(&format!("sudo cat {}/finch.json", self.lib_dir()))
            .await?;

        if self.dry_run {
            return Ok(());
        }

        let identity: Identity = serde_json::from_slice(&out).map_err(|e| {
            OpError::new(
                Operation::Update,
                Subject::Service,
                "invalid identity document",
            )
            .with_reason(e.to_string())
        })?;
        self.config.hostname = identity.hostname;
        self.config.username = identity.credentials.username;
        self.config.password = identity.credentials.password;

        let fragment = format!("{}/traefik/etc/conf.d/letsencrypt.yaml", self.lib_dir());
        if self.target.run(&format!("test -e {fragment}")).await.is_ok() {
            self.config.letsencrypt.enabled = true;
        }

        Ok(())
    }

    /// Re-read the full identity document. Dry-run yields a placeholder so
    /// downstream steps still report.
    pub(crate) async fn read_identity_document(&self) -> Result<Identity, OpError> {
        let out = self
            .run(&format!("sudo cat {}/finch.json", self.lib_dir()))
            .await?;

        if self.dry_run {
            return Ok(Identity::new("", "", ""));
        }

        serde_json::from_slice(&out).map_err(|e| {
            OpError::new(
                Operation::Update,
                Subject::Service,
                "invalid identity document",
            )
            .with_reason(e.to_string())
        })
    }

    /// Regenerate mTLS material when the stored client certificate is missing
    /// or past hard expiry. `CERT_EXPIRATION_THRESHOLD` intentionally plays
    /// no part here; see DESIGN.md.
    async fn refresh_certificates(&self) -> Result<(), OpError> {
        if self.dry_run {
            return self.install_certificates().await;
        }

        let renewal_due = match self.store.lookup_certificate(&self.config.hostname) {
            Ok((cert, _)) => mtls::is_expired(&cert).map_err(|e| {
                OpError::new(Operation::Update, Subject::Service, e.to_string())
            })?,
            Err(_) => true,
        };

        if renewal_due {
            self.install_certificates().await?;
        }
        Ok(())
    }

    async fn update_compose(&self) -> Result<(), OpError> {
        self.copy_compose_file().await?;
        self.run(&format!(
            "sudo docker compose --file {}/docker-compose.yaml pull --policy missing",
            self.lib_dir()
        ))
        .await?;
        self.compose_up().await?;
        self.compose_ready().await?;
        self.run("sudo docker image prune --force").await?;
        Ok(())
    }
}
