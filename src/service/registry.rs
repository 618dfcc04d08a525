//! Stack registration and credential rotation.
//!
//! All four operations recover the stack identity from the target first and
//! guard on the credential store before touching any material.

use crate::errors::{OpError, Operation, Subject};
use crate::service::identity;
use crate::target::Target;

use super::Service;

impl<T: Target> Service<T> {
    pub(super) async fn register_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;

        if !self.dry_run && self.store.contains(&self.config.hostname) {
            return Err(OpError::new(
                Operation::Register,
                Subject::Service,
                "stack already registered",
            )
            .with_reason("use rotate-certificate to renew"));
        }

        self.install_certificates().await
    }

    pub(super) async fn deregister_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;

        if !self.dry_run && !self.store.contains(&self.config.hostname) {
            return Err(OpError::new(
                Operation::Deregister,
                Subject::Service,
                "stack not registered",
            )
            .with_reason(self.config.hostname.clone()));
        }

        self.run(&format!("sudo rm -f {}", self.ca_artifact_path()))
            .await?;

        if self.dry_run {
            return Ok(());
        }
        self.store.remove(&self.config.hostname).map_err(|e| {
            OpError::new(Operation::Deregister, Subject::Service, e.to_string())
        })
    }

    pub(super) async fn rotate_certificate_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;

        if !self.dry_run && !self.store.contains(&self.config.hostname) {
            return Err(OpError::new(
                Operation::RotateCertificate,
                Subject::Service,
                "stack not registered",
            )
            .with_reason("use register instead"));
        }

        self.install_certificates().await?;

        // The previous generation's CA kept the fixed legacy name.
        self.run(&format!(
            "sudo rm -f {}/traefik/etc/certs.d/ca.pem",
            self.lib_dir()
        ))
        .await?;

        Ok(())
    }

    pub(super) async fn rotate_secret_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;

        let mut document = self.read_identity_document().await?;
        document.secret = identity::generate_secret();
        self.write_identity(&document).await?;

        // Only the component holding the secret restarts.
        self.run(&format!(
            "sudo docker compose --file {}/docker-compose.yaml restart finch",
            self.lib_dir()
        ))
        .await?;

        Ok(())
    }
}
