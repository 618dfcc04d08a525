//! Service deploy sequence — Docker runtime, directory hierarchy, component
//! configuration, mTLS material, Compose bring-up and readiness.

use std::path::Path;

use crate::errors::{OpError, Operation, Subject};
use crate::mtls;
use crate::service::assets;
use crate::target::Target;

use super::{Identity, READY_INTERVAL, READY_TIMEOUT, Service};

/// Readiness probe run on the target; prints the front door's HTTP status.
const READY_PROBE: &str = r#"curl -s -o /dev/null -w "%{http_code}" http://localhost"#;

/// Component subtrees under the service library root.
const SERVICE_DIRECTORIES: [&str; 6] = [
    "grafana/dashboards",
    "loki/{data,etc}",
    "alloy/{data,etc}",
    "traefik/etc/{certs.d,conf.d}",
    "mimir/{data,etc}",
    "pyroscope/data",
];

/// Per-component ownership, matching each container's runtime UID:GID.
const SERVICE_OWNERSHIP: [(&str, &str); 6] = [
    ("grafana", "472:472"),
    ("loki", "10001:10001"),
    ("alloy", "0:0"),
    ("traefik", "0:0"),
    ("mimir", "10001:10001"),
    ("pyroscope", "10001:10001"),
];

const DASHBOARDS: [&str; 5] = [
    "grafana-dashboard-logs-docker.json",
    "grafana-dashboard-logs-journal.json",
    "grafana-dashboard-logs-file.json",
    "grafana-dashboard-metrics.json",
    "grafana-dashboard-profiles-finch.json",
];

impl<T: Target> Service<T> {
    pub(super) async fn deploy_inner(&self) -> Result<(), OpError> {
        self.check_requirements().await?;
        self.setup_docker().await?;
        self.setup_persistence().await?;
        self.setup_configs().await?;
        self.install_certificates().await?;
        self.setup_compose().await?;

        if !self.dry_run {
            self.store
                .update_auth(
                    &self.config.hostname,
                    &self.config.username,
                    &self.config.password,
                )
                .map_err(|e| {
                    OpError::new(Operation::Deploy, Subject::Service, e.to_string())
                })?;
        }

        Ok(())
    }

    // ── Docker runtime ────────────────────────────────────────────────────

    pub(crate) async fn setup_docker(&self) -> Result<(), OpError> {
        if self.target.run("sudo docker -v").await.is_err() {
            self.install_docker().await?;
        }

        if self.target.run("sudo docker version").await.is_err() {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Service,
                "Docker is not running",
            ));
        }
        if self.target.run("sudo docker compose version").await.is_err() {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Service,
                "Docker Compose is not available",
            ));
        }

        self.copy_asset("/etc/docker/daemon.json", "400", "0:0").await?;
        self.run("sudo systemctl restart docker").await?;
        Ok(())
    }

    async fn install_docker(&self) -> Result<(), OpError> {
        let raw = self.run("mktemp -p /tmp -d finch-XXXXXX").await?;
        let dir = String::from_utf8_lossy(&raw).trim().to_string();

        let result = self.install_docker_staged(&dir).await;
        let _ = self.target.run(&format!("rm -rf {dir}")).await;
        result
    }

    async fn install_docker_staged(&self, dir: &str) -> Result<(), OpError> {
        self.run(&format!(
            "curl -fsSL https://get.docker.com -o {dir}/get-docker.sh"
        ))
        .await?;
        self.run(&format!("sudo sh {dir}/get-docker.sh")).await?;
        Ok(())
    }

    // ── Directory hierarchy ───────────────────────────────────────────────

    pub(crate) async fn setup_persistence(&self) -> Result<(), OpError> {
        for dir in SERVICE_DIRECTORIES {
            self.run(&format!("sudo mkdir -p {}/{dir}", self.lib_dir()))
                .await?;
        }
        for (component, owner) in SERVICE_OWNERSHIP {
            self.run(&format!(
                "sudo chown -R {owner} {}/{component}",
                self.lib_dir()
            ))
            .await?;
        }
        Ok(())
    }

    // ── Component configuration ───────────────────────────────────────────

    async fn setup_configs(&self) -> Result<(), OpError> {
        self.copy_loki_config().await?;
        self.copy_loki_users().await?;
        self.copy_traefik_config().await?;
        self.copy_traefik_http_config().await?;
        self.copy_traefik_tls_config().await?;
        self.copy_alloy_config().await?;
        self.copy_dashboards().await?;
        self.copy_identity().await?;
        self.copy_mimir_config().await?;
        Ok(())
    }

    pub(crate) async fn copy_loki_config(&self) -> Result<(), OpError> {
        let path = format!("{}/loki/etc/loki.yaml", self.lib_dir());
        self.copy_asset(&path, "400", "10001:10001").await
    }

    async fn copy_loki_users(&self) -> Result<(), OpError> {
        let path = format!("{}/traefik/etc/conf.d/loki-users.yaml", self.lib_dir());
        let hash = bcrypt::hash(&self.config.password, bcrypt::DEFAULT_COST)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        self.copy_template(
            &path,
            "400",
            "0:0",
            &[
                ("username", self.config.username.as_str()),
                ("password_hash", hash.as_str()),
            ],
        )
        .await
    }

    async fn copy_traefik_config(&self) -> Result<(), OpError> {
        let path = format!("{}/traefik/etc/traefik.yaml", self.lib_dir());
        let email = if self.config.letsencrypt.email.is_empty() {
            "acme@example.com"
        } else {
            self.config.letsencrypt.email.as_str()
        };
        self.copy_template(&path, "400", "0:0", &[("acme_email", email)])
            .await
    }

    pub(crate) async fn copy_traefik_http_config(&self) -> Result<(), OpError> {
        let path = format!("{}/traefik/etc/conf.d/http.yaml", self.lib_dir());
        let host_rule = if self.config.letsencrypt.enabled {
            format!("&& Host(`{}`)", self.config.hostname)
        } else {
            String::new()
        };
        self.copy_template(&path, "400", "0:0", &[("host_rule", host_rule.as_str())])
            .await
    }

    async fn copy_traefik_tls_config(&self) -> Result<(), OpError> {
        if self.config.letsencrypt.enabled {
            let path = format!("{}/traefik/etc/conf.d/letsencrypt.yaml", self.lib_dir());
            self.copy_template(
                &path,
                "400",
                "0:0",
                &[("hostname", self.config.hostname.as_str())],
            )
            .await?;
        }

        if self.config.custom_tls.enabled {
            let pairs = [
                ("cert", self.config.custom_tls.cert_file.clone()),
                ("key", self.config.custom_tls.key_file.clone()),
            ];
            for (kind, local_path) in pairs {
                let dest = format!("{}/traefik/etc/certs.d/{kind}.pem", self.lib_dir());
                self.copy_file(&local_path, &dest, "400", "0:0").await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn copy_alloy_config(&self) -> Result<(), OpError> {
        let path = format!("{}/alloy/etc/alloy.config", self.lib_dir());
        self.copy_template(
            &path,
            "400",
            "0:0",
            &[("hostname", self.config.hostname.as_str())],
        )
        .await
    }

    pub(crate) async fn copy_dashboards(&self) -> Result<(), OpError> {
        for dashboard in DASHBOARDS {
            let path = format!("{}/grafana/dashboards/{dashboard}", self.lib_dir());
            self.copy_asset(&path, "400", "472:472").await?;
        }
        Ok(())
    }

    async fn copy_identity(&self) -> Result<(), OpError> {
        let identity = Identity::new(
            &self.config.hostname,
            &self.config.username,
            &self.config.password,
        );
        self.write_identity(&identity).await
    }

    pub(crate) async fn write_identity(&self, identity: &Identity) -> Result<(), OpError> {
        let path = format!("{}/finch.json", self.lib_dir());
        let content = serde_json::to_string_pretty(identity)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        let staged = assets::stage_bytes(content.as_bytes())
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        self.copy_file(staged.path(), &path, "400", "10002:1002")
            .await
    }

    pub(crate) async fn copy_mimir_config(&self) -> Result<(), OpError> {
        let path = format!("{}/mimir/etc/mimir.yaml", self.lib_dir());
        self.copy_asset(&path, "400", "10001:10001").await
    }

    // ── mTLS material ─────────────────────────────────────────────────────

    /// Generate a CA + client pair for the stack, install the CA certificate
    /// into the Traefik trust directory and persist the client pair. The CA
    /// private key is dropped here and never leaves this function.
    pub(crate) async fn install_certificates(&self) -> Result<(), OpError> {
        let hostname = self.config.hostname.clone();
        let (ca_cert, ca_key) = mtls::generate_ca(&hostname)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        let (client_cert, client_key) = mtls::generate_client(&hostname, &ca_cert, &ca_key)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;

        let staged = assets::stage_bytes(ca_cert.as_bytes())
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        self.copy_file(staged.path(), &self.ca_artifact_path(), "400", "0:0")
            .await?;

        if !self.dry_run {
            self.store
                .update_certificate(&hostname, &client_cert, &client_key)
                .map_err(|e| {
                    OpError::new(Operation::Deploy, Subject::Service, e.to_string())
                })?;
        }

        Ok(())
    }

    // ── Compose ───────────────────────────────────────────────────────────

    async fn setup_compose(&self) -> Result<(), OpError> {
        self.copy_compose_file().await?;
        self.compose_up().await?;
        self.compose_ready().await?;
        Ok(())
    }

    pub(crate) async fn copy_compose_file(&self) -> Result<(), OpError> {
        let path = format!("{}/docker-compose.yaml", self.lib_dir());
        let root_url = format!("https://{}", self.config.hostname);
        self.copy_template(
            &path,
            "400",
            "root:root",
            &[
                ("root_url", root_url.as_str()),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ],
        )
        .await
    }

    pub(crate) async fn compose_up(&self) -> Result<(), OpError> {
        self.run(&format!(
            "sudo docker compose --file {}/docker-compose.yaml up --detach",
            self.lib_dir()
        ))
        .await?;
        Ok(())
    }

    /// Poll the stack's front door until it answers with any 2xx–4xx status,
    /// within the fixed budget. The system's only retry loop.
    pub(crate) async fn compose_ready(&self) -> Result<(), OpError> {
        let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
        loop {
            let probe = self.target.run(READY_PROBE).await;
            if self.dry_run {
                return Ok(());
            }
            if let Ok(out) = probe {
                if is_ready_status(String::from_utf8_lossy(&out).trim()) {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() + READY_INTERVAL > deadline {
                return Err(OpError::new(
                    Operation::Deploy,
                    Subject::Service,
                    format!(
                        "service did not become ready within {}s",
                        READY_TIMEOUT.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(READY_INTERVAL).await;
        }
    }

    // ── Copy helpers ──────────────────────────────────────────────────────

    /// Copy a verbatim embedded asset; the asset name is the destination's
    /// file name.
    async fn copy_asset(&self, dest: &str, mode: &str, owner: &str) -> Result<(), OpError> {
        let name = dest.rsplit('/').next().unwrap_or(dest);
        let staged = assets::stage_asset(name)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        self.copy_file(staged.path(), dest, mode, owner).await
    }

    /// Render the template named after the destination's file name and copy
    /// the result.
    async fn copy_template(
        &self,
        dest: &str,
        mode: &str,
        owner: &str,
        vars: &[(&str, &str)],
    ) -> Result<(), OpError> {
        let name = dest.rsplit('/').next().unwrap_or(dest);
        let staged = assets::stage_template(name, vars)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Service, e.to_string()))?;
        self.copy_file(staged.path(), dest, mode, owner).await
    }

    pub(crate) async fn copy_file(
        &self,
        src: &Path,
        dest: &str,
        mode: &str,
        owner: &str,
    ) -> Result<(), OpError> {
        self.target
            .copy(src, dest, Some(mode), Some(owner))
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Service, &e))
    }
}

/// A front door answering with any 2xx–4xx status counts as ready.
fn is_ready_status(code: &str) -> bool {
    code.parse::<u16>().is_ok_and(|c| (200..500).contains(&c))
}
