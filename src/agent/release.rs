//! Release acquisition — resolve, download and unpack collector archives.
//!
//! Archives follow the fixed naming convention `alloy-<kernel>-<arch>.zip`
//! and hold exactly one entry, the collector binary, named like the archive
//! stem.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::errors::{OpError, Operation, Subject};
use crate::machine::MachineInfo;
use crate::target::Target;

/// Base URL of the collector release project.
pub const RELEASE_BASE_URL: &str = "https://github.com/grafana/alloy/releases";

/// Release-metadata endpoint used to resolve the `latest` tag.
pub const RELEASE_API_URL: &str = "https://api.github.com/repos/grafana/alloy/releases/latest";

/// Desired collector version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Follow the newest published release.
    Latest,
    /// An explicit release tag, e.g. `v1.4.2`.
    Pinned(String),
}

/// Download URL for a release archive.
#[must_use]
pub fn download_url(version: &VersionSpec, release: &str) -> String {
    match version {
        VersionSpec::Latest => format!("{RELEASE_BASE_URL}/latest/download/{release}.zip"),
        VersionSpec::Pinned(tag) => format!("{RELEASE_BASE_URL}/download/{tag}/{release}.zip"),
    }
}

/// Where release archives and metadata come from. Swappable so tests can
/// fabricate versions and archives without a network.
#[allow(async_fn_in_trait)]
pub trait ReleaseSource {
    /// Resolve the tag of the newest published release.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata endpoint cannot be reached or has
    /// no tag.
    async fn resolve_latest(&self) -> Result<String>;

    /// Download the archive at `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error embedding the HTTP status on any non-success
    /// response.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Production source backed by the GitHub releases API.
pub struct GithubReleaseSource {
    client: reqwest::Client,
}

impl GithubReleaseSource {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("finchctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for GithubReleaseSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseSource for GithubReleaseSource {
    async fn resolve_latest(&self) -> Result<String> {
        let response = self
            .client
            .get(RELEASE_API_URL)
            .send()
            .await
            .context("failed to query release metadata")?;
        anyhow::ensure!(
            response.status().is_success(),
            "failed to query release metadata: {}",
            response.status()
        );
        let body: serde_json::Value = response
            .json()
            .await
            .context("failed to parse release metadata")?;
        body["tag_name"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("release metadata has no tag_name"))
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download {url}"))?;
        anyhow::ensure!(
            response.status().is_success(),
            "failed to download release: {}",
            response.status()
        );
        let bytes = response
            .bytes()
            .await
            .context("failed to read release archive")?;
        std::fs::write(dest, &bytes)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(())
    }
}

/// Extract the version tag from a `alloy --version` invocation, e.g.
/// `alloy, version v1.4.2 (branch: HEAD)` → `v1.4.2`.
#[must_use]
pub fn parse_installed_version(output: &str) -> Option<String> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    let marker = tokens
        .iter()
        .position(|t| t.trim_end_matches(':') == "version")?;
    tokens
        .get(marker + 1)
        .map(|t| t.trim_matches(',').to_string())
}

impl<T: Target, S: ReleaseSource> super::Agent<T, S> {
    /// Download, unpack and install the release matching `machine` onto the
    /// target.
    pub(crate) async fn install_release(
        &self,
        machine: &MachineInfo,
        version: &VersionSpec,
    ) -> Result<(), OpError> {
        let scratch = tempfile::tempdir().map_err(|e| {
            OpError::new(Operation::Deploy, Subject::Agent, e.to_string())
        })?;

        let release = machine.release_name();
        let archive = self.download_release(version, &release, scratch.path()).await?;
        let binary = self.unzip_release(&release, &archive)?;

        self.target
            .copy(&binary, machine.binary_path(), Some("755"), Some("root:root"))
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Agent, &e))
    }

    async fn download_release(
        &self,
        version: &VersionSpec,
        release: &str,
        scratch: &Path,
    ) -> Result<PathBuf, OpError> {
        let url = download_url(version, release);
        let archive = scratch.join(format!("{release}.zip"));

        self.notify_local(&format!("Downloading '{url}'"));
        if self.dry_run {
            return Ok(archive);
        }

        self.source
            .fetch(&url, &archive)
            .await
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Agent, e.to_string()))?;

        Ok(archive)
    }

    fn unzip_release(&self, release: &str, archive: &Path) -> Result<PathBuf, OpError> {
        let binary_path = archive.with_file_name(release);

        self.notify_local(&format!("Unzipping '{}'", archive.display()));
        if self.dry_run {
            return Ok(binary_path);
        }

        let file = std::fs::File::open(archive).map_err(|e| {
            OpError::new(Operation::Deploy, Subject::Agent, e.to_string())
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| {
            OpError::new(Operation::Deploy, Subject::Agent, e.to_string())
        })?;
        let mut entry = zip.by_name(release).map_err(|_| {
            OpError::new(
                Operation::Deploy,
                Subject::Agent,
                "release archive has no collector binary",
            )
            .with_reason(release)
        })?;

        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(|e| {
            OpError::new(Operation::Deploy, Subject::Agent, e.to_string())
        })?;
        if content.is_empty() {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Agent,
                "downloaded binary is empty",
            ));
        }

        std::fs::write(&binary_path, &content).map_err(|e| {
            OpError::new(Operation::Deploy, Subject::Agent, e.to_string())
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&binary_path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| OpError::new(Operation::Deploy, Subject::Agent, e.to_string()))?;
        }

        Ok(binary_path)
    }

    /// The version tag this update should converge on.
    pub(crate) async fn resolve_version(&self) -> Result<String, OpError> {
        match &self.version {
            VersionSpec::Pinned(tag) => Ok(tag.clone()),
            VersionSpec::Latest => self.source.resolve_latest().await.map_err(|e| {
                OpError::new(Operation::Update, Subject::Agent, e.to_string())
            }),
        }
    }

    /// The version tag the target's installed collector reports.
    pub(crate) async fn installed_version(&self) -> Result<String, OpError> {
        let out = self.run("alloy --version").await?;
        let text = String::from_utf8_lossy(&out);
        parse_installed_version(&text).ok_or_else(|| {
            OpError::new(
                Operation::Update,
                Subject::Agent,
                "could not determine installed collector version",
            )
            .with_reason(text.trim())
        })
    }
}
