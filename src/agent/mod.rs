//! Collector agent lifecycle — deploy, update and teardown of a single
//! Alloy binary supervised by the host init system.

pub mod assets;
mod deploy;
pub mod release;
mod supervise;
mod teardown;
mod update;

use std::path::PathBuf;

use crate::errors::{OpError, Operation, Subject};
use crate::output::SharedReporter;
use crate::target::Target;

pub use release::{GithubReleaseSource, ReleaseSource, VersionSpec};
pub use update::UpdateOptions;

/// Orchestrates agent operations against one target.
pub struct Agent<T: Target, S: ReleaseSource> {
    target: T,
    config_path: PathBuf,
    version: VersionSpec,
    source: S,
    reporter: SharedReporter,
    dry_run: bool,
}

impl<T: Target> Agent<T, GithubReleaseSource> {
    /// Production constructor, fetching releases from the Grafana Alloy
    /// GitHub project.
    #[must_use]
    pub fn new(
        target: T,
        config_path: PathBuf,
        version: VersionSpec,
        reporter: SharedReporter,
        dry_run: bool,
    ) -> Self {
        Self::with_release_source(
            target,
            config_path,
            version,
            GithubReleaseSource::new(),
            reporter,
            dry_run,
        )
    }
}

impl<T: Target, S: ReleaseSource> Agent<T, S> {
    /// Constructor with an explicit release source (used in tests).
    #[must_use]
    pub fn with_release_source(
        target: T,
        config_path: PathBuf,
        version: VersionSpec,
        source: S,
        reporter: SharedReporter,
        dry_run: bool,
    ) -> Self {
        Self {
            target,
            config_path,
            version,
            source,
            reporter,
            dry_run,
        }
    }

    /// Deploy the collector: requirements, profiling, directories, config,
    /// release install, supervisor unit, readiness verification.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, deploy-tagged.
    pub async fn deploy(&self) -> Result<(), OpError> {
        let result = self.deploy_inner().await;
        self.reporter.finish();
        result
    }

    /// Update the collector configuration and, when the installed version
    /// differs from the desired one, reinstall the binary. Always restarts
    /// the service.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, update-tagged.
    pub async fn update(&self, opts: &UpdateOptions) -> Result<(), OpError> {
        let result = self
            .update_inner(opts)
            .await
            .map_err(|e| e.retag(Operation::Update));
        self.reporter.finish();
        result
    }

    /// Remove the collector service, its data and configuration directories,
    /// and the installed binary.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, teardown-tagged.
    pub async fn teardown(&self) -> Result<(), OpError> {
        let result = self
            .teardown_inner()
            .await
            .map_err(|e| e.retag(Operation::Teardown));
        self.reporter.finish();
        result
    }

    /// Verify privilege escalation is present and usable on the target.
    async fn check_requirements(&self) -> Result<(), OpError> {
        if let Err(e) = self.target.run("command -v sudo").await {
            return Err(
                OpError::new(Operation::Deploy, Subject::Agent, "sudo is not installed")
                    .with_reason(e.to_string()),
            );
        }
        if let Err(e) = self.target.run("sudo -n true").await {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Agent,
                "user has no sudo permission",
            )
            .with_reason(e.to_string()));
        }
        Ok(())
    }

    /// Run a fatal command step.
    async fn run(&self, command: &str) -> Result<Vec<u8>, OpError> {
        self.target
            .run(command)
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Agent, &e))
    }

    /// Run a step whose failure is tolerated — "already in desired state"
    /// commands like stopping a stopped service.
    async fn run_best_effort(&self, command: &str) {
        let _ = self.target.run(command).await;
    }

    /// Report a step that executes on the operator machine rather than the
    /// target (downloads, archive unpacking).
    fn notify_local(&self, message: &str) {
        self.reporter
            .notify(&format!("{message} as {}@localhost", self.target.user()));
    }
}
