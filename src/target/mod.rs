//! Execution targets — run commands and copy files on a local or remote host
//! through one contract.
//!
//! A target is bound at construction to a host identity and an execution mode
//! and lives for exactly one CLI invocation. Both backends report every
//! operation to the progress channel before executing it, and both return
//! empty output without touching the host in dry-run mode.

pub mod local;
pub mod remote;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::output::SharedReporter;

pub use local::LocalTarget;
pub use remote::RemoteTarget;

/// Hostnames that select the local-process backend.
pub const LOCAL_ALIASES: [&str; 4] = ["localhost", "local", "127.0.0.1", "::1"];

/// Default per-operation timeout.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(300);

/// Failure of a single target operation, carrying the combined command output
/// as diagnostic context. The target never retries; callers decide.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TargetError {
    message: String,
    output: Vec<u8>,
}

impl TargetError {
    #[must_use]
    pub fn command(message: impl Into<String>, output: Vec<u8>) -> Self {
        Self {
            message: message.into(),
            output,
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: Vec::new(),
        }
    }

    #[must_use]
    pub fn timeout(seconds: u64, output: Vec<u8>) -> Self {
        Self {
            message: format!("operation timed out after {seconds}s"),
            output,
        }
    }

    /// The partial or complete output captured before the failure.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

/// The execution contract both backends satisfy identically.
#[allow(async_fn_in_trait)]
pub trait Target {
    /// Execute one shell command as the bound user on the bound host.
    ///
    /// The progress channel is notified before execution, including in
    /// dry-run mode, where the command returns empty output without touching
    /// the host.
    ///
    /// # Errors
    ///
    /// Returns a [`TargetError`] with the combined output when the command
    /// exits non-zero, cannot be started, or exceeds the operation timeout.
    async fn run(&self, command: &str) -> Result<Vec<u8>, TargetError>;

    /// Transfer a local file to the target and apply `mode` and `owner` when
    /// given, each as a discrete privileged sub-step.
    ///
    /// The file lands fully or not at all; partial transfers never appear at
    /// `dest`.
    ///
    /// # Errors
    ///
    /// Returns a [`TargetError`] when the transfer, move, chmod or chown
    /// fails — a successful move followed by a failed mode/owner application
    /// still fails the copy.
    async fn copy(
        &self,
        src: &Path,
        dest: &str,
        mode: Option<&str>,
        owner: Option<&str>,
    ) -> Result<(), TargetError>;

    fn host(&self) -> &str;

    fn user(&self) -> &str;

    fn is_dry_run(&self) -> bool;
}

/// Host identity parsed from `[user@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub user: String,
    pub host: String,
    pub port: u16,
}

/// Parse `[user@]host[:port]`.
///
/// The user defaults to `$USER`, the port to 22. A host containing more than
/// one colon is taken as a bare IPv6 address; `[addr]:port` selects a port
/// for IPv6 hosts.
///
/// # Errors
///
/// Returns an error for an empty host or an unparsable port.
pub fn parse_host(spec: &str) -> Result<HostSpec> {
    let (user, rest) = match spec.split_once('@') {
        Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
        Some((_, rest)) => (default_user(), rest),
        None => (default_user(), spec),
    };

    let (host, port) = split_host_port(rest)?;
    anyhow::ensure!(!host.is_empty(), "invalid host: {spec:?}");

    Ok(HostSpec {
        user,
        host,
        port: port.unwrap_or(22),
    })
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

fn split_host_port(rest: &str) -> Result<(String, Option<u16>)> {
    if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .with_context(|| format!("invalid host: {rest:?}"))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().with_context(|| format!("invalid port: {p:?}"))?),
            None => None,
        };
        return Ok((host.to_string(), port));
    }

    // More than one colon without brackets: a bare IPv6 address, no port.
    if rest.matches(':').count() > 1 {
        return Ok((rest.to_string(), None));
    }

    match rest.split_once(':') {
        Some((host, p)) => {
            let port = p.parse().with_context(|| format!("invalid port: {p:?}"))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((rest.to_string(), None)),
    }
}

/// Returns `true` when `host` names the local machine.
#[must_use]
pub fn is_local_alias(host: &str) -> bool {
    LOCAL_ALIASES.contains(&host)
}

/// Production target, dispatching to the backend selected at construction.
pub enum AnyTarget {
    Local(LocalTarget),
    Remote(RemoteTarget),
}

impl Target for AnyTarget {
    async fn run(&self, command: &str) -> Result<Vec<u8>, TargetError> {
        match self {
            AnyTarget::Local(t) => t.run(command).await,
            AnyTarget::Remote(t) => t.run(command).await,
        }
    }

    async fn copy(
        &self,
        src: &Path,
        dest: &str,
        mode: Option<&str>,
        owner: Option<&str>,
    ) -> Result<(), TargetError> {
        match self {
            AnyTarget::Local(t) => t.copy(src, dest, mode, owner).await,
            AnyTarget::Remote(t) => t.copy(src, dest, mode, owner).await,
        }
    }

    fn host(&self) -> &str {
        match self {
            AnyTarget::Local(t) => t.host(),
            AnyTarget::Remote(t) => t.host(),
        }
    }

    fn user(&self) -> &str {
        match self {
            AnyTarget::Local(t) => t.user(),
            AnyTarget::Remote(t) => t.user(),
        }
    }

    fn is_dry_run(&self) -> bool {
        match self {
            AnyTarget::Local(t) => t.is_dry_run(),
            AnyTarget::Remote(t) => t.is_dry_run(),
        }
    }
}

/// Build the target for one CLI invocation.
///
/// Remote targets authenticate immediately, also in dry-run mode — dry-run
/// suppresses operations, not connectivity.
///
/// # Errors
///
/// Returns an error when the host spec is invalid or the SSH session cannot
/// be established and authenticated.
pub async fn connect(
    spec: &str,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
) -> Result<AnyTarget> {
    let host = parse_host(spec)?;
    if is_local_alias(&host.host) {
        Ok(AnyTarget::Local(LocalTarget::new(
            host, reporter, dry_run, timeout,
        )))
    } else {
        let remote = RemoteTarget::connect(host, reporter, dry_run, timeout).await?;
        Ok(AnyTarget::Remote(remote))
    }
}
