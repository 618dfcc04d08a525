//! SSH backend — authenticated session over ssh2, staged uploads.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ssh2::Session;

use crate::output::SharedReporter;
use crate::target::{HostSpec, Target, TargetError};

/// Executes on a remote host over an authenticated SSH session.
///
/// Authentication uses a running SSH agent when `SSH_AUTH_SOCK` is set and
/// falls back to an interactive password prompt. Host keys are not checked;
/// the session trusts the host on first connect.
pub struct RemoteTarget {
    host: String,
    user: String,
    session: Session,
    /// Cloned stream handle, kept to force-close a hung transfer.
    tcp: TcpStream,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
}

impl RemoteTarget {
    /// Establish and authenticate the session for this invocation.
    ///
    /// # Errors
    ///
    /// Returns an error when the TCP connection, handshake or authentication
    /// fails.
    pub async fn connect(
        spec: HostSpec,
        reporter: SharedReporter,
        dry_run: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let host = spec.host.clone();
        let port = spec.port;
        let op_timeout = timeout;
        let (session, tcp) =
            tokio::task::spawn_blocking(move || handshake(&host, port, op_timeout))
                .await
                .context("SSH handshake task failed")??;

        authenticate(&session, &spec.user, &spec.host).await?;

        Ok(Self {
            host: spec.host,
            user: spec.user,
            session,
            tcp,
            reporter,
            dry_run,
            timeout,
        })
    }

    /// Execute a command over a fresh channel, off the async runtime.
    async fn exec(&self, command: &str) -> Result<Vec<u8>, TargetError> {
        let session = self.session.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || exec_blocking(&session, &command))
            .await
            .map_err(|e| TargetError::other(format!("exec task failed: {e}")))?
    }

    async fn copy_staged(
        &self,
        src: &Path,
        dest: &str,
        mode: Option<&str>,
        owner: Option<&str>,
        staging_dir: &str,
    ) -> Result<(), TargetError> {
        let staged = format!("{staging_dir}/file");
        self.upload(src, &staged).await?;

        self.exec(&format!("sudo mv {staged} {dest}")).await?;

        if let Some(mode) = mode {
            self.exec(&format!("sudo chmod {mode} {dest}")).await?;
        }
        if let Some(owner) = owner {
            self.exec(&format!("sudo chown {owner} {dest}")).await?;
        }

        Ok(())
    }

    /// SFTP upload raced against the operation timeout. A hung transfer is
    /// aborted by shutting the underlying stream down, so the session fails
    /// fast instead of blocking forever.
    async fn upload(&self, src: &Path, remote_path: &str) -> Result<(), TargetError> {
        let session = self.session.clone();
        let src = src.to_path_buf();
        let remote_path = remote_path.to_string();
        let transfer =
            tokio::task::spawn_blocking(move || upload_blocking(&session, &src, &remote_path));

        tokio::select! {
            result = transfer => {
                result.map_err(|e| TargetError::other(format!("upload task failed: {e}")))?
            }
            () = tokio::time::sleep(self.timeout) => {
                let _ = self.tcp.shutdown(std::net::Shutdown::Both);
                Err(TargetError::timeout(self.timeout.as_secs(), Vec::new()))
            }
        }
    }
}

impl Target for RemoteTarget {
    async fn run(&self, command: &str) -> Result<Vec<u8>, TargetError> {
        self.reporter.notify(&format!(
            "Running '{command}' as {}@{}",
            self.user, self.host
        ));
        if self.dry_run {
            return Ok(Vec::new());
        }

        self.exec(command).await
    }

    async fn copy(
        &self,
        src: &Path,
        dest: &str,
        mode: Option<&str>,
        owner: Option<&str>,
    ) -> Result<(), TargetError> {
        self.reporter.notify(&format!(
            "Copying from '{}' to '{dest}' as {}@{}",
            src.display(),
            self.user,
            self.host
        ));
        if self.dry_run {
            return Ok(());
        }

        let raw = self.exec("mktemp -p /tmp -d finch-XXXXXX").await?;
        let staging_dir = String::from_utf8_lossy(&raw).trim().to_string();
        if staging_dir.is_empty() {
            return Err(TargetError::other("mktemp returned no staging directory"));
        }

        let result = self.copy_staged(src, dest, mode, owner, &staging_dir).await;

        // Staging directories never outlive the copy; cleanup failures are
        // swallowed (the session may already be closed after a timeout).
        let _ = self.exec(&format!("rm -rf {staging_dir}")).await;

        result
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

fn handshake(host: &str, port: u16, timeout: Duration) -> Result<(Session, TcpStream)> {
    let tcp = TcpStream::connect((host, port))
        .with_context(|| format!("failed to connect to {host}:{port}"))?;
    let handle = tcp.try_clone().context("failed to clone connection handle")?;

    let mut session = Session::new().context("failed to create SSH session")?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.handshake().context("SSH handshake failed")?;

    Ok((session, handle))
}

async fn authenticate(session: &Session, user: &str, host: &str) -> Result<()> {
    if std::env::var_os("SSH_AUTH_SOCK").is_some() {
        let s = session.clone();
        let user = user.to_string();
        tokio::task::spawn_blocking(move || s.userauth_agent(&user))
            .await
            .context("SSH agent task failed")?
            .context("SSH agent authentication failed")?;
    } else {
        let password = dialoguer::Password::new()
            .with_prompt(format!("{user}@{host}'s password"))
            .interact()
            .context("failed to read SSH password")?;
        let s = session.clone();
        let user = user.to_string();
        tokio::task::spawn_blocking(move || s.userauth_password(&user, &password))
            .await
            .context("SSH password task failed")?
            .context("SSH password authentication failed")?;
    }

    anyhow::ensure!(session.authenticated(), "SSH authentication failed");
    Ok(())
}

fn exec_blocking(session: &Session, command: &str) -> Result<Vec<u8>, TargetError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| TargetError::other(format!("failed to open SSH channel: {e}")))?;
    channel
        .exec(command)
        .map_err(|e| TargetError::other(format!("failed to exec command: {e}")))?;

    let mut output = Vec::new();
    let _ = channel.read_to_end(&mut output);
    let mut stderr = Vec::new();
    let _ = channel.stderr().read_to_end(&mut stderr);
    output.extend_from_slice(&stderr);

    let _ = channel.wait_close();
    let exit = channel.exit_status().unwrap_or(-1);
    if exit == 0 {
        Ok(output)
    } else {
        Err(TargetError::command(
            format!("command exited with status {exit}"),
            output,
        ))
    }
}

fn upload_blocking(session: &Session, src: &Path, remote_path: &str) -> Result<(), TargetError> {
    let mut local = std::fs::File::open(src)
        .map_err(|e| TargetError::other(format!("failed to open {}: {e}", src.display())))?;
    let sftp = session
        .sftp()
        .map_err(|e| TargetError::other(format!("SFTP unavailable: {e}")))?;
    let mut remote = sftp
        .create(Path::new(remote_path))
        .map_err(|e| TargetError::other(format!("failed to create {remote_path}: {e}")))?;
    std::io::copy(&mut local, &mut remote)
        .map_err(|e| TargetError::other(format!("upload failed: {e}")))?;
    Ok(())
}
