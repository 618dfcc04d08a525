//! Local-process backend — runs commands through a subprocess shell.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use crate::output::SharedReporter;
use crate::target::{HostSpec, Target, TargetError};

/// Executes on the invoking machine as the current user.
pub struct LocalTarget {
    host: String,
    user: String,
    reporter: SharedReporter,
    dry_run: bool,
    timeout: Duration,
}

impl LocalTarget {
    #[must_use]
    pub fn new(spec: HostSpec, reporter: SharedReporter, dry_run: bool, timeout: Duration) -> Self {
        Self {
            host: spec.host,
            user: spec.user,
            reporter,
            dry_run,
            timeout,
        }
    }

    /// Run a program with arguments under the operation timeout, killing the
    /// child when the timeout fires. Combined stdout+stderr is returned and
    /// both pipes are drained concurrently with `wait()` so a chatty child
    /// cannot deadlock on a full pipe buffer.
    async fn exec(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, TargetError> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TargetError::other(format!("failed to spawn {program}: {e}")))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let status = status
                    .map_err(|e| TargetError::other(format!("waiting for {program}: {e}")))?;
                let mut output = stdout;
                output.extend_from_slice(&stderr);
                if status.success() {
                    Ok(output)
                } else {
                    let code = status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string());
                    Err(TargetError::command(
                        format!("command exited with status {code}"),
                        output,
                    ))
                }
            } => result,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                Err(TargetError::timeout(self.timeout.as_secs(), Vec::new()))
            }
        }
    }
}

impl Target for LocalTarget {
    async fn run(&self, command: &str) -> Result<Vec<u8>, TargetError> {
        self.reporter.notify(&format!(
            "Running '{command}' as {}@{}",
            self.user, self.host
        ));
        if self.dry_run {
            return Ok(Vec::new());
        }

        self.exec("sh", &["-c", command]).await
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

        let src = src
            .to_str()
            .ok_or_else(|| TargetError::other(format!("non-UTF-8 source path: {src:?}")))?;
        self.exec("sudo", &["cp", src, dest]).await?;

        if let Some(mode) = mode {
            self.exec("sudo", &["chmod", mode, dest]).await?;
        }
        if let Some(owner) = owner {
            self.exec("sudo", &["chown", owner, dest]).await?;
        }

        Ok(())
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
