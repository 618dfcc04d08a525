//! Test doubles — recording reporter, scripted target, scripted release
//! source.

use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};

use finchctl::agent::ReleaseSource;
use finchctl::output::ProgressReporter;
use finchctl::target::{Target, TargetError};

/// Collects every progress notification for later assertions.
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("reporter lock").clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn notify(&self, message: &str) {
        self.lines
            .lock()
            .expect("reporter lock")
            .push(message.to_string());
    }
}

/// Canned response for one command prefix.
enum Response {
    Output(Vec<u8>),
    Failure(String),
}

/// Target double returning scripted outputs and recording every operation.
///
/// Commands are matched by prefix in registration order; unscripted commands
/// succeed with empty output. Copies read the staged source file so tests can
/// inspect what would have landed on the target.
pub struct ScriptedTarget {
    user: String,
    host: String,
    responses: Vec<(String, Response)>,
    commands: Arc<Mutex<Vec<String>>>,
    copies: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl ScriptedTarget {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
            responses: Vec::new(),
            commands: Arc::new(Mutex::new(Vec::new())),
            copies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn respond(mut self, command_prefix: &str, output: &[u8]) -> Self {
        self.responses
            .push((command_prefix.to_string(), Response::Output(output.to_vec())));
        self
    }

    pub fn fail(mut self, command_prefix: &str, message: &str) -> Self {
        self.responses.push((
            command_prefix.to_string(),
            Response::Failure(message.to_string()),
        ));
        self
    }

    /// Shared view of every command run so far.
    pub fn commands_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.commands.clone()
    }

    /// Shared view of every copy (destination, staged content) so far.
    pub fn copies_handle(&self) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
        self.copies.clone()
    }
}

impl Target for ScriptedTarget {
    async fn run(&self, command: &str) -> Result<Vec<u8>, TargetError> {
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_string());
        for (prefix, response) in &self.responses {
            if command.starts_with(prefix.as_str()) {
                return match response {
                    Response::Output(output) => Ok(output.clone()),
                    Response::Failure(message) => {
                        Err(TargetError::command(message.clone(), Vec::new()))
                    }
                };
            }
        }
        Ok(Vec::new())
    }

    async fn copy(
        &self,
        src: &Path,
        dest: &str,
        _mode: Option<&str>,
        _owner: Option<&str>,
    ) -> Result<(), TargetError> {
        let content = std::fs::read(src).unwrap_or_default();
        self.copies
            .lock()
            .expect("copies lock")
            .push((dest.to_string(), content));
        Ok(())
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Release source returning a fabricated latest tag and archive.
pub struct ScriptedReleaseSource {
    latest: String,
    archive: Vec<u8>,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl ScriptedReleaseSource {
    pub fn new(latest: &str, archive: Vec<u8>) -> Self {
        Self {
            latest: latest.to_string(),
            archive,
            fetches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of every fetched URL.
    pub fn fetches_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.fetches.clone()
    }
}

impl ReleaseSource for ScriptedReleaseSource {
    async fn resolve_latest(&self) -> anyhow::Result<String> {
        Ok(self.latest.clone())
    }

    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        self.fetches
            .lock()
            .expect("fetches lock")
            .push(url.to_string());
        std::fs::write(dest, &self.archive)?;
        Ok(())
    }
}

/// Build a single-entry zip archive like a published collector release.
pub fn release_zip(entry_name: &str, content: &[u8]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file(entry_name, zip::write::SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}

/// A syntactically valid identity document for a deployed stack.
pub fn identity_json(hostname: &str) -> Vec<u8> {
    serde_json::to_vec_pretty(&serde_json::json!({
        "created_at": "2026-08-01T12:00:00+00:00",
        "id": "0123456789abcdef",
        "database": "sqlite://finch.db",
        "secret": "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0ISEhISE=",
        "hostname": hostname,
        "version": "0.4.0",
        "credentials": { "username": "finch", "password": "s3cret" }
    }))
    .expect("identity json")
}
