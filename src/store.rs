//! Credential store — per-user flat file tracking registered stacks.
//!
//! `~/.finch/config.json` holds one entry per stack hostname, carrying either
//! a base64 `user:pass` token or a client certificate/key PEM pair. Every
//! mutation is read-modify-backup-write: the previous file is copied to a
//! `~`-suffixed backup before the new content lands. There is no locking;
//! concurrent invocations against the same store are undefined behavior.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    stacks: Vec<StackEntry>,
}

/// One registered stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// File-backed store keyed by stack hostname.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at the default location: `$FINCH_CONFIG/config.json` when the
    /// environment variable names a directory, else `~/.finch/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var("FINCH_CONFIG") {
            return Ok(Self::with_path(PathBuf::from(dir).join("config.json")));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_path(home.join(".finch").join("config.json")))
    }

    /// Store at an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` when an entry for `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read()
            .map(|file| file.stacks.iter().any(|s| s.name == name))
            .unwrap_or(false)
    }

    /// Hostnames of all registered stacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store file exists but cannot be read or parsed.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.read()?.stacks.into_iter().map(|s| s.name).collect())
    }

    /// Store a basic-auth token for `name`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error, embedding the store path, if the store cannot be
    /// read or written.
    pub fn update_auth(&self, name: &str, username: &str, password: &str) -> Result<()> {
        let token = encode_token(username, password);
        self.upsert(name, |entry| entry.token = Some(token))
    }

    /// Decode the stored basic-auth token for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry or its token is missing or malformed.
    pub fn lookup_auth(&self, name: &str) -> Result<(String, String)> {
        let entry = self.lookup(name)?;
        let token = entry
            .token
            .ok_or_else(|| anyhow::anyhow!("stack {name} has no auth token"))?;
        decode_token(&token)
    }

    /// Store a client certificate/key pair for `name`, replacing any existing
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns an error, embedding the store path, if the store cannot be
    /// read or written.
    pub fn update_certificate(&self, name: &str, cert_pem: &str, key_pem: &str) -> Result<()> {
        let (cert, key) = (cert_pem.to_string(), key_pem.to_string());
        self.upsert(name, |entry| {
            entry.cert = Some(cert);
            entry.key = Some(key);
        })
    }

    /// The stored certificate/key pair for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry or its certificate material is missing.
    pub fn lookup_certificate(&self, name: &str) -> Result<(String, String)> {
        let entry = self.lookup(name)?;
        match (entry.cert, entry.key) {
            (Some(cert), Some(key)) => Ok((cert, key)),
            _ => anyhow::bail!("stack {name} has no certificate material"),
        }
    }

    /// Remove the entry for `name`. Removing an absent entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error, embedding the store path, if the store file is
    /// missing entirely or cannot be written.
    pub fn remove(&self, name: &str) -> Result<()> {
        anyhow::ensure!(
            self.path.exists(),
            "credential store {} does not exist",
            self.path.display()
        );
        let mut file = self.read()?;
        file.stacks.retain(|s| s.name != name);
        self.write(&file)
    }

    fn lookup(&self, name: &str) -> Result<StackEntry> {
        self.read()?
            .stacks
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow::anyhow!("stack not found: {name}"))
    }

    /// Apply a field update to the entry for `name`, creating it if absent.
    /// Entries hold a token and certificate material independently, so a
    /// stack can carry both across one generation.
    fn upsert(&self, name: &str, apply: impl FnOnce(&mut StackEntry)) -> Result<()> {
        let mut file = self.read()?;
        let entry = match file.stacks.iter_mut().find(|s| s.name == name) {
            Some(entry) => entry,
            None => {
                file.stacks.push(StackEntry {
                    name: name.to_string(),
                    token: None,
                    cert: None,
                    key: None,
                });
                file.stacks.last_mut().ok_or_else(|| {
                    anyhow::anyhow!("credential store entry vanished during update")
                })?
            }
        };
        apply(entry);
        self.write(&file)
    }

    fn read(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading credential store {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing credential store {}", self.path.display()))
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        if self.path.exists() {
            let backup = backup_path(&self.path);
            std::fs::copy(&self.path, &backup)
                .with_context(|| format!("backing up credential store {}", self.path.display()))?;
        }

        let content = serde_json::to_string_pretty(file).context("serializing credential store")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing credential store {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", self.path.display()))?;
        }
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push('~');
    path.with_file_name(name)
}

fn encode_token(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}

fn decode_token(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD.decode(token).context("invalid auth token")?;
    let decoded = String::from_utf8(decoded).context("invalid auth token")?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid token format"))?;
    Ok((username.to_string(), password.to_string()))
}
