//! The identity document — `finch.json` on a deployed service host.
//!
//! Written once at deploy time and treated as the single source of truth for
//! hostname, credentials and secret during every later operation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::service::hex_sha256;

/// Stack credentials embedded in the identity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The on-target identity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub created_at: String,
    pub id: String,
    pub database: String,
    pub secret: String,
    pub hostname: String,
    pub version: String,
    pub credentials: Credentials,
}

impl Identity {
    /// Build a fresh document for a new deployment.
    #[must_use]
    pub fn new(hostname: &str, username: &str, password: &str) -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            id: stack_id(hostname),
            database: "sqlite://finch.db".to_string(),
            secret: generate_secret(),
            hostname: hostname.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            credentials: Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }
}

/// Deterministic stack identifier: first 16 hex characters of the hostname's
/// SHA-256 digest.
#[must_use]
pub fn stack_id(hostname: &str) -> String {
    hex_sha256(hostname)[..16].to_string()
}

/// Fresh random 256-bit secret, base64-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}
