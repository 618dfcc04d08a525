//! Deployed-stack identity summary.

use serde::Serialize;

use crate::errors::OpError;
use crate::target::Target;

use super::Service;

/// Identity summary reported by `service info`.
#[derive(Debug, Clone, Serialize)]
pub struct InfoData {
    pub id: String,
    pub hostname: String,
    pub created_at: String,
    pub version: String,
}

impl<T: Target> Service<T> {
    pub(super) async fn info_inner(&mut self) -> Result<Option<InfoData>, OpError> {
        let document = self.read_identity_document().await?;
        if self.dry_run {
            return Ok(None);
        }
        Ok(Some(InfoData {
            id: document.id,
            hostname: document.hostname,
            created_at: document.created_at,
            version: document.version,
        }))
    }
}
