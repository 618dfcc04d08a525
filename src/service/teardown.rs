//! Service teardown sequence.

use crate::errors::{OpError, Operation, Subject};
use crate::target::Target;

use super::Service;

impl<T: Target> Service<T> {
    pub(super) async fn teardown_inner(&mut self) -> Result<(), OpError> {
        self.read_identity().await?;

        if !self.dry_run {
            self.store.remove(&self.config.hostname).map_err(|e| {
                OpError::new(Operation::Teardown, Subject::Service, e.to_string())
            })?;
        }

        self.run(&format!(
            "sudo docker compose --file {}/docker-compose.yaml down --volumes",
            self.lib_dir()
        ))
        .await?;
        self.run(&format!("sudo rm -rf {}", self.lib_dir())).await?;

        Ok(())
    }
}
