//! Agent deploy sequence.

use crate::errors::{OpError, Operation, Subject};
use crate::machine;
use crate::target::Target;

use super::{Agent, ReleaseSource};

/// Directories the collector needs on the target.
const AGENT_DIRECTORIES: [&str; 2] = ["/var/lib/alloy/data", "/etc/alloy"];

/// Installed collector configuration path.
pub(crate) const AGENT_CONFIG_PATH: &str = "/etc/alloy/alloy.config";

impl<T: Target, S: ReleaseSource> Agent<T, S> {
    pub(super) async fn deploy_inner(&self) -> Result<(), OpError> {
        self.check_requirements().await?;
        let machine = machine::profile(&self.target).await?;

        self.make_directories().await?;
        self.copy_config().await?;
        self.install_release(&machine, &self.version).await?;
        self.install_supervisor(machine.kernel).await?;
        self.verify_service(machine.kernel).await?;

        Ok(())
    }

    pub(crate) async fn make_directories(&self) -> Result<(), OpError> {
        for dir in AGENT_DIRECTORIES {
            self.run(&format!("sudo mkdir -p {dir}")).await?;
        }
        Ok(())
    }

    pub(crate) async fn copy_config(&self) -> Result<(), OpError> {
        self.target
            .copy(
                &self.config_path,
                AGENT_CONFIG_PATH,
                Some("400"),
                Some("root:root"),
            )
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Agent, &e))
    }
}
