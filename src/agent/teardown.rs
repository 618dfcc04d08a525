//! Agent teardown sequence.

use crate::errors::OpError;
use crate::machine;
use crate::target::Target;

use super::{Agent, ReleaseSource};

impl<T: Target, S: ReleaseSource> Agent<T, S> {
    pub(super) async fn teardown_inner(&self) -> Result<(), OpError> {
        self.check_requirements().await?;
        let machine = machine::profile(&self.target).await?;

        self.teardown_supervisor(machine.kernel).await?;

        self.run("sudo rm -rf /etc/alloy").await?;
        self.run("sudo rm -rf /var/lib/alloy").await?;
        self.run(&format!("sudo rm -f {}", machine.binary_path()))
            .await?;

        Ok(())
    }
}
