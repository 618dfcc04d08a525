//! Agent update sequence — version-gated reinstall.

use crate::errors::OpError;
use crate::machine;
use crate::target::Target;

use super::{Agent, ReleaseSource, VersionSpec};

/// Step toggles for the update sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateOptions {
    /// Leave the installed collector configuration untouched.
    pub skip_config: bool,
    /// Leave the installed binary untouched, even when outdated.
    pub skip_install: bool,
}

impl<T: Target, S: ReleaseSource> Agent<T, S> {
    pub(super) async fn update_inner(&self, opts: &UpdateOptions) -> Result<(), OpError> {
        self.check_requirements().await?;
        let machine = machine::profile(&self.target).await?;

        if !opts.skip_config {
            self.copy_config().await?;
        }

        if !opts.skip_install {
            if self.dry_run {
                // No version to compare against; walk the install path so the
                // reported steps match a real reinstall.
                self.install_release(&machine, &self.version).await?;
            } else {
                let desired = self.resolve_version().await?;
                let installed = self.installed_version().await?;
                // The only idempotence check in the system: plain string
                // equality of version tags, never semantic comparison.
                if installed != desired {
                    self.install_release(&machine, &VersionSpec::Pinned(desired))
                        .await?;
                }
            }
        }

        self.restart_service(machine.kernel).await?;
        Ok(())
    }
}
