//! Per-kernel service supervision — one command set per supported init
//! system, selected once from the profiling result.

use crate::agent::assets;
use crate::errors::{OpError, Operation, Subject};
use crate::machine::Kernel;
use crate::target::Target;

use super::{Agent, ReleaseSource};

/// Launchd job label for the collector on Darwin targets.
pub const LAUNCHD_LABEL: &str = "io.finch.alloy";

impl<T: Target, S: ReleaseSource> Agent<T, S> {
    /// Install the supervisor unit file for `kernel` and enable the service.
    pub(crate) async fn install_supervisor(&self, kernel: Kernel) -> Result<(), OpError> {
        let (asset, dest, mode, owner) = match kernel {
            Kernel::Linux => (
                "alloy.service",
                "/etc/systemd/system/alloy.service",
                "444",
                "root:root",
            ),
            Kernel::Darwin => (
                "io.finch.alloy.plist",
                "/Library/LaunchDaemons/io.finch.alloy.plist",
                "644",
                "root:wheel",
            ),
            Kernel::Freebsd => ("alloy.rc", "/etc/rc.d/alloy", "755", "root:wheel"),
        };

        let staged = assets::stage_agent_asset(asset)
            .map_err(|e| OpError::new(Operation::Deploy, Subject::Agent, e.to_string()))?;
        self.target
            .copy(staged.path(), dest, Some(mode), Some(owner))
            .await
            .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Agent, &e))?;

        self.enable_service(kernel).await
    }

    async fn enable_service(&self, kernel: Kernel) -> Result<(), OpError> {
        match kernel {
            Kernel::Linux => {
                self.run("sudo systemctl enable --now alloy").await?;
            }
            Kernel::Darwin => {
                self.run(&format!(
                    "sudo launchctl bootstrap system /Library/LaunchDaemons/{LAUNCHD_LABEL}.plist"
                ))
                .await?;
            }
            Kernel::Freebsd => {
                self.run("sudo sysrc alloy_enable=YES").await?;
                self.run("sudo service alloy start").await?;
            }
        }
        Ok(())
    }

    /// Check the supervised service reports as running.
    pub(crate) async fn verify_service(&self, kernel: Kernel) -> Result<(), OpError> {
        let command = match kernel {
            Kernel::Linux => "sudo systemctl is-active alloy".to_string(),
            Kernel::Darwin => format!("sudo launchctl print system/{LAUNCHD_LABEL}"),
            Kernel::Freebsd => "sudo service alloy status".to_string(),
        };
        self.run(&command).await?;
        Ok(())
    }

    pub(crate) async fn restart_service(&self, kernel: Kernel) -> Result<(), OpError> {
        let command = match kernel {
            Kernel::Linux => "sudo systemctl restart alloy.service".to_string(),
            Kernel::Darwin => format!("sudo launchctl kickstart -k system/{LAUNCHD_LABEL}"),
            Kernel::Freebsd => "sudo service alloy restart".to_string(),
        };
        self.run(&command).await?;
        Ok(())
    }

    /// Stop, disable and remove the supervisor unit. Stop/disable tolerate an
    /// already-stopped service; removing the unit file does not.
    pub(crate) async fn teardown_supervisor(&self, kernel: Kernel) -> Result<(), OpError> {
        match kernel {
            Kernel::Linux => {
                self.run_best_effort("sudo systemctl stop alloy.service").await;
                self.run_best_effort("sudo systemctl disable alloy.service").await;
                self.run("sudo rm -f /etc/systemd/system/alloy.service").await?;
            }
            Kernel::Darwin => {
                self.run_best_effort(&format!("sudo launchctl bootout system/{LAUNCHD_LABEL}"))
                    .await;
                self.run(&format!(
                    "sudo rm -f /Library/LaunchDaemons/{LAUNCHD_LABEL}.plist"
                ))
                .await?;
            }
            Kernel::Freebsd => {
                self.run_best_effort("sudo service alloy stop").await;
                self.run_best_effort("sudo sysrc -x alloy_enable").await;
                self.run("sudo rm -f /etc/rc.d/alloy").await?;
            }
        }
        Ok(())
    }
}
