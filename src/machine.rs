//! Machine profiling — classify a target's kernel family and architecture.
//!
//! One `uname -sm` probe per invocation; the result is never cached to disk.
//! Architecture strings are normalized to a fixed vocabulary independent of
//! the OS-reported spelling, and unknown combinations are rejected with an
//! error naming the unsupported value.

use crate::errors::{OpError, Operation, Subject};
use crate::target::Target;

/// Normalized OS family. Closed set — anything else fails profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Linux,
    Darwin,
    Freebsd,
}

impl Kernel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kernel::Linux => "linux",
            Kernel::Darwin => "darwin",
            Kernel::Freebsd => "freebsd",
        }
    }
}

/// Profiling result: normalized kernel and architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub kernel: Kernel,
    pub arch: String,
}

impl MachineInfo {
    /// Sentinel used in dry-run mode, where the target is never contacted.
    /// Downstream steps still run for their progress side effects.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            kernel: Kernel::Linux,
            arch: "amd64".to_string(),
        }
    }

    /// Release archive stem for this machine, e.g. `alloy-linux-amd64`.
    #[must_use]
    pub fn release_name(&self) -> String {
        format!("alloy-{}-{}", self.kernel.as_str(), self.arch)
    }

    /// Installed collector binary path for this kernel.
    #[must_use]
    pub fn binary_path(&self) -> &'static str {
        match self.kernel {
            Kernel::Darwin => "/usr/local/bin/alloy",
            Kernel::Linux | Kernel::Freebsd => "/usr/bin/alloy",
        }
    }
}

/// Split a `uname -sm` line into kernel and raw architecture.
pub(crate) fn parse_uname(output: &str) -> Result<(Kernel, String), OpError> {
    let mut parts = output.trim().splitn(2, ' ');
    let (Some(kernel), Some(machine)) = (parts.next(), parts.next()) else {
        return Err(
            OpError::new(Operation::Deploy, Subject::Agent, "unexpected target machine")
                .with_reason(output.trim()),
        );
    };

    let kernel = match kernel {
        "Linux" => Kernel::Linux,
        "Darwin" => Kernel::Darwin,
        "FreeBSD" => Kernel::Freebsd,
        other => {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Agent,
                "unsupported target kernel",
            )
            .with_reason(other));
        }
    };

    Ok((kernel, machine.trim().to_string()))
}

/// Map an OS-reported architecture onto the release vocabulary.
pub(crate) fn normalize_arch(kernel: Kernel, raw: &str) -> Result<&'static str, OpError> {
    let arch = match (kernel, raw) {
        (Kernel::Linux, "x86_64") => "amd64",
        (Kernel::Linux, "aarch64") => "arm64",
        (Kernel::Linux, "ppc64le") => "ppc64le",
        (Kernel::Linux, "s390x") => "s390x",
        (Kernel::Darwin, "x86_64") => "amd64",
        (Kernel::Darwin, "arm64") => "arm64",
        (Kernel::Freebsd, "amd64") => "amd64",
        _ => {
            return Err(OpError::new(
                Operation::Deploy,
                Subject::Agent,
                "unsupported target architecture",
            )
            .with_reason(raw));
        }
    };
    Ok(arch)
}

/// Profile the target. Linux targets must additionally expose the systemd
/// state directory; other init systems are rejected.
///
/// # Errors
///
/// Returns a deploy-tagged error (callers re-tag) when the probe fails, the
/// kernel or architecture is unsupported, or the init system is missing.
pub async fn profile(target: &impl Target) -> Result<MachineInfo, OpError> {
    let out = target
        .run("uname -sm")
        .await
        .map_err(|e| OpError::from_target(Operation::Deploy, Subject::Agent, &e))?;

    if target.is_dry_run() {
        return Ok(MachineInfo::placeholder());
    }

    let (kernel, machine) = parse_uname(&String::from_utf8_lossy(&out))?;
    let arch = normalize_arch(kernel, &machine)?;

    if kernel == Kernel::Linux {
        target
            .run("test -d /run/systemd/system")
            .await
            .map_err(|e| {
                OpError::new(
                    Operation::Deploy,
                    Subject::Agent,
                    "unsupported target init system",
                )
                .with_reason(e.to_string())
            })?;
    }

    Ok(MachineInfo {
        kernel,
        arch: arch.to_string(),
    })
}
