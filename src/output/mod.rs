//! Progress output — one notification per target operation.

pub mod reporter;

pub use reporter::{ConsoleReporter, ProgressReporter, SharedReporter};

use clap::ValueEnum;

/// Output rendering mode, selected once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// No progress output.
    Quiet,
    /// One dot per operation.
    #[default]
    Progress,
    /// One full message line per operation.
    Documentation,
    /// One JSON record per operation.
    Json,
}
