//! `ProgressReporter` — the sink every target operation reports to.
//!
//! The engine and both target backends talk to the trait only; the CLI picks
//! the rendering by constructing a [`ConsoleReporter`] with the invocation's
//! [`Format`]. Tests inject a recording implementation instead.

use std::io::Write as _;
use std::sync::Arc;

use crate::output::Format;

/// Shared handle passed into targets and managers.
pub type SharedReporter = Arc<dyn ProgressReporter + Send + Sync>;

/// Receives exactly one notification per target operation, before the
/// operation runs — including in dry-run mode.
pub trait ProgressReporter {
    /// Report one operation.
    fn notify(&self, message: &str);

    /// Called once when an operation sequence finishes, success or failure.
    fn finish(&self) {}
}

/// Renders notifications to stdout according to the configured format.
pub struct ConsoleReporter {
    format: Format,
}

impl ConsoleReporter {
    #[must_use]
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Convenience constructor for the shared handle the engine expects.
    #[must_use]
    pub fn shared(format: Format) -> SharedReporter {
        Arc::new(Self::new(format))
    }
}

impl ProgressReporter for ConsoleReporter {
    fn notify(&self, message: &str) {
        match self.format {
            Format::Quiet => {}
            Format::Progress => {
                let mut out = std::io::stdout().lock();
                let _ = write!(out, ".");
                let _ = out.flush();
            }
            Format::Documentation => println!("{message}"),
            Format::Json => println!("{}", json_record(message)),
        }
    }

    fn finish(&self) {
        if self.format == Format::Progress {
            println!();
        }
    }
}

/// Render one machine-readable progress record.
fn json_record(message: &str) -> String {
    let record = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "message": message,
    });
    record.to_string()
}
