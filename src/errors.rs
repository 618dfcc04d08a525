//! Typed operation errors.
//!
//! Every provisioning sequence reports failures as an [`OpError`] carrying the
//! operation kind, the subject (agent or service), a short human message and
//! an optional reason — typically raw command output. Shared steps re-tag a
//! low-level error into the calling operation's kind with [`OpError::retag`],
//! preserving message and reason.

use thiserror::Error;

use crate::target::TargetError;

/// The provisioning operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deploy,
    Update,
    Teardown,
    Register,
    Deregister,
    RotateCertificate,
    RotateSecret,
    Config,
    Info,
    List,
    Describe,
    Edit,
}

/// What the operation acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Agent,
    Service,
}

impl Subject {
    fn as_str(self) -> &'static str {
        match self {
            Subject::Agent => "agent",
            Subject::Service => "service",
        }
    }
}

/// Operation-tagged error with a human message and a diagnostic reason.
#[derive(Debug, Error)]
#[error("{}", render(.operation, .subject, .message, .reason))]
pub struct OpError {
    pub operation: Operation,
    pub subject: Subject,
    pub message: String,
    pub reason: String,
}

impl OpError {
    pub fn new(operation: Operation, subject: Subject, message: impl Into<String>) -> Self {
        Self {
            operation,
            subject,
            message: message.into(),
            reason: String::new(),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Wrap a failed target operation, keeping its combined output as reason.
    pub fn from_target(operation: Operation, subject: Subject, err: &TargetError) -> Self {
        Self {
            operation,
            subject,
            message: err.to_string(),
            reason: String::from_utf8_lossy(err.output()).trim().to_string(),
        }
    }

    /// Re-tag into another operation kind, preserving message and reason.
    #[must_use]
    pub fn retag(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}

fn render(operation: &Operation, subject: &Subject, message: &str, reason: &str) -> String {
    let subject = subject.as_str();
    let label = match operation {
        Operation::Deploy => format!("deploy {subject}"),
        Operation::Update => format!("update {subject}"),
        Operation::Teardown => format!("teardown {subject}"),
        Operation::Register => format!("register {subject}"),
        Operation::Deregister => format!("deregister {subject}"),
        Operation::RotateCertificate => format!("rotate {subject} certificate"),
        Operation::RotateSecret => format!("rotate {subject} secret"),
        Operation::Config => format!("get {subject} config"),
        Operation::Info => format!("get {subject} info"),
        Operation::List => format!("list {subject}s"),
        Operation::Describe => format!("get {subject} description"),
        Operation::Edit => format!("edit {subject}"),
    };
    format!("Failed to {label}: {message} {reason}")
        .trim_end()
        .to_string()
}
