//! Typed errors at the collaborator boundaries.
//!
//! Application-level code (database, CSV loading, CLI) uses `anyhow::Result`;
//! these enums exist where callers need to react to the kind of failure.

use thiserror::Error;

/// Configuration could not be built from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("mailbox unavailable: {0}")]
    Unavailable(String),

    #[error("mailbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse message {message_id}: {reason}")]
    Parse { message_id: String, reason: String },

    #[error("message {message_id} has no part {part_index}")]
    MissingPart { message_id: String, part_index: usize },
}

impl MailboxError {
    /// The mailbox itself failed, as opposed to one message or part
    pub fn is_transport(&self) -> bool {
        matches!(self, MailboxError::Unavailable(_) | MailboxError::Io(_))
    }
}

/// A single attachment could not be turned into text.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("document is empty")]
    Empty,

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),
}

/// Batch-level failure. Per-attachment problems never surface here.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
