//! Error taxonomy for per-task transfer failures
//!
//! Every variant except `Fatal` is contained inside the worker that produced
//! it: the worker logs it and moves on to the next task.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Requested resource is absent. Handled outcome, not a failure.
    #[error("resource not found")]
    NotFound,

    /// The fetch/send primitive itself failed.
    #[error("transport failure: {0}")]
    Transport(#[source] io::Error),

    /// Fewer bytes moved than required.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortIo { expected: u64, actual: u64 },

    /// Descriptor open/create failure for this task.
    #[error("resource unavailable: {0}")]
    Resource(#[source] io::Error),

    /// Task observed after shutdown began; its handle was aborted.
    #[error("task arrived after shutdown started")]
    ShutdownRace,

    /// Malformed task, dropped without doing any I/O.
    #[error("task rejected: {0}")]
    Rejected(String),

    /// Unrecoverable setup failure; the process should exit.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl TransferError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Fatal(_))
    }
}

/// Returned from the server entry point; the accept loop answers with an
/// error response when it sees one.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("transfer handle already detached")]
    AlreadyDetached,
}
