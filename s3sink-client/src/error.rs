//! Writer error types

use s3sink_core::StoreError;
use thiserror::Error;

use crate::CloseOutcome;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Failed to open upload session for {bucket}/{key}: {source}")]
    SessionOpen {
        bucket: String,
        key: String,
        source: StoreError,
    },

    /// The write that triggered the upload was not committed
    #[error("Failed to upload part {part_number}: {source}")]
    PartUpload { part_number: u32, source: StoreError },

    #[error("Upload exceeds the {limit} part limit")]
    TooManyParts { limit: u32 },

    /// The remote object was not created
    #[error("Store rejected completion of {parts} parts: {source}")]
    Finalize { parts: usize, source: StoreError },

    /// The session may still hold storage on the store side
    #[error("Failed to abort upload session: {source}")]
    Abort { source: StoreError },

    /// The residual buffer was not stored during close. `terminal` is the
    /// finalize or abort made afterwards with the parts already stored.
    #[error("Failed to store final part on close: {source}")]
    FinalPart {
        source: Box<WriterError>,
        terminal: std::result::Result<CloseOutcome, Box<WriterError>>,
    },

    #[error("Writer is closed, cannot {operation}")]
    InvalidState { operation: &'static str },

    #[error("Invalid writer configuration: {0}")]
    InvalidConfig(String),
}

impl WriterError {
    /// The store error behind a remote failure, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            WriterError::SessionOpen { source, .. }
            | WriterError::PartUpload { source, .. }
            | WriterError::Finalize { source, .. }
            | WriterError::Abort { source } => Some(source),
            WriterError::FinalPart { source, .. } => source.store_error(),
            _ => None,
        }
    }
}
