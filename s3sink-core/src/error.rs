//! Error types reported by object stores

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bucket does not exist: {bucket}")]
    NoSuchBucket { bucket: String },

    #[error("Upload session not found: {token}")]
    NoSuchUpload { token: String },

    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("Invalid part order: {0}")]
    InvalidPartOrder(String),

    #[error("Part {part_number} is {size} bytes, below the {min} byte minimum for non-final parts")]
    EntityTooSmall { part_number: u32, size: u64, min: u64 },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid part number: {0}")]
    InvalidPartNumber(u32),

    #[error("Store rejected request ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns true if the failure happened below the store protocol
    /// (connection, timeout) rather than being a verdict from the store.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_) | StoreError::Io(_))
    }
}
