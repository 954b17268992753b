//! Core data models, errors and the object store protocol for s3sink

pub mod error;
pub mod store;
pub mod types;

pub use error::*;
pub use store::ObjectStore;
pub use types::*;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
