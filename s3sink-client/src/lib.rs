//! Multipart object writer for s3sink

pub mod buffer;
pub mod error;
pub mod writer;

pub use buffer::PartBuffer;
pub use error::WriterError;
pub use writer::{CloseOutcome, MultipartObjectWriter, WriterState};

pub type Result<T> = std::result::Result<T, WriterError>;
