//! S3 transport for s3sink
//!
//! Implements the object store protocol on top of the AWS SDK. Credentials
//! come from the standard AWS provider chain; timeouts are set on the SDK
//! client, not by callers.

mod error;
pub mod s3;

pub use s3::{S3Config, S3Store};
