//! The object store protocol consumed by the writer
//!
//! Four request/response operations, mirroring the S3 multipart API.
//! Implementations are responsible for their own transport, authentication
//! and timeouts.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::{BucketName, CompletedPart, IntegrityTag, ObjectKey, PartNumber, Result, SessionToken, UploadSession};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start a multipart upload and return its session token
    async fn open_session(&self, bucket: &BucketName, key: &ObjectKey) -> Result<SessionToken>;

    /// Upload one part of the session and return the tag the store assigned it
    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        payload: Bytes,
    ) -> Result<IntegrityTag>;

    /// Combine the listed parts into the final object.
    /// `parts` must be sorted by ascending part number.
    async fn finalize_session(&self, session: &UploadSession, parts: &[CompletedPart]) -> Result<()>;

    /// Discard the session and every part uploaded to it
    async fn abort_session(&self, session: &UploadSession) -> Result<()>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn open_session(&self, bucket: &BucketName, key: &ObjectKey) -> Result<SessionToken> {
        (**self).open_session(bucket, key).await
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        payload: Bytes,
    ) -> Result<IntegrityTag> {
        (**self).upload_part(session, part_number, payload).await
    }

    async fn finalize_session(&self, session: &UploadSession, parts: &[CompletedPart]) -> Result<()> {
        (**self).finalize_session(session, parts).await
    }

    async fn abort_session(&self, session: &UploadSession) -> Result<()> {
        (**self).abort_session(session).await
    }
}
