//! Sequential writer that streams bytes into a multipart upload
//!
//! Bytes accumulate in a [`PartBuffer`]. At the start of each `write`, a
//! buffer that has reached the part size is uploaded as the next part; the new
//! data is appended afterwards, so a single write triggers at most one upload
//! and large writes are never split. `close` uploads whatever is left as the
//! final part and then either finalizes the object or, if no part was ever
//! stored, aborts the session.
//!
//! The writer is not shared: every operation takes `&mut self`, and every
//! store call is awaited before the operation returns.

use s3sink_core::*;
use tracing::{debug, info, warn};

use crate::{PartBuffer, Result, WriterError};

/// Lifecycle of a writer; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Closed,
}

/// Terminal call made by a successful [`MultipartObjectWriter::close`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The object now exists at the target key
    Finalized { parts: usize, bytes: u64 },
    /// Nothing was written; the session was discarded
    Aborted,
}

/// Multipart upload writer for one (bucket, key) pair
pub struct MultipartObjectWriter<S: ObjectStore> {
    store: S,
    session: UploadSession,
    buffer: PartBuffer,
    parts: CompletedParts,
    /// `None` once the part ceiling has been used up
    next_part: Option<PartNumber>,
    state: WriterState,
    bytes_accepted: u64,
}

impl<S: ObjectStore> MultipartObjectWriter<S> {
    /// Open an upload session for `bucket`/`key` on the given store.
    ///
    /// `part_size` is the flush threshold in bytes and must be positive. S3
    /// rejects non-final parts below 5 MiB; smaller thresholds are accepted
    /// here and the store reports the violation on close.
    pub async fn open(store: S, bucket: BucketName, key: ObjectKey, part_size: u64) -> Result<Self> {
        let part_size = PartSize::new(part_size)
            .ok_or_else(|| WriterError::InvalidConfig("part size must be positive".to_string()))?;

        if part_size.is_below_store_minimum() {
            warn!(
                "Part size {} is below the {} byte store minimum; only single-part objects will finalize",
                part_size,
                MIN_PART_SIZE
            );
        }

        let token = store
            .open_session(&bucket, &key)
            .await
            .map_err(|source| WriterError::SessionOpen {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        debug!("Opened upload session {} for {}/{}", token, bucket, key);

        Ok(MultipartObjectWriter {
            store,
            buffer: PartBuffer::with_capacity(part_size.as_usize()),
            session: UploadSession::new(token, bucket, key, part_size),
            parts: CompletedParts::new(),
            next_part: Some(PartNumber::FIRST),
            state: WriterState::Open,
            bytes_accepted: 0,
        })
    }

    /// Append bytes, uploading the buffered part first if it is full.
    ///
    /// On a part upload failure nothing from `data` is kept and the buffered
    /// bytes stay in place, so the same write can be retried.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;

        if data.is_empty() {
            return Ok(0);
        }

        if self.buffer.is_full(self.session.part_size.as_usize()) {
            self.flush_part().await?;
        }

        self.buffer.append(data);
        self.bytes_accepted += data.len() as u64;
        Ok(data.len())
    }

    /// Upload the residual buffer, then finalize if any part is stored or
    /// abort if none is. The writer is closed afterwards whatever the result.
    ///
    /// If the residual upload fails, the terminal call is still made with the
    /// parts already stored and both results come back in
    /// [`WriterError::FinalPart`]. A finalized object then lacks the bytes
    /// that were never uploaded.
    pub async fn close(&mut self) -> Result<CloseOutcome> {
        self.ensure_open("close")?;
        self.state = WriterState::Closed;

        let tail = if self.buffer.is_empty() {
            None
        } else {
            self.flush_part().await.err()
        };

        let outcome = self.complete().await;
        match tail {
            None => outcome,
            Some(err) => {
                warn!(
                    "Final part for {}/{} failed, closed with {} stored parts: {}",
                    self.session.bucket,
                    self.session.key,
                    self.parts.len(),
                    err
                );
                Err(WriterError::FinalPart {
                    source: Box::new(err),
                    terminal: outcome.map_err(Box::new),
                })
            }
        }
    }

    /// Exactly one terminal call: finalize the stored parts, or abort
    async fn complete(&mut self) -> Result<CloseOutcome> {
        if self.parts.is_empty() {
            self.store
                .abort_session(&self.session)
                .await
                .map_err(|source| WriterError::Abort { source })?;

            info!(
                "Aborted empty upload for {}/{}",
                self.session.bucket,
                self.session.key
            );
            return Ok(CloseOutcome::Aborted);
        }

        self.store
            .finalize_session(&self.session, self.parts.as_slice())
            .await
            .map_err(|source| WriterError::Finalize {
                parts: self.parts.len(),
                source,
            })?;

        let outcome = CloseOutcome::Finalized {
            parts: self.parts.len(),
            bytes: self.parts.total_size(),
        };
        info!(
            "Finalized {}/{} with {} parts ({} bytes)",
            self.session.bucket,
            self.session.key,
            self.parts.len(),
            self.parts.total_size()
        );
        Ok(outcome)
    }

    /// Upload the whole buffer as the next part
    async fn flush_part(&mut self) -> Result<()> {
        let part_number = self.next_part.ok_or(WriterError::TooManyParts {
            limit: MAX_PART_NUMBER,
        })?;

        let payload = self.buffer.take();
        let size = payload.len() as u64;

        match self
            .store
            .upload_part(&self.session, part_number, payload.clone())
            .await
        {
            Ok(tag) => {
                debug!(
                    "Uploaded part {} ({} bytes) of session {}",
                    part_number,
                    size,
                    self.session.token
                );
                self.parts.add_part(CompletedPart {
                    part_number,
                    tag,
                    size,
                });
                self.next_part = part_number.next();
                Ok(())
            }
            Err(source) => {
                self.buffer.restore(payload);
                Err(WriterError::PartUpload {
                    part_number: part_number.get(),
                    source,
                })
            }
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Closed => Err(WriterError::InvalidState { operation }),
        }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Parts uploaded so far, in part-number order
    pub fn parts(&self) -> &[CompletedPart] {
        self.parts.as_slice()
    }

    /// Bytes waiting in the part buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes accepted by `write`
    pub fn bytes_written(&self) -> u64 {
        self.bytes_accepted
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Closed
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ObjectStore> Drop for MultipartObjectWriter<S> {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            warn!(
                "Writer for {}/{} dropped without close; session {} is left open on the store",
                self.session.bucket,
                self.session.key,
                self.session.token
            );
        }
    }
}

impl<S: ObjectStore> std::fmt::Debug for MultipartObjectWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartObjectWriter")
            .field("session", &self.session)
            .field("parts", &self.parts.len())
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}
