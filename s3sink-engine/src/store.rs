//! Multipart upload sessions over the storage engine
//!
//! Session records and part payloads live in the `uploads` partition until
//! the session is finalized or aborted. Finalizing validates the completion
//! list the way S3 does, then writes the object and drops the session in a
//! single batch, so a rejected completion never leaves an object behind.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, info};
use s3sink_core::*;
use crate::{Bucket, ObjectMetadata, StorageEngine};

/// Persisted state of an open upload session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    bucket: BucketName,
    key: ObjectKey,
    created_at: SystemTime,
}

/// Persisted state of one uploaded part
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartRecord {
    tag: IntegrityTag,
    size: u64,
}

/// An upload that has been opened but neither finalized nor aborted
#[derive(Debug, Clone)]
pub struct PendingSession {
    pub token: SessionToken,
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub parts: usize,
}

/// `ObjectStore` backed by the local storage engine
#[derive(Clone)]
pub struct LocalStore {
    engine: StorageEngine,
}

impl LocalStore {
    pub fn new(engine: StorageEngine) -> Self {
        LocalStore { engine }
    }

    /// Get storage engine reference
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Read a finalized object
    pub fn get_object(&self, bucket: &BucketName, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
        self.engine.bucket(bucket)?.get(key)
    }

    /// Read a finalized object's metadata
    pub fn get_metadata(&self, bucket: &BucketName, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        self.engine.bucket(bucket)?.get_metadata(key)
    }

    /// List objects with prefix
    pub fn list_objects(&self, bucket: &BucketName, prefix: &str, limit: Option<usize>) -> Result<Vec<ObjectKey>> {
        self.engine.bucket(bucket)?.scan_prefix(prefix, limit)
    }

    /// Sessions that are still open
    pub fn list_sessions(&self) -> Result<Vec<PendingSession>> {
        let mut sessions = Vec::new();

        for item in self.engine.uploads().prefix(SESSION_PREFIX) {
            let (raw_key, value) = item.map_err(|e| StoreError::Storage(e.to_string()))?;
            let token = std::str::from_utf8(&raw_key[SESSION_PREFIX.len()..])
                .map_err(|e| StoreError::Internal(format!("Non UTF-8 session token: {}", e)))?;
            let token = SessionToken::new(token);
            let record: SessionRecord = serde_json::from_slice(&value)?;
            let parts = self.part_numbers(&token)?.len();

            sessions.push(PendingSession {
                token,
                bucket: record.bucket,
                key: record.key,
                parts,
            });
        }

        Ok(sessions)
    }

    fn load_session(&self, session: &UploadSession) -> Result<SessionRecord> {
        let raw = self
            .engine
            .uploads()
            .get(session_key(&session.token))
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let record: SessionRecord = match raw {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => {
                return Err(StoreError::NoSuchUpload {
                    token: session.token.to_string(),
                })
            }
        };

        // A token only addresses the upload it was issued for
        if record.bucket != session.bucket || record.key != session.key {
            return Err(StoreError::NoSuchUpload {
                token: session.token.to_string(),
            });
        }

        Ok(record)
    }

    fn load_part(&self, token: &SessionToken, part_number: PartNumber) -> Result<Option<PartRecord>> {
        match self.engine.uploads().get(part_meta_key(token, part_number)) {
            Ok(Some(raw)) => Ok(Some(serde_json::from_slice(&raw)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    /// Part numbers currently stored for a session, ascending
    fn part_numbers(&self, token: &SessionToken) -> Result<Vec<PartNumber>> {
        let prefix = part_meta_prefix(token);
        let mut numbers = Vec::new();

        for item in self.engine.uploads().prefix(&prefix) {
            let (raw_key, _) = item.map_err(|e| StoreError::Storage(e.to_string()))?;
            let digits = std::str::from_utf8(&raw_key[prefix.len()..])
                .map_err(|e| StoreError::Internal(format!("Corrupt part key: {}", e)))?;
            let n: u32 = digits
                .parse()
                .map_err(|e| StoreError::Internal(format!("Corrupt part key '{}': {}", digits, e)))?;
            numbers.push(PartNumber::new(n)?);
        }

        Ok(numbers)
    }

    /// Check a completion list against the stored parts
    fn validate_completion(&self, token: &SessionToken, parts: &[CompletedPart]) -> Result<()> {
        if parts.is_empty() {
            return Err(StoreError::InvalidPartOrder(
                "completion list is empty".to_string(),
            ));
        }

        if !is_contiguous(parts) {
            return Err(StoreError::InvalidPartOrder(format!(
                "expected parts 1..={} in ascending order",
                parts.len()
            )));
        }

        let min = self.engine.min_part_size();
        let last = parts.len() - 1;

        for (i, part) in parts.iter().enumerate() {
            let stored = self
                .load_part(token, part.part_number)?
                .ok_or_else(|| StoreError::InvalidPart {
                    part_number: part.part_number.get(),
                    reason: "part was never uploaded".to_string(),
                })?;

            if stored.tag != part.tag {
                return Err(StoreError::InvalidPart {
                    part_number: part.part_number.get(),
                    reason: format!("tag mismatch: stored {}, listed {}", stored.tag, part.tag),
                });
            }

            if i < last && stored.size < min {
                return Err(StoreError::EntityTooSmall {
                    part_number: part.part_number.get(),
                    size: stored.size,
                    min,
                });
            }
        }

        Ok(())
    }

    /// Remove every key belonging to the session into the given batch
    fn remove_session_into(&self, batch: &mut fjall::Batch, token: &SessionToken) -> Result<()> {
        let uploads = self.engine.uploads();
        for n in self.part_numbers(token)? {
            batch.remove(uploads, part_meta_key(token, n));
            batch.remove(uploads, part_data_key(token, n));
        }
        batch.remove(uploads, session_key(token));
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn open_session(&self, bucket: &BucketName, key: &ObjectKey) -> Result<SessionToken> {
        if !self.engine.bucket_exists(bucket)? {
            return Err(StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }

        let token = SessionToken::new(ulid::Ulid::new().to_string());
        let record = SessionRecord {
            bucket: bucket.clone(),
            key: key.clone(),
            created_at: SystemTime::now(),
        };

        self.engine
            .uploads()
            .insert(session_key(&token), serde_json::to_vec(&record)?)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.engine.persist()?;

        debug!("Opened session {} for {}/{}", token, bucket, key);
        Ok(token)
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        payload: Bytes,
    ) -> Result<IntegrityTag> {
        self.load_session(session)?;

        let tag = IntegrityTag::new(blake3::hash(&payload).to_hex().to_string());
        let record = PartRecord {
            tag: tag.clone(),
            size: payload.len() as u64,
        };

        let uploads = self.engine.uploads();
        let mut batch = self.engine.keyspace().batch();
        batch.insert(uploads, part_meta_key(&session.token, part_number), serde_json::to_vec(&record)?);
        batch.insert(uploads, part_data_key(&session.token, part_number), payload.to_vec());
        batch
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.engine.persist()?;

        debug!(
            "Stored part {} ({} bytes) for session {}",
            part_number,
            record.size,
            session.token
        );
        Ok(tag)
    }

    async fn finalize_session(&self, session: &UploadSession, parts: &[CompletedPart]) -> Result<()> {
        self.load_session(session)?;
        self.validate_completion(&session.token, parts)?;

        let mut data = Vec::new();
        let mut tag_digest = blake3::Hasher::new();
        for part in parts {
            let chunk = self
                .engine
                .uploads()
                .get(part_data_key(&session.token, part.part_number))
                .map_err(|e| StoreError::Storage(e.to_string()))?
                .ok_or_else(|| StoreError::InvalidPart {
                    part_number: part.part_number.get(),
                    reason: "part payload missing".to_string(),
                })?;
            data.extend_from_slice(&chunk);
            tag_digest.update(part.tag.as_str().as_bytes());
        }

        let metadata = ObjectMetadata {
            size: data.len() as u64,
            etag: format!("{}-{}", tag_digest.finalize().to_hex(), parts.len()),
            part_count: parts.len() as u32,
            created_at: SystemTime::now(),
        };

        let bucket = Bucket::new(self.engine.clone(), session.bucket.clone());
        let objects = self.engine.objects();
        let mut batch = self.engine.keyspace().batch();
        batch.insert(objects, bucket.metadata_key(&session.key), serde_json::to_vec(&metadata)?);
        batch.insert(objects, bucket.data_key(&session.key), data);
        self.remove_session_into(&mut batch, &session.token)?;
        batch
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.engine.persist()?;

        info!(
            "Finalized {}/{} from {} parts ({} bytes)",
            session.bucket,
            session.key,
            parts.len(),
            metadata.size
        );
        Ok(())
    }

    async fn abort_session(&self, session: &UploadSession) -> Result<()> {
        self.load_session(session)?;

        let mut batch = self.engine.keyspace().batch();
        self.remove_session_into(&mut batch, &session.token)?;
        batch
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.engine.persist()?;

        info!("Aborted session {} for {}/{}", session.token, session.bucket, session.key);
        Ok(())
    }
}

const SESSION_PREFIX: &str = "session:";

fn session_key(token: &SessionToken) -> Vec<u8> {
    format!("{}{}", SESSION_PREFIX, token.as_str()).into_bytes()
}

fn part_meta_prefix(token: &SessionToken) -> String {
    format!("partmeta:{}:", token.as_str())
}

// Zero-padded so prefix scans return parts in numeric order
fn part_meta_key(token: &SessionToken, part_number: PartNumber) -> Vec<u8> {
    format!("{}{:05}", part_meta_prefix(token), part_number.get()).into_bytes()
}

fn part_data_key(token: &SessionToken, part_number: PartNumber) -> Vec<u8> {
    format!("partdata:{}:{:05}", token.as_str(), part_number.get()).into_bytes()
}
