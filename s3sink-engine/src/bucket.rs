//! Finished objects, namespaced by bucket inside the objects partition

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use s3sink_core::*;
use crate::StorageEngine;

/// Metadata of a finalized object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: u64,
    /// Multipart-style tag: `<digest of part tags>-<part count>`
    pub etag: String,
    pub part_count: u32,
    pub created_at: SystemTime,
}

/// Bucket holding finalized objects
pub struct Bucket {
    name: BucketName,
    engine: StorageEngine,
}

impl Bucket {
    pub(crate) fn new(engine: StorageEngine, name: BucketName) -> Self {
        Bucket { name, engine }
    }

    /// Get bucket name
    pub fn name(&self) -> &BucketName {
        &self.name
    }

    /// Get object data
    pub fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
        match self.engine.objects().get(self.data_key(key)) {
            Ok(Some(data)) => Ok(Some(data.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    /// Get object metadata
    pub fn get_metadata(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        match self.engine.objects().get(self.metadata_key(key)) {
            Ok(Some(data)) => Ok(Some(serde_json::from_slice(&data)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    /// Check whether an object exists at the key
    pub fn contains(&self, key: &ObjectKey) -> Result<bool> {
        self.engine
            .objects()
            .contains_key(self.metadata_key(key))
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Scan keys with prefix
    pub fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<ObjectKey>> {
        let scan_prefix = format!("{}/meta:{}", self.name.as_str(), prefix).into_bytes();
        let strip = format!("{}/meta:", self.name.as_str());
        let max_results = limit.unwrap_or(usize::MAX);
        let mut keys = Vec::new();

        for item in self.engine.objects().prefix(scan_prefix) {
            let (raw_key, _) = item.map_err(|e| StoreError::Storage(format!("Scan error: {}", e)))?;
            let raw = std::str::from_utf8(&raw_key)
                .map_err(|e| StoreError::Internal(format!("Non UTF-8 object key: {}", e)))?;
            if let Some(actual_key) = raw.strip_prefix(&strip) {
                keys.push(ObjectKey::new(actual_key)?);
                if keys.len() >= max_results {
                    break;
                }
            }
        }

        Ok(keys)
    }

    /// Delete object
    pub fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut batch = self.engine.keyspace().batch();
        batch.remove(self.engine.objects(), self.metadata_key(key));
        batch.remove(self.engine.objects(), self.data_key(key));
        batch
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.engine.persist()
    }

    // Key layout inside the shared objects partition
    pub(crate) fn metadata_key(&self, key: &ObjectKey) -> Vec<u8> {
        format!("{}/meta:{}", self.name.as_str(), key.as_str()).into_bytes()
    }

    pub(crate) fn data_key(&self, key: &ObjectKey) -> Vec<u8> {
        format!("{}/data:{}", self.name.as_str(), key.as_str()).into_bytes()
    }
}
