//! Embedded object store with S3 multipart semantics, built on fjall

use fjall::{Config, Keyspace, Partition, PartitionCreateOptions, PersistMode};
use std::path::Path;
use std::sync::Arc;
use s3sink_core::*;

pub mod bucket;
pub mod store;

pub use bucket::*;
pub use store::*;

const BUCKETS_PARTITION: &str = "buckets";
const OBJECTS_PARTITION: &str = "objects";
const UPLOADS_PARTITION: &str = "uploads";

/// Storage engine wrapping a fjall keyspace
#[derive(Clone)]
pub struct StorageEngine {
    keyspace: Arc<Keyspace>,
    buckets: Arc<Partition>,
    objects: Arc<Partition>,
    uploads: Arc<Partition>,
    min_part_size: u64,
}

impl StorageEngine {
    /// Create new storage engine at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let keyspace = Config::new(path)
            .open()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let open = |name: &str| -> Result<Arc<Partition>> {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map(Arc::new)
                .map_err(|e| StoreError::Storage(e.to_string()))
        };
        let buckets = open(BUCKETS_PARTITION)?;
        let objects = open(OBJECTS_PARTITION)?;
        let uploads = open(UPLOADS_PARTITION)?;

        Ok(StorageEngine {
            keyspace: Arc::new(keyspace),
            buckets,
            objects,
            uploads,
            min_part_size: MIN_PART_SIZE,
        })
    }

    /// Create temporary storage engine for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    /// Override the minimum size enforced for non-final parts on finalize
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Minimum size for every part except the last
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Register a bucket. Creating an existing bucket is a no-op.
    pub fn create_bucket(&self, name: &BucketName) -> Result<()> {
        self.buckets
            .insert(name.as_str().as_bytes(), Vec::<u8>::new())
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.persist()
    }

    /// Check whether a bucket has been created
    pub fn bucket_exists(&self, name: &BucketName) -> Result<bool> {
        self.buckets
            .contains_key(name.as_str().as_bytes())
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Open an existing bucket
    pub fn bucket(&self, name: &BucketName) -> Result<Bucket> {
        if !self.bucket_exists(name)? {
            return Err(StoreError::NoSuchBucket {
                bucket: name.to_string(),
            });
        }
        Ok(Bucket::new(self.clone(), name.clone()))
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn objects(&self) -> &Partition {
        &self.objects
    }

    pub(crate) fn uploads(&self) -> &Partition {
        &self.uploads
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }
}
