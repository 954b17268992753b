//! Core data types for s3sink

use serde::{Deserialize, Serialize};

/// Part size the S3 protocol requires for every part except the last (5 MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Highest part number a multipart upload may use
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Maximum object key length in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Bucket name, validated against S3 naming rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name with validation
    pub fn new(name: &str) -> crate::Result<Self> {
        if name.len() < 3 || name.len() > 63 {
            return Err(crate::StoreError::InvalidBucketName(format!(
                "'{}' must be between 3 and 63 characters",
                name
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        {
            return Err(crate::StoreError::InvalidBucketName(format!(
                "invalid characters in '{}'",
                name
            )));
        }

        let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
        if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
            return Err(crate::StoreError::InvalidBucketName(format!(
                "'{}' must start and end with a letter or digit",
                name
            )));
        }

        Ok(BucketName(name.to_string()))
    }

    /// Get the bucket name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BucketName {
    type Error = crate::StoreError;

    fn try_from(value: String) -> crate::Result<Self> {
        BucketName::new(&value)
    }
}

impl From<BucketName> for String {
    fn from(value: BucketName) -> Self {
        value.0
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object key within a bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new key with validation
    pub fn new(key: &str) -> crate::Result<Self> {
        if key.is_empty() {
            return Err(crate::StoreError::InvalidKey("empty key".to_string()));
        }

        if key.len() > MAX_KEY_LEN {
            return Err(crate::StoreError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(crate::StoreError::InvalidKey(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(ObjectKey(key.to_string()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this key has the given prefix
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = crate::StoreError;

    fn try_from(value: String) -> crate::Result<Self> {
        ObjectKey::new(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(value: ObjectKey) -> Self {
        value.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based part number, bounded by [`MAX_PART_NUMBER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PartNumber(u32);

impl PartNumber {
    /// The first part of every upload
    pub const FIRST: PartNumber = PartNumber(1);

    /// Create a part number with validation
    pub fn new(n: u32) -> crate::Result<Self> {
        if n == 0 || n > MAX_PART_NUMBER {
            return Err(crate::StoreError::InvalidPartNumber(n));
        }
        Ok(PartNumber(n))
    }

    /// Following part number, or `None` past the protocol ceiling
    pub fn next(self) -> Option<Self> {
        PartNumber::new(self.0 + 1).ok()
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PartNumber {
    type Error = crate::StoreError;

    fn try_from(value: u32) -> crate::Result<Self> {
        PartNumber::new(value)
    }
}

impl From<PartNumber> for u32 {
    fn from(value: PartNumber) -> Self {
        value.0
    }
}

impl std::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flush threshold for the part buffer, in bytes
///
/// Any positive value is accepted. Stores commonly reject non-final parts
/// smaller than [`MIN_PART_SIZE`]; that rejection surfaces when the upload is
/// finalized rather than here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartSize(u64);

impl PartSize {
    /// Returns `None` for zero
    pub fn new(bytes: u64) -> Option<Self> {
        (bytes > 0).then_some(PartSize(bytes))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Threshold as an in-memory length
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// True when non-final parts of this size would be rejected by S3
    pub fn is_below_store_minimum(self) -> bool {
        self.0 < MIN_PART_SIZE
    }
}

impl Default for PartSize {
    fn default() -> Self {
        PartSize(MIN_PART_SIZE)
    }
}

impl std::fmt::Display for PartSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// Opaque upload identifier issued by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        SessionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-part tag (an ETag on S3), echoed back verbatim on finalize
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityTag(String);

impl IntegrityTag {
    pub fn new(tag: impl Into<String>) -> Self {
        IntegrityTag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One in-progress multipart upload against a (bucket, key) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub token: SessionToken,
    pub bucket: BucketName,
    pub key: ObjectKey,
    pub part_size: PartSize,
}

impl UploadSession {
    pub fn new(token: SessionToken, bucket: BucketName, key: ObjectKey, part_size: PartSize) -> Self {
        UploadSession {
            token,
            bucket,
            key,
            part_size,
        }
    }
}

/// Completion record for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: PartNumber,
    pub tag: IntegrityTag,
    pub size: u64,
}

/// Parts uploaded so far in a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletedParts {
    parts: Vec<CompletedPart>,
}

impl CompletedParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a part, keeping the list sorted by part number.
    /// A part number recorded twice keeps the newer tag.
    pub fn add_part(&mut self, part: CompletedPart) {
        match self
            .parts
            .binary_search_by_key(&part.part_number, |p| p.part_number)
        {
            Ok(idx) => self.parts[idx] = part,
            Err(idx) => self.parts.insert(idx, part),
        }
    }

    /// Parts in ascending part-number order
    pub fn as_slice(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get total size
    pub fn total_size(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }

    /// Highest part number recorded
    pub fn last_part_number(&self) -> Option<PartNumber> {
        self.parts.last().map(|p| p.part_number)
    }

    /// Check that part numbers run 1..=n without gaps
    pub fn is_contiguous(&self) -> bool {
        is_contiguous(&self.parts)
    }
}

/// Check that a completion list is numbered exactly 1..=n in order
pub fn is_contiguous(parts: &[CompletedPart]) -> bool {
    parts
        .iter()
        .enumerate()
        .all(|(i, part)| part.part_number.get() as usize == i + 1)
}
