//! `ObjectStore` over the AWS S3 multipart API

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use s3sink_core::*;

use crate::error::{map_sdk_error, RequestTarget};

/// Connection settings for [`S3Store::connect`]
#[derive(Debug, Clone)]
pub struct S3Config {
    /// AWS region
    pub region: String,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
    pub connect_timeout: Duration,
    /// Upper bound for one whole operation, retries included
    pub operation_timeout: Duration,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            endpoint: None,
            force_path_style: false,
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(300),
        }
    }
}

/// S3 store client. Cloning shares the underlying connection pool.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Wrap an already configured SDK client
    pub fn new(client: Client) -> Self {
        S3Store { client }
    }

    /// Build a client from the default AWS credential chain
    pub async fn connect(config: S3Config) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(config.connect_timeout)
            .operation_timeout(config.operation_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(timeouts);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        debug!(
            "S3 client ready (region={}, endpoint={:?})",
            config.region,
            config.endpoint
        );
        S3Store::new(Client::from_conf(s3_config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn target(session: &UploadSession) -> RequestTarget<'_> {
    RequestTarget {
        bucket: session.bucket.as_str(),
        token: Some(session.token.as_str()),
    }
}

/// Convert a validated part number into the SDK's representation
fn sdk_part_number(part_number: PartNumber) -> i32 {
    // MAX_PART_NUMBER fits comfortably in an i32
    part_number.get() as i32
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn open_session(&self, bucket: &BucketName, key: &ObjectKey) -> Result<SessionToken> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(
                    e,
                    RequestTarget {
                        bucket: bucket.as_str(),
                        token: None,
                    },
                )
            })?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StoreError::Internal("S3 did not return an upload id".to_string()))?;

        debug!("CreateMultipartUpload {}/{} -> {}", bucket, key, upload_id);
        Ok(SessionToken::new(upload_id))
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        payload: Bytes,
    ) -> Result<IntegrityTag> {
        let size = payload.len();
        let output = self
            .client
            .upload_part()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.token.as_str())
            .part_number(sdk_part_number(part_number))
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, target(session)))?;

        let etag = output.e_tag().ok_or_else(|| {
            StoreError::Internal(format!("S3 did not return an ETag for part {}", part_number))
        })?;

        debug!("UploadPart {} ({} bytes) -> {}", part_number, size, etag);
        Ok(IntegrityTag::new(etag))
    }

    async fn finalize_session(&self, session: &UploadSession, parts: &[CompletedPart]) -> Result<()> {
        let completed = parts
            .iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .e_tag(part.tag.as_str())
                    .part_number(sdk_part_number(part.part_number))
                    .build()
            })
            .collect::<Vec<_>>();

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.token.as_str())
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, target(session)))?;

        debug!(
            "CompleteMultipartUpload {}/{} with {} parts",
            session.bucket,
            session.key,
            parts.len()
        );
        Ok(())
    }

    async fn abort_session(&self, session: &UploadSession) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(session.bucket.as_str())
            .key(session.key.as_str())
            .upload_id(session.token.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, target(session)))?;

        debug!("AbortMultipartUpload {}/{} ({})", session.bucket, session.key, session.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = S3Config::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.endpoint.is_none());
        assert!(!config.force_path_style);
    }

    #[test]
    fn test_part_numbers_convert_losslessly() {
        let last = PartNumber::new(MAX_PART_NUMBER).unwrap();
        assert_eq!(sdk_part_number(last), MAX_PART_NUMBER as i32);
        assert_eq!(sdk_part_number(PartNumber::FIRST), 1);
    }

    #[tokio::test]
    async fn test_connect_builds_client_for_custom_endpoint() {
        let store = S3Store::connect(S3Config {
            region: "eu-west-1".into(),
            endpoint: Some("http://127.0.0.1:9000".into()),
            force_path_style: true,
            ..S3Config::default()
        })
        .await;

        let config = store.client().config();
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
