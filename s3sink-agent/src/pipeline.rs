//! Batching pipeline: input lines in, multipart objects out

use anyhow::{Context, Result};
use chrono::Utc;
use s3sink_client::{CloseOutcome, MultipartObjectWriter};
use s3sink_core::{BucketName, ObjectKey, ObjectStore};
use std::fmt;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

use crate::key_format::KeyFormat;
use crate::record::{LogRecord, OutputFormat};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bucket: BucketName,
    pub part_size: u64,
    pub key_format: KeyFormat,
    pub tag: String,
    /// Records per object; 0 means one object for the whole run
    pub batch_records: u64,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub records: u64,
    pub skipped: u64,
    pub objects: u64,
    pub aborted: u64,
    pub bytes: u64,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records ({} skipped), {} objects finalized, {} sessions aborted, {} bytes",
            self.records, self.skipped, self.objects, self.aborted, self.bytes
        )
    }
}

/// One object being written
struct Batch<S: ObjectStore> {
    key: ObjectKey,
    writer: MultipartObjectWriter<S>,
    records: u64,
}

pub struct Pipeline<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: ObjectStore + Clone> Pipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Pipeline { store, config }
    }

    /// Read records until EOF or `shutdown` resolves, then close the
    /// current object.
    ///
    /// The first object is opened before any input is read, so an empty run
    /// still checks that the bucket is writable.
    pub async fn run<R, F>(&self, input: R, shutdown: F) -> Result<PipelineSummary>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut summary = PipelineSummary::default();
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        let mut batch_index = 0;
        let mut batch = Some(self.open_batch(batch_index).await?);

        loop {
            let line = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, closing current object");
                    break;
                }
                line = lines.next_line() => line.context("failed to read input")?,
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            let record = match LogRecord::decode(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping undecodable record: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            let mut current = match batch.take() {
                Some(current) => current,
                None => {
                    batch_index += 1;
                    self.open_batch(batch_index).await?
                }
            };

            let time = record.time.or_now(Utc::now());
            let rendered = record
                .render(self.config.format, summary.records, &self.config.tag, time)
                .context("failed to render record")?;

            if let Err(err) = current.writer.write(rendered.as_bytes()).await {
                error!("Write to {} failed: {}", current.key, err);
                let key = current.key.clone();
                if let Err(close_err) = self.finish(current, &mut summary).await {
                    warn!("Closing {} after a failed write also failed: {:#}", key, close_err);
                }
                return Err(err).with_context(|| format!("failed to write to {}", key));
            }
            summary.records += 1;
            current.records += 1;

            if self.config.batch_records > 0 && current.records >= self.config.batch_records {
                self.finish(current, &mut summary).await?;
            } else {
                batch = Some(current);
            }
        }

        if let Some(current) = batch.take() {
            self.finish(current, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn open_batch(&self, index: u64) -> Result<Batch<S>> {
        let key = self
            .config
            .key_format
            .resolve(&self.config.tag, index, Utc::now())
            .context("failed to name object")?;

        let writer = MultipartObjectWriter::open(
            self.store.clone(),
            self.config.bucket.clone(),
            key.clone(),
            self.config.part_size,
        )
        .await
        .with_context(|| format!("failed to start upload of {}", key))?;

        debug!("Batch {} writing to {}/{}", index, self.config.bucket, key);
        Ok(Batch {
            key,
            writer,
            records: 0,
        })
    }

    async fn finish(&self, mut batch: Batch<S>, summary: &mut PipelineSummary) -> Result<()> {
        let outcome = batch
            .writer
            .close()
            .await
            .with_context(|| format!("failed to complete {}", batch.key))?;

        match outcome {
            CloseOutcome::Finalized { parts, bytes } => {
                summary.objects += 1;
                summary.bytes += bytes;
                info!(
                    "Wrote {} records to {}/{} ({} parts, {} bytes)",
                    batch.records, self.config.bucket, batch.key, parts, bytes
                );
            }
            CloseOutcome::Aborted => {
                summary.aborted += 1;
                info!("No records for {}/{}, upload discarded", self.config.bucket, batch.key);
            }
        }
        Ok(())
    }
}
