//! Command line and environment configuration

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use s3sink_core::{BucketName, MIN_PART_SIZE};
use s3sink_net::S3Config;
use std::path::PathBuf;
use std::time::Duration;

use crate::key_format::KeyFormat;
use crate::pipeline::PipelineConfig;
use crate::record::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Amazon S3 or an S3-compatible endpoint
    S3,
    /// Embedded store under `--data-dir`
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "s3sink-agent")]
#[command(version, about = "Stream newline-delimited log records into multipart objects", long_about = None)]
pub struct Args {
    #[arg(long, value_enum, env = "S3SINK_BACKEND", default_value_t = Backend::S3)]
    pub backend: Backend,

    #[arg(long, env = "S3SINK_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom endpoint URL for S3-compatible stores
    #[arg(long, env = "S3SINK_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, env = "S3SINK_FORCE_PATH_STYLE")]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds
    #[arg(long, env = "S3SINK_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,

    #[arg(long, env = "S3SINK_BUCKET")]
    pub bucket: String,

    /// Part size in bytes
    #[arg(long, env = "S3SINK_MULTIPART_SIZE", default_value_t = MIN_PART_SIZE)]
    pub multipart_size: u64,

    #[arg(
        long = "s3-key-format",
        env = "S3SINK_KEY_FORMAT",
        default_value = "/$TAG/%Y/%m/%d/%H_%M_%S-$INDEX"
    )]
    pub s3_key_format: String,

    #[arg(long, env = "S3SINK_TAG", default_value = "s3sink")]
    pub tag: String,

    /// Data directory for the local backend
    #[arg(long, env = "S3SINK_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Input file; standard input when absent
    #[arg(long, env = "S3SINK_INPUT")]
    pub input: Option<PathBuf>,

    /// Start a new object every N records (0 keeps one object per run)
    #[arg(long, env = "S3SINK_BATCH_RECORDS", default_value_t = 0)]
    pub batch_records: u64,

    #[arg(long, value_enum, env = "S3SINK_FORMAT", default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "S3SINK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "S3SINK_LOG_JSON")]
    pub log_json: bool,
}

/// Validated settings derived from [`Args`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub s3: S3Config,
    pub data_dir: PathBuf,
    pub input: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self> {
        let bucket = BucketName::new(&args.bucket)
            .with_context(|| format!("invalid bucket {:?}", args.bucket))?;

        if args.multipart_size == 0 {
            bail!("multipart size must be positive");
        }
        if args.tag.is_empty() {
            bail!("tag must not be empty");
        }

        let key_format = KeyFormat::parse(&args.s3_key_format)
            .with_context(|| format!("invalid key format {:?}", args.s3_key_format))?;
        // Surface tag/template mismatches before any session is opened
        key_format
            .resolve(&args.tag, 0, Utc::now())
            .with_context(|| format!("key format {:?} cannot name objects for tag {:?}", args.s3_key_format, args.tag))?;

        let s3 = S3Config {
            region: args.region.clone(),
            endpoint: args.endpoint.clone(),
            force_path_style: args.force_path_style,
            operation_timeout: Duration::from_secs(args.timeout_secs),
            ..S3Config::default()
        };

        Ok(Settings {
            backend: args.backend,
            s3,
            data_dir: args.data_dir.clone(),
            input: args.input.clone(),
            pipeline: PipelineConfig {
                bucket,
                part_size: args.multipart_size,
                key_format,
                tag: args.tag.clone(),
                batch_records: args.batch_records,
                format: args.format,
            },
        })
    }
}
