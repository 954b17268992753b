//! s3sink agent: stream newline-delimited log records into object storage

use anyhow::{Context, Result};
use clap::Parser;
use s3sink_core::ObjectStore;
use s3sink_engine::{LocalStore, StorageEngine};
use s3sink_net::S3Store;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod key_format;
mod pipeline;
mod record;

use config::{Args, Backend, Settings};
use pipeline::Pipeline;

/// Uses `RUST_LOG` if set, otherwise the configured level.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).with_context(|| format!("invalid log level filter: {}", log_level))?
    };

    // Records may arrive on stdin; keep logs off stdout
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

async fn build_store(settings: &Settings) -> Result<Arc<dyn ObjectStore>> {
    match settings.backend {
        Backend::S3 => {
            info!(
                "Using S3 backend (region={}, endpoint={})",
                settings.s3.region,
                settings.s3.endpoint.as_deref().unwrap_or("default")
            );
            Ok(Arc::new(S3Store::connect(settings.s3.clone()).await))
        }
        Backend::Local => {
            let data_dir = &settings.data_dir;
            if !data_dir.exists() {
                std::fs::create_dir_all(data_dir)?;
                info!("Created data directory: {}", data_dir.display());
            }

            let engine = StorageEngine::new(data_dir)
                .with_context(|| format!("failed to open local store at {}", data_dir.display()))?;

            let bucket = &settings.pipeline.bucket;
            if !engine.bucket_exists(bucket)? {
                engine.create_bucket(bucket)?;
                info!("Created bucket {}", bucket);
            }

            info!("Using local backend at {}", data_dir.display());
            Ok(Arc::new(LocalStore::new(engine)))
        }
    }
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    let settings = Settings::from_args(&args)?;
    info!(
        "Writing tag {} to bucket {} with key format {}",
        settings.pipeline.tag,
        settings.pipeline.bucket,
        settings.pipeline.key_format.template()
    );

    let store = build_store(&settings).await?;
    let input = open_input(settings.input.as_deref()).await?;

    let pipeline = Pipeline::new(store, settings.pipeline);
    let summary = pipeline.run(input, shutdown_signal()).await?;

    info!("Done: {}", summary);
    Ok(())
}
