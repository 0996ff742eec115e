//! s3lite - head, get and put objects on an S3-compatible store

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3lite_client::{Bucket, Config, Key, Metadata, S3Client, StreamingContent};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "s3lite")]
#[command(about = "Minimal client for S3-compatible object stores")]
#[command(version)]
struct Args {
    /// Store endpoint URL
    #[arg(short, long, default_value = "http://localhost:9000", env = "S3LITE_ENDPOINT")]
    endpoint: String,

    /// Signing region
    #[arg(short, long, default_value = "us-east-1", env = "AWS_REGION")]
    region: String,

    /// Connect and idle-read timeout in seconds
    #[arg(long, default_value = "30", env = "S3LITE_TIMEOUT")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long, env = "S3LITE_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print object metadata
    Head { bucket: String, key: String },

    /// Download an object
    Get {
        bucket: String,
        key: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        bucket: String,
        key: String,
        file: PathBuf,

        /// Metadata entry, repeatable
        #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so `get` can stream to stdout
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("s3lite_cli={},s3lite_client={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::new(args.endpoint)
        .with_region(args.region)
        .with_timeout(Duration::from_secs(args.timeout));
    let client = S3Client::new(config)?;

    match args.command {
        Command::Head { bucket, key } => head(&client, &bucket, &key).await,
        Command::Get {
            bucket,
            key,
            output,
        } => get(&client, &bucket, &key, output).await,
        Command::Put {
            bucket,
            key,
            file,
            metadata,
        } => put(&client, &bucket, &key, &file, metadata.into_iter().collect()).await,
    }
}

async fn head(client: &S3Client, bucket: &str, key: &str) -> anyhow::Result<()> {
    let summary = client
        .head_object(&Bucket::new(bucket)?, &Key::new(key)?)
        .await?;

    println!("key:           {}", summary.key());
    println!("etag:          {}", summary.etag());
    if let Some(size) = summary.size() {
        println!("size:          {}", size);
    }
    if let Some(modified) = summary.last_modified() {
        println!("last-modified: {}", modified.to_rfc3339());
    }
    let mut metadata = summary.metadata().iter().collect::<Vec<_>>();
    metadata.sort();
    for (name, value) in metadata {
        println!("meta:          {}={}", name, value);
    }
    Ok(())
}

async fn get(
    client: &S3Client,
    bucket: &str,
    key: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut object = client
        .get_object(&Bucket::new(bucket)?, &Key::new(key)?)
        .await?;

    let written = match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            let written = object.content().drain(&mut file).await?;
            file.sync_all().await?;
            written
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let written = object.content().drain(&mut stdout).await?;
            stdout.flush().await?;
            written
        }
    };

    tracing::info!(bytes = written, "downloaded {}/{}", bucket, key);
    Ok(())
}

async fn put(
    client: &S3Client,
    bucket: &str,
    key: &str,
    path: &Path,
    metadata: Metadata,
) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata().await?.len();

    client
        .put_object(
            &Bucket::new(bucket)?,
            &Key::new(key)?,
            StreamingContent::from_reader(file, size),
            &metadata,
        )
        .await?;

    println!("uploaded {} bytes to {}/{}", size, bucket, key);
    Ok(())
}

fn parse_metadata(entry: &str) -> Result<(String, String), String> {
    let (name, value) = entry
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", entry))?;
    if name.trim().is_empty() {
        return Err(format!("empty metadata key in {:?}", entry));
    }
    Ok((name.trim().to_string(), value.to_string()))
}
