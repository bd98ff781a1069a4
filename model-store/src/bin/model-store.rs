/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{self, Duration, SystemTime, UNIX_EPOCH};

use aws_sdk_s3::error::DisplayErrorContext;
use clap::Parser;
use model_store::io::InputStream;
use model_store::retry::RetryingStorage;
use model_store::storage::S3Storage;
use model_store::{Client, OperationContext};
use tokio::fs;
use tracing::Instrument;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "model-store")]
#[command(about = "Stores, fetches and manages model artifacts in an S3-compatible bucket.")]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    /// Endpoint address, e.g. `localhost:9000` [env: MODEL_STORE_ENDPOINT]
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Bucket holding the models [env: MODEL_STORE_BUCKET]
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Connect over TLS [env: MODEL_STORE_USE_SSL]
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    use_ssl: bool,

    /// Abort the command if it takes longer than this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Attempts per operation, including the first. `1` disables retries
    #[arg(long, global = true, default_value_t = 1)]
    retries: usize,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
    /// Upload a local file as a model
    Upload {
        /// Model key
        key: String,
        /// File to upload
        path: PathBuf,
    },
    /// Download a model to a local file
    Download {
        /// Model key
        key: String,
        /// Destination file
        path: PathBuf,
    },
    /// Delete a model
    Delete {
        /// Model key
        key: String,
    },
    /// List all stored models
    List,
    /// Check whether a model exists
    Exists {
        /// Model key
        key: String,
    },
    /// Run an upload, exists, download, list and delete cycle against the store
    Smoke,
}

async fn connect(args: &Args, ctx: &OperationContext) -> Result<Client, BoxError> {
    let mut loader = model_store::from_env();
    if let Some(endpoint) = &args.endpoint {
        loader = loader.endpoint(endpoint);
    }
    if let Some(bucket) = &args.bucket {
        loader = loader.bucket_name(bucket);
    }
    if args.use_ssl {
        loader = loader.use_ssl(true);
    }
    let config = loader.load()?;
    tracing::debug!(
        endpoint = %config.endpoint_url(),
        bucket = config.bucket_name(),
        "connecting"
    );

    let storage = S3Storage::connect(ctx, &config)
        .instrument(tracing::debug_span!("connect"))
        .await?;
    let client = if args.retries > 1 {
        Client::new(RetryingStorage::new(storage).with_max_attempts(args.retries))
    } else {
        Client::new(storage)
    };
    Ok(client)
}

async fn do_upload(
    client: &Client,
    ctx: &OperationContext,
    key: &str,
    path: &Path,
) -> Result<(), BoxError> {
    let size = fs::metadata(path).await?.len();
    let start = time::Instant::now();
    client
        .upload_model(ctx, key, InputStream::from_path(path), size)
        .await?;
    println!("uploaded {key} ({size} bytes) in {:?}", start.elapsed());
    Ok(())
}

async fn do_download(
    client: &Client,
    ctx: &OperationContext,
    key: &str,
    path: &Path,
) -> Result<(), BoxError> {
    let start = time::Instant::now();
    let mut body = client.download_model(ctx, key).await?;
    let mut dest = fs::File::create(path).await?;
    let written = ctx
        .run(async {
            let n = tokio::io::copy(&mut body, &mut dest).await?;
            dest.sync_all().await?;
            Ok::<_, model_store::Error>(n)
        })
        .instrument(tracing::debug_span!("write-output"))
        .await?;
    println!(
        "downloaded {key} ({written} bytes) to {} in {:?}",
        path.display(),
        start.elapsed()
    );
    Ok(())
}

async fn do_smoke(client: &Client, ctx: &OperationContext) -> Result<(), BoxError> {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let key = format!("test-model-{ts}");
    let data: &'static [u8] = b"test model data";

    client
        .upload_model(ctx, &key, data, data.len() as u64)
        .await?;
    println!("uploaded {key}");

    if !client.model_exists(ctx, &key).await? {
        return Err(format!("{key} missing right after upload").into());
    }
    println!("{key} exists");

    let downloaded = client.download_model_bytes(ctx, &key).await?;
    if &downloaded[..] != data {
        return Err(format!("{key} came back with different content").into());
    }
    println!("downloaded {key}, content matches");

    let keys = client.list_models(ctx).await?;
    if !keys.contains(&key) {
        return Err(format!("{key} missing from listing").into());
    }
    println!("listed {} models", keys.len());

    client.delete_model(ctx, &key).await?;
    if client.model_exists(ctx, &key).await? {
        return Err(format!("{key} still exists after delete").into());
    }
    println!("deleted {key}");

    println!("smoke test passed");
    Ok(())
}

async fn run(args: Args, ctx: OperationContext) -> Result<(), BoxError> {
    let client = connect(&args, &ctx).await?;

    match &args.command {
        Command::Upload { key, path } => do_upload(&client, &ctx, key, path).await,
        Command::Download { key, path } => do_download(&client, &ctx, key, path).await,
        Command::Delete { key } => {
            client.delete_model(&ctx, key).await?;
            println!("deleted {key}");
            Ok(())
        }
        Command::List => {
            for key in client.list_models(&ctx).await? {
                println!("{key}");
            }
            Ok(())
        }
        Command::Exists { key } => {
            let exists = client.model_exists(&ctx, key).await?;
            println!("{exists}");
            Ok(())
        }
        Command::Smoke => do_smoke(&client, &ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .init();

    let mut ctx = OperationContext::new();
    if let Some(secs) = args.timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, cancelling");
            canceller.cancel();
        }
    });

    match run(args, ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("command failed: {}", DisplayErrorContext(err.as_ref()));
            eprintln!("error: {}", DisplayErrorContext(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}
