//! Box mirror connector
//!
//! Mirrors a Box hierarchy into an object store: content, per-document
//! metadata and the shared ACL feed read by the search index.
//!
//! Usage:
//!   boxmirror-connector --config connector.json process --events events.jsonl
//!   boxmirror-connector --config connector.json crawl
//!   boxmirror-connector --config connector.json drain
//!
//! `BOX_ACCESS_TOKEN`, `BUCKET_NAME`, `BOX_ROOT_FOLDER_IDS` and
//! `SKIP_EXISTING_ITEMS` override the settings file.

use anyhow::{bail, Context, Result};
use boxmirror_blobstore::{BlobStore, FsBlobStore};
use boxmirror_connector::{load_events, Settings};
use boxmirror_storage::SqliteMirrorStore;
use boxmirror_sync::{BoxClient, Connector, MemoryQueue};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "boxmirror-connector")]
#[command(about = "Mirror a Box hierarchy into an object store")]
struct Args {
    /// Path to the JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Root directory of the filesystem blob store
    #[arg(long)]
    blob_dir: Option<PathBuf>,

    /// Write to the configured S3 bucket instead of the filesystem
    #[arg(long)]
    s3: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply notifications from a JSON-lines file, then drain
    Process {
        #[arg(short, long)]
        events: PathBuf,
    },
    /// Write out pending mirror changes
    Drain,
    /// Seed the mirror from the configured root folders
    Crawl {
        /// Folder listing page size
        #[arg(long)]
        page_limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_env(|name| std::env::var(name).ok())?;

    let db_path = args
        .db
        .clone()
        .or_else(|| settings.database_path.clone())
        .unwrap_or_else(|| PathBuf::from("boxmirror.db"));
    let store = SqliteMirrorStore::open(&db_path)
        .with_context(|| format!("Failed to open mirror database {}", db_path.display()))?;
    let blobs = blob_store(&args, &settings).await?;
    let source = BoxClient::new(settings.box_api.clone())?;

    let queue = match &args.command {
        Command::Process { events } => Arc::new(load_events(events).await?),
        _ => Arc::new(MemoryQueue::new()),
    };
    let connector = Connector::new(
        Arc::new(store),
        blobs,
        Arc::new(source),
        queue.clone(),
        settings.sync.clone(),
    )
    .context("Invalid sync settings")?;

    match args.command {
        Command::Process { .. } => {
            let report = connector.run_until_empty().await?;
            info!(?report, "Processing finished");
            let pending = queue.in_flight_len().await;
            if pending > 0 {
                warn!(pending, "Some messages were not acknowledged");
                bail!("{pending} messages could not be processed");
            }
        }
        Command::Drain => {
            let report = connector.drain().await?;
            info!(?report, "Drain finished");
        }
        Command::Crawl { page_limit } => {
            let limit = page_limit.unwrap_or(settings.box_api.page_limit);
            let (crawled, drained) = connector.crawl(limit).await?;
            info!(?crawled, ?drained, "Crawl finished");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let builder = FmtSubscriber::builder().with_target(false).compact();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(level).init();
    }
}

async fn blob_store(args: &Args, settings: &Settings) -> Result<Arc<dyn BlobStore>> {
    if args.s3 {
        return s3_store(&settings.sync.layout.bucket).await;
    }
    let dir = args
        .blob_dir
        .clone()
        .or_else(|| settings.blob_dir.clone())
        .unwrap_or_else(|| PathBuf::from("mirror"));
    let store = FsBlobStore::open(dir.clone())
        .await
        .with_context(|| format!("Failed to open blob store {}", dir.display()))?;
    Ok(Arc::new(store))
}

#[cfg(feature = "s3")]
async fn s3_store(bucket: &str) -> Result<Arc<dyn BlobStore>> {
    if bucket.is_empty() {
        bail!("--s3 needs a bucket (settings or BUCKET_NAME)");
    }
    let conf = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_s3::Client::new(&conf);
    Ok(Arc::new(boxmirror_blobstore::S3BlobStore::new(client, bucket)))
}

#[cfg(not(feature = "s3"))]
async fn s3_store(_bucket: &str) -> Result<Arc<dyn BlobStore>> {
    bail!("built without S3 support; rebuild with --features s3")
}
