use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use sonar_zarr::config::{ConvertConfig, DownloadConfig, StoreBackend, parse_storage_option};
use sonar_zarr::flow::{convert_raw_to_zarr, download_raw_data};
use sonar_zarr::store::{LocalObjectStore, ObjectStore, S3ObjectStore};

/// Download raw sonar files and convert them to Zarr stores.
#[derive(Debug, Parser)]
#[command(name = "sonar-zarr", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the sample EK60 files from the NOAA bucket.
    Download {
        /// Directory the files are written to.
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Concurrent downloads.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Convert raw files to Zarr stores in object storage.
    Convert(ConvertArgs),
}

#[derive(Debug, clap::Args)]
struct ConvertArgs {
    #[arg(long)]
    input_dir: Option<PathBuf>,
    #[arg(long)]
    bucket: Option<String>,
    #[arg(long)]
    prefix: Option<String>,
    #[arg(long)]
    sonar_model: Option<String>,
    /// Fail instead of replacing stores that already exist.
    #[arg(long)]
    no_overwrite: bool,
    /// Shell glob applied to file names in the input directory.
    #[arg(long = "glob")]
    glob_pattern: Option<String>,
    /// Maximum conversions in flight.
    #[arg(long)]
    capacity: Option<usize>,
    #[arg(long)]
    workers: Option<usize>,
    /// Bytes per array chunk.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// `local` or `s3`.
    #[arg(long)]
    store: Option<StoreBackend>,
    /// Root directory for the local store.
    #[arg(long)]
    local_root: Option<PathBuf>,
    /// Object store option, `key=value`. Repeatable.
    #[arg(long = "storage-option", value_parser = parse_storage_option)]
    storage_options: Vec<(String, String)>,
}

impl ConvertArgs {
    fn apply(self, config: &mut ConvertConfig) {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(bucket) = self.bucket {
            config.bucket = bucket;
        }
        if let Some(prefix) = self.prefix {
            config.prefix = prefix;
        }
        if let Some(model) = self.sonar_model {
            config.sonar_model = model;
        }
        if self.no_overwrite {
            config.overwrite = false;
        }
        if let Some(pattern) = self.glob_pattern {
            config.glob_pattern = pattern;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let (StoreBackend::Local { root }, Some(dir)) = (&mut config.store, self.local_root) {
            *root = dir;
        }
        config.storage_options.extend(self.storage_options);
    }
}

async fn open_store(config: &ConvertConfig) -> Arc<dyn ObjectStore> {
    match &config.store {
        StoreBackend::Local { root } => Arc::new(LocalObjectStore::new(root.clone())),
        StoreBackend::S3 => Arc::new(S3ObjectStore::from_options(&config.storage_options).await),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    eprintln!("sonar-zarr v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Download { dest, workers } => {
            let mut config = DownloadConfig::from_env()?;
            if let Some(dest) = dest {
                config.dest_dir = dest;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            eprintln!("   Source: {}/{}", config.bucket_url, config.prefix);
            eprintln!("   Destination: {}", config.dest_dir.display());
            eprintln!("   Files: {}\n", config.filenames.len());

            let paths = download_raw_data(&config).await?;
            for path in paths {
                println!("{}", path.display());
            }
        }
        Command::Convert(args) => {
            let mut config = ConvertConfig::from_env()?;
            args.apply(&mut config);
            config.validate()?;

            eprintln!("   Input: {}/{}", config.input_dir.display(), config.glob_pattern);
            eprintln!("   Output: s3://{}/{}", config.bucket, config.prefix);
            match &config.store {
                StoreBackend::Local { root } => eprintln!("   Store: local ({})", root.display()),
                StoreBackend::S3 => eprintln!("   Store: s3"),
            }
            eprintln!(
                "   Capacity: {} in flight, {} workers\n",
                config.capacity, config.workers
            );

            let store = open_store(&config).await;
            let uris = convert_raw_to_zarr(&config, store).await?;
            for uri in uris {
                println!("{uri}");
            }
        }
    }

    Ok(())
}
