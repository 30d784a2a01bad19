mod config;
mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, Overrides, require_bind_addr};
use std::path::PathBuf;
use std::sync::Arc;
use surfbox_core::{
    BlockStore, CheckBlocksOperation, HttpCluster, MetaStore, SyncOperation, SyncSettings,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "surfbox")]
#[command(about = "Sharded, content-addressed file synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block store
    BlockStore {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the metadata store
    MetaStore {
        #[arg(short, long)]
        config: Option<String>,

        #[arg(long)]
        bind: Option<String>,

        /// Block store address; repeat in ring order
        #[arg(long = "block-store")]
        block_stores: Vec<String>,
    },
    /// Run one sync pass over a directory
    Sync {
        #[arg(short, long)]
        config: Option<String>,

        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Block size in bytes
        #[arg(long)]
        block_size: Option<u64>,

        /// Metadata store address
        #[arg(long)]
        meta_store: Option<String>,
    },
    /// Report blocks missing from their block store
    Check {
        #[arg(short, long)]
        config: Option<String>,

        #[arg(long)]
        meta_store: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "surfbox=info,surfbox_core=info,surfbox_server=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::BlockStore { config, bind } => {
            let cfg = Config::load(
                config.as_deref(),
                Overrides::default().set("block_store.bind_addr", bind),
            )
            .context("failed to load config")?;
            let bind_addr = require_bind_addr("block_store", &cfg.block_store.bind_addr)?;

            tracing::info!("Starting block store on {}", bind_addr);
            let listener = server::bind(bind_addr).await?;
            server::serve(listener, server::block_store_router(Arc::new(BlockStore::new())))
                .await?;
        }
        Commands::MetaStore {
            config,
            bind,
            block_stores,
        } => {
            let block_stores = (!block_stores.is_empty()).then_some(block_stores);
            let cfg = Config::load(
                config.as_deref(),
                Overrides::default()
                    .set("meta_store.bind_addr", bind)
                    .set("meta_store.block_store_addrs", block_stores),
            )
            .context("failed to load config")?;
            let bind_addr = require_bind_addr("meta_store", &cfg.meta_store.bind_addr)?;

            let addrs = cfg.meta_store.block_store_addrs.clone();
            if addrs.is_empty() {
                tracing::warn!("Metadata store starts with no block stores");
            }
            tracing::info!(
                "Starting metadata store on {} with block stores {:?}",
                bind_addr,
                addrs
            );
            let listener = server::bind(bind_addr).await?;
            server::serve(listener, server::meta_store_router(Arc::new(MetaStore::new(addrs))))
                .await?;
        }
        Commands::Sync {
            config,
            base_dir,
            block_size,
            meta_store,
        } => {
            let cfg = Config::load(
                config.as_deref(),
                Overrides::default()
                    .set(
                        "client.base_dir",
                        base_dir.map(|dir| dir.to_string_lossy().into_owned()),
                    )
                    .set("client.block_size", block_size)
                    .set("client.meta_store_addr", meta_store),
            )
            .context("failed to load config")?;

            let cluster = Arc::new(HttpCluster::new(
                cfg.client.meta_store_addr()?,
                cfg.client.request_timeout(),
            )?);
            let settings = SyncSettings {
                base_dir: cfg.client.base_dir()?.to_path_buf(),
                block_size: cfg.client.block_size,
            };

            let report = SyncOperation::new(cluster, settings)
                .run()
                .await
                .context("sync pass failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.failed.is_empty() {
                anyhow::bail!("{} files failed to sync", report.failed.len());
            }
        }
        Commands::Check { config, meta_store } => {
            let cfg = Config::load(
                config.as_deref(),
                Overrides::default().set("client.meta_store_addr", meta_store),
            )
            .context("failed to load config")?;

            let cluster = Arc::new(HttpCluster::new(
                cfg.client.meta_store_addr()?,
                cfg.client.request_timeout(),
            )?);
            let report = CheckBlocksOperation::new(cluster).run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.is_healthy() {
                anyhow::bail!("{} blocks missing", report.missing.len());
            }
        }
    }

    Ok(())
}
