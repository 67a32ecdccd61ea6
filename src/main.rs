//! `search-sync` daemon.
//!
//! ```text
//! search-sync --config /etc/search-sync.yaml        # run until Ctrl-C
//! SYNC_CONFIG=sync.yaml search-sync --once          # one cycle, then exit
//! RUST_LOG=search_sync=debug search-sync            # verbose logs
//! POSTGRES__URL=postgres://... REDIS__URL=redis://... ELASTICSEARCH__URL=http://... search-sync
//! ```
//!
//! Connection URLs and `UPDATE_PERIOD` from flags or the environment take
//! precedence over the config file.

use clap::Parser;
use search_sync::checkpoint::RedisCheckpointStore;
use search_sync::publisher::ElasticsearchSink;
use search_sync::source::PgConnector;
use search_sync::config::ConfigOverrides;
use search_sync::{SyncConfig, Synchronizer};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "search-sync", version, about = "Sync PostgreSQL film data into the search index")]
struct Args {
    /// YAML config file. Defaults apply when omitted.
    #[arg(short, long, env = "SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Source database URL.
    #[arg(long, env = "POSTGRES__URL")]
    postgres_url: Option<String>,

    /// Checkpoint store URL.
    #[arg(long, env = "REDIS__URL")]
    redis_url: Option<String>,

    /// Search index base URL.
    #[arg(long, env = "ELASTICSEARCH__URL")]
    elasticsearch_url: Option<String>,

    /// Sleep between cycles, e.g. `30s` or `30`.
    #[arg(long, env = "UPDATE_PERIOD")]
    update_period: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            postgres_url: self.postgres_url.clone(),
            redis_url: self.redis_url.clone(),
            elasticsearch_url: self.elasticsearch_url.clone(),
            update_period: self.update_period.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "search-sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> search_sync::Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            SyncConfig::from_yaml_file(path)?
        }
        None => {
            info!("No config file given, using defaults and environment");
            SyncConfig::default()
        }
    };
    args.overrides().apply(&mut config);
    config.validate()?;

    let store = RedisCheckpointStore::connect(&config.redis.url).await?;
    let sink = ElasticsearchSink::new(&config.elasticsearch)?;
    let connector = PgConnector::from_config(&config.postgres);
    let mut synchronizer = Synchronizer::new(config, connector, store, sink);

    if args.once {
        let report = synchronizer.run_cycle().await?;
        info!(
            published = report.documents_published(),
            failed_batches = report.failed_batches(),
            "Single cycle finished"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    synchronizer.run(shutdown_rx).await
}
