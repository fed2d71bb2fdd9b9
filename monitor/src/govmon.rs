//! Governance monitor daemon.
//!
//! Spawns one polling task per enabled source, each owning its state
//! shard, adapter and dispatcher. Ctrl-C cancels the shared token; the
//! tasks finish their in-flight cycle and are given a bounded drain
//! window before the process exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lib_common::alerts::SlackSink;
use lib_common::configs::{load_watchlist, PollConfig, Settings};
use lib_common::core::{
    AdminAlertStore, AdminAlertTracker, AlertDispatcher, AlertSink, PollSettings, SourceAdapter,
    SourceRuntime, StateStore, TransitionTable,
};
use lib_common::loggers::setup_logging;
use lib_common::sources::{CosmosAdapter, SkyAdapter, SnapshotAdapter, TallyAdapter, XrplAdapter};

const ALL_SOURCES: &[&str] = &["snapshot", "tally", "cosmos", "sky", "xrpl"];

#[derive(Parser, Debug)]
#[command(name = "govmon", about = "Governance proposal monitor and alerter")]
struct Args {
    /// Comma-separated list of sources to run (default: all).
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Run a single reconciliation cycle per source and exit.
    #[arg(long)]
    once: bool,

    /// Seconds to wait for in-flight cycles to finish at shutdown.
    #[arg(long, default_value_t = 30)]
    drain_timeout: u64,
}

fn build_adapter(source: &str, settings: &Settings) -> Result<Option<Arc<dyn SourceAdapter>>> {
    let adapter: Arc<dyn SourceAdapter> = match source {
        "snapshot" => Arc::new(SnapshotAdapter::new()),
        "tally" => {
            let Some(api_key) = settings.tally_api_key.clone() else {
                warn!("TALLY_API_KEY not set, tally source disabled");
                return Ok(None);
            };
            Arc::new(TallyAdapter::new(api_key).context("failed to build tally client")?)
        }
        "cosmos" => Arc::new(CosmosAdapter::new()),
        "sky" => Arc::new(SkyAdapter::new()),
        "xrpl" => Arc::new(XrplAdapter::new()),
        other => {
            warn!(source = other, "unknown source name, skipping");
            return Ok(None);
        }
    };
    Ok(Some(adapter))
}

fn build_runtime(
    source: &str,
    settings: &Settings,
    sink: Arc<dyn AlertSink>,
) -> Result<Option<SourceRuntime>> {
    let Some(adapter) = build_adapter(source, settings)? else {
        return Ok(None);
    };

    let targets = load_watchlist(&settings.watchlist_dir, source)
        .with_context(|| format!("failed to load {source} watchlist"))?;
    if targets.is_empty() {
        info!(source, "no targets configured, source disabled");
        return Ok(None);
    }

    let Some(table) = TransitionTable::for_source(source) else {
        warn!(source, "no transition table for source, skipping");
        return Ok(None);
    };

    let store = StateStore::open(settings.state_path(source))
        .with_context(|| format!("failed to open {source} state shard"))?;
    let admin_store = AdminAlertStore::open(settings.admin_state_path(source))
        .with_context(|| format!("failed to open {source} admin alert state"))?;

    let dispatcher = AlertDispatcher::new(source, sink.clone());
    let admin = AdminAlertTracker::new(source, admin_store, sink);

    let poll = PollConfig::from_env(source)?;
    let poll_settings = PollSettings {
        poll_interval: poll.poll_interval,
        min_fetch_gap: poll.min_fetch_gap,
        max_retries: poll.max_retries,
        backoff_base: poll.backoff_base,
    };

    Ok(Some(SourceRuntime::new(
        adapter,
        dispatcher,
        admin,
        store,
        table,
        targets,
        poll_settings,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up environment variables before anything reads them
    dotenvy::dotenv().ok();

    let _log_guard = setup_logging("govmon").context("failed to initialize logging")?;

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let sink: Arc<dyn AlertSink> = Arc::new(
        SlackSink::new(settings.slack_bot_token.clone(), settings.channels.clone())
            .context("failed to build Slack client")?,
    );

    let enabled: Vec<String> = if args.sources.is_empty() {
        ALL_SOURCES.iter().map(|s| s.to_string()).collect()
    } else {
        args.sources.clone()
    };

    let mut runtimes = Vec::new();
    for source in &enabled {
        if let Some(runtime) = build_runtime(source, &settings, sink.clone())? {
            runtimes.push((source.clone(), runtime));
        }
    }

    if runtimes.is_empty() {
        warn!("no sources enabled, nothing to do");
        return Ok(());
    }

    if args.once {
        for (source, mut runtime) in runtimes {
            info!(source = %source, "running single cycle");
            if let Err(e) = runtime.run_cycle().await {
                error!(source = %source, error = %e, "cycle failed");
            }
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for (source, runtime) in runtimes {
        let token = cancel.child_token();
        let handle = tokio::spawn(runtime.run(token));
        handles.push((source, handle));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested, draining source tasks");
    cancel.cancel();

    let drain = Duration::from_secs(args.drain_timeout);
    for (source, handle) in handles {
        match tokio::time::timeout(drain, handle).await {
            Ok(Ok(())) => info!(source = %source, "source task stopped"),
            Ok(Err(e)) => error!(source = %source, error = %e, "source task panicked"),
            Err(_) => warn!(source = %source, "source task did not stop within drain window"),
        }
    }

    info!("shutdown complete");
    Ok(())
}
