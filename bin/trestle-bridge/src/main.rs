//! The Trestle bridge relay node: observes deposits on the source chain and
//! releases them on the destination chain once they are deep enough.

use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context};
use clap::Parser;
use config::Config;
use constants::{
    DB_FILE, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_THREAD_COUNT, DEFAULT_THREAD_STACK_SIZE,
};
use params::Params;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::{runtime, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use trestle_chain::rpc::{WsDestinationClient, WsSourceClient};
use trestle_common::{logging, logging::LoggerConfig};
use trestle_db::persistent::sqlite::SqliteDb;
use trestle_relayer::{
    admin::AdminOps,
    monitor::DepositMonitor,
    queue::JobQueue,
    recovery::StartupRecovery,
    worker::{RelayPolicy, RelayWorkerPool},
};

mod args;
mod config;
mod constants;
mod params;
mod rpc_server;

fn main() {
    logging::init(LoggerConfig::with_base_name("trestle-bridge"));

    let cli = args::Cli::parse();
    info!("starting relay node");

    let params = parse_toml::<Params>(cli.params);
    let config = parse_toml::<Config>(cli.config);

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .thread_stack_size(
            config
                .thread_stack_size
                .unwrap_or(DEFAULT_THREAD_STACK_SIZE),
        )
        .enable_all()
        .build()
        .expect("must be able to create runtime");

    if let Err(e) = runtime.block_on(run(params, config)) {
        panic!("relay node crashed: {e:?}");
    }

    info!("relay node shutdown complete");
}

/// Wires the pipeline together and runs it until a shutdown signal arrives.
async fn run(params: Params, config: Config) -> anyhow::Result<()> {
    fs::create_dir_all(&config.datadir).context("create datadir")?;

    let db_path = config.datadir.join(DB_FILE);
    let connect_options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await
        .context("open sqlite database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("run migrations")?;
    debug!(path = %db_path.display(), "database ready");

    let db = Arc::new(SqliteDb::new(pool));

    info!(url = %config.source_rpc_url, "connecting to the source bridge node");
    let source = Arc::new(
        WsSourceClient::connect(&config.source_rpc_url)
            .await
            .context("connect to source bridge node")?,
    );
    let source_chain = source.chain_id().await.context("query source chain id")?;
    if source_chain != params.source.chain_id {
        bail!(
            "source node is on chain {source_chain}, params expect {}",
            params.source.chain_id
        );
    }

    info!(url = %config.dest_rpc_url, "connecting to the destination bridge node");
    let destination = Arc::new(
        WsDestinationClient::connect(&config.dest_rpc_url)
            .await
            .context("connect to destination bridge node")?,
    );
    let dest_chain = destination.chain_id().await.context("query destination chain id")?;
    if dest_chain != params.dest.chain_id {
        bail!(
            "destination node is on chain {dest_chain}, params expect {}",
            params.dest.chain_id
        );
    }

    let queue = JobQueue::new(Arc::clone(&db), params.tiers, config.queue);

    // Reconcile whatever a previous run left behind before any worker can
    // claim its first job.
    StartupRecovery::new(Arc::clone(&db), queue.clone(), Arc::clone(&destination))
        .run()
        .await
        .context("startup recovery")?;

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    let monitor = DepositMonitor::new(
        Arc::clone(&db),
        queue.clone(),
        Arc::clone(&source),
        config.monitor,
        params.source,
    );
    let observed_head = monitor.observed_head();
    {
        let shutdown = shutdown.clone();
        tasks.spawn(async move { monitor.run(shutdown).await });
    }

    let policy = RelayPolicy {
        source: params.source,
        limits: params.limits.clone(),
        retry: params.retry,
    };
    let workers = Arc::new(RelayWorkerPool::new(
        Arc::clone(&db),
        queue.clone(),
        Arc::clone(&source),
        Arc::clone(&destination),
        config.worker,
        policy,
    ));
    workers.spawn(&mut tasks, shutdown.clone());

    let admin = Arc::new(AdminOps::new(Arc::clone(&db), queue.clone()));
    let rpc_impl = rpc_server::BridgeRpc::new(db, config.db.clone(), queue, admin, observed_head);
    {
        let shutdown = shutdown.clone();
        let rpc_addr = config.rpc_addr.clone();
        tasks.spawn(async move {
            if let Err(err) = rpc_server::start_rpc(&rpc_impl, &rpc_addr, shutdown).await {
                error!(%err, "rpc server exited with an error");
            }
        });
    }

    wait_for_signal().await?;
    info!("shutdown signal received, draining tasks");
    shutdown.cancel();

    let timeout = config.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!(?timeout, "tasks did not wind down in time, aborting them");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    Ok(())
}

/// Completes when the process is asked to stop.
#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("install sigterm handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }

    Ok(())
}

/// Completes when the process is asked to stop.
#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("listen for ctrl-c")?;

    Ok(())
}

/// Reads and parses a TOML file from the given path into the given type `T`.
///
/// # Panics
///
/// 1. If the file is not readable.
/// 2. If the contents of the file cannot be deserialized into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> T
where
    T: std::fmt::Debug + DeserializeOwned,
{
    fs::read_to_string(path)
        .map(|p| {
            trace!(?p, "read file");

            let parsed = toml::from_str::<T>(&p).unwrap_or_else(|e| {
                panic!("failed to parse TOML file: {e:?}");
            });
            debug!(?parsed, "parsed TOML file");

            parsed
        })
        .unwrap_or_else(|_| {
            panic!("failed to read TOML file");
        })
}
