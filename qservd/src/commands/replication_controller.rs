//! Runs the replica placement controller and its `/ingest/v1/*` admin HTTP surface.

use clap_blocks::RunConfig;
use observability_deps::tracing::{info, warn};
use qserv_config::Configuration;
use qserv_job::{Job, JobContext};
use qserv_replica::jobs::{PurgeJob, ReplicateJob};
use qserv_replica::{ChunkLocker, Controller, ControllerIdentity, PgReplicaStore, ReplicaStore, ReplicationLevelCache};
use qserv_time::{SystemProvider, TimeProvider, TimeProviderRef};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::worker_client::TcpWorkerClient;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load configuration: {0}")]
    Config(#[from] qserv_config::ConfigError),
    #[error("replica store error: {0}")]
    Store(#[from] qserv_replica::StoreError),
    #[error("failed to connect to the replica store database: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("admin HTTP surface failed: {0}")]
    Http(#[from] hyper::Error),
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "replication-controller",
    about = "Runs the replica placement controller and its admin HTTP surface"
)]
pub struct Config {
    #[clap(flatten)]
    pub run_config: RunConfig,

    /// Postgres connection string for the replica store.
    #[clap(long = "store-dsn", env = "QSERV_STORE_DSN")]
    pub store_dsn: String,

    /// Address the admin HTTP surface binds to.
    #[clap(long = "bind-address", env = "QSERV_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,
}

pub async fn command(config: Config) -> Result<(), Error> {
    let configuration = Arc::new(config.run_config.load_config()?);

    let pool = sqlx::postgres::PgPoolOptions::new().connect(&config.store_dsn).await?;
    let store: Arc<dyn ReplicaStore> = Arc::new(PgReplicaStore::new(pool));

    let time_provider = Arc::new(SystemProvider::new());
    let client = Arc::new(TcpWorkerClient::new(Arc::clone(&configuration)));
    let identity = ControllerIdentity::new(hostname(), std::process::id());
    let controller = Arc::new(Controller::new(identity.clone(), client, time_provider.clone()));
    controller.register(store.as_ref()).await?;
    info!(controller_id = %identity.id, "replication controller registered");

    let workers: Vec<String> = configuration.enabled_workers().map(|w| w.name.clone()).collect();
    let catalog = Arc::new(qserv_admin_http::DatabaseCatalog::new());
    let ingest_state = Arc::new(qserv_admin_http::IngestState {
        store: Arc::clone(&store),
        catalog,
        time_provider: Arc::clone(&time_provider),
        workers,
    });

    spawn_reconciliation_loop(
        Arc::clone(&configuration),
        controller,
        Arc::clone(&store),
        Arc::new(ChunkLocker::new()),
        Arc::new(ReplicationLevelCache::new()),
        time_provider,
    );

    let addr = SocketAddr::new(config.bind_address, configuration.general.controller_http_port);
    qserv_admin_http::serve(addr, ingest_state).await?;
    Ok(())
}

/// Continuously brings every configured database's replica count toward its family's target
/// level, the way the replication controller is meant to run in the background (spec.md's
/// "RC continuously reconciles replica disposition against the desired family replication
/// level").
fn spawn_reconciliation_loop(
    configuration: Arc<Configuration>,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    locker: Arc<ChunkLocker>,
    level_cache: Arc<ReplicationLevelCache>,
    time_provider: TimeProviderRef,
) {
    let workers: Vec<String> = configuration.enabled_workers().map(|w| w.name.clone()).collect();
    let interval_secs = configuration.general.job_heartbeat_timeout_sec.max(1) as u64;

    for database in configuration.databases.clone() {
        let Some(family) = configuration.family(&database.family).cloned() else {
            warn!(database = %database.name, family = %database.family, "database names an unknown family, skipping reconciliation");
            continue;
        };
        let controller = Arc::clone(&controller);
        let store = Arc::clone(&store);
        let locker = Arc::clone(&locker);
        let level_cache = Arc::clone(&level_cache);
        let time_provider = Arc::clone(&time_provider);
        let workers = workers.clone();
        let database_name = database.name.clone();
        let num_replicas = family.replication_level;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;

                let replicate = ReplicateJob::new(
                    JobContext::new(format!("replicate-{database_name}-{}", Uuid::new_v4()), &time_provider),
                    database_name.clone(),
                    num_replicas,
                    workers.clone(),
                    Arc::clone(&controller),
                    Arc::clone(&store),
                    Arc::clone(&locker),
                    Arc::clone(&level_cache),
                    Arc::clone(&time_provider),
                );
                replicate.execute().await;

                let purge = PurgeJob::new(
                    JobContext::new(format!("purge-{database_name}-{}", Uuid::new_v4()), &time_provider),
                    database_name.clone(),
                    num_replicas,
                    workers.clone(),
                    Arc::clone(&controller),
                    Arc::clone(&store),
                    Arc::clone(&locker),
                    Arc::clone(&level_cache),
                    Arc::clone(&time_provider),
                );
                purge.execute().await;
            }
        });
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
