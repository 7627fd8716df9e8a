//! Drives one SQL query end to end from the command line: parses it, runs the plugin pipeline,
//! dispatches the resulting per-chunk queries to the configured workers and prints the merged
//! outcome. Exists mainly as a runnable entry point for the session/dispatch/merge machinery
//! that otherwise only the library crates exercise.

use clap_blocks::ConfigPathConfig;
use observability_deps::tracing::info;
use qserv_qdisp::{Executive, JobDescription, PriorityCommandPool, TcpMessenger};
use qserv_qproc::{ChunkSpec, QuerySession};
use std::sync::Arc;
use thiserror::Error;
use trogging::cli::LoggingConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load configuration: {0}")]
    Config(#[from] qserv_config::ConfigError),
    #[error("no enabled workers are configured to run this query against")]
    NoWorkers,
    #[error("failed to analyze query: {0}")]
    Session(#[from] qserv_qproc::SessionError),
}

#[derive(Debug, clap::Parser)]
#[clap(name = "query", about = "Dispatch one SQL query to the cluster and print the merged result")]
pub struct Config {
    #[clap(flatten)]
    pub logging: LoggingConfig,

    #[clap(flatten)]
    pub config_path: ConfigPathConfig,

    /// The default database the query is resolved against.
    #[clap(long, default_value = "lsst")]
    pub db: String,

    /// The SQL text to run.
    #[clap(long)]
    pub sql: String,
}

/// One chunk's worth of dispatch: the worker it was sent to and the result table the worker is
/// expected to have produced.
struct Dispatched {
    worker: String,
    executive: Arc<Executive>,
}

/// What dispatching and merging a query produced, independent of how it's presented to the user.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub succeeded: bool,
    pub result_tables: Vec<String>,
    pub merge_query: Option<String>,
}

pub async fn command(config: Config) -> Result<(), Error> {
    let configuration = config.config_path.load()?;
    let outcome = dispatch_query(&configuration, &config.db, &config.sql).await?;

    println!(
        "dispatched {} chunk(s), succeeded = {}",
        outcome.result_tables.len(),
        outcome.succeeded
    );
    for table in &outcome.result_tables {
        println!("  result table: {table}");
    }
    if let Some(query) = &outcome.merge_query {
        println!("merge query: {query}");
    }
    Ok(())
}

async fn dispatch_query(
    configuration: &qserv_config::Configuration,
    db: &str,
    sql: &str,
) -> Result<DispatchOutcome, Error> {
    let workers: Vec<_> = configuration.enabled_workers().cloned().collect();
    if workers.is_empty() {
        return Err(Error::NoWorkers);
    }

    let mut session = QuerySession::new(db.to_string());
    session.analyze_query(sql)?;

    // No catalog of which worker holds which chunk is wired up here, so chunks are spread round
    // robin across the enabled workers: one chunk per worker, matching the dummy-chunk fallback
    // every un-restricted query already takes in `QuerySession::finalize`.
    for (i, _worker) in workers.iter().enumerate() {
        session.add_chunk(ChunkSpec::whole_chunk(i as i32));
    }
    session.set_scan_interactive();
    session.finalize()?;

    let templates = session.make_query_templates();
    let pool = Arc::new(PriorityCommandPool::new());
    let worker_pool = pool.clone();
    let worker_loop = tokio::spawn(async move {
        while let Some(cmd) = worker_pool.get_cmd().await {
            cmd().await;
        }
    });

    let mut dispatched = Vec::new();
    for (chunk, worker) in session.chunks().iter().zip(&workers) {
        let spec = session.build_chunk_query_spec(&templates, chunk);
        let addr = format!("{}:{}", worker.svc_host, worker.svc_port);
        let messenger = Arc::new(TcpMessenger::new(addr));
        let executive = Arc::new(Executive::new(pool.clone(), messenger));
        executive.add(
            JobDescription {
                id: chunk.chunk_id,
                chunk_id: chunk.chunk_id,
                chunk_query_spec: spec,
                resultant_table: format!("result_{}", chunk.chunk_id),
            },
            0,
        );
        dispatched.push(Dispatched {
            worker: worker.name.clone(),
            executive,
        });
    }

    let mut all_succeeded = true;
    for job in &dispatched {
        if !job.executive.join().await {
            all_succeeded = false;
        }
    }
    pool.prepare_shutdown();
    let _ = worker_loop.await;

    let mut result_tables = Vec::new();
    for job in &dispatched {
        let outcome = job.executive.finalize(None, "");
        info!(worker = %job.worker, tables = ?outcome.result_tables, "chunk results landed");
        result_tables.extend(outcome.result_tables);
    }

    let merge_query = session.merge_stmt().map(|stmt| stmt.render_query_template());

    info!(
        succeeded = all_succeeded,
        result_tables = ?result_tables,
        merge_query = ?merge_query,
        "query dispatch complete"
    );

    Ok(DispatchOutcome {
        succeeded: all_succeeded,
        result_tables,
        merge_query,
    })
}
