//! Loads and validates a cluster configuration file without starting any service.

use clap_blocks::ConfigPathConfig;
use observability_deps::tracing::info;
use thiserror::Error;
use trogging::cli::LoggingConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load configuration: {0}")]
    Config(#[from] qserv_config::ConfigError),
}

#[derive(Debug, clap::Parser)]
#[clap(name = "check-config", about = "Loads and validates the cluster configuration file")]
pub struct Config {
    #[clap(flatten)]
    pub logging: LoggingConfig,

    #[clap(flatten)]
    pub config_path: ConfigPathConfig,
}

pub async fn command(config: Config) -> Result<(), Error> {
    let configuration = config.config_path.load()?;
    info!(
        workers = configuration.workers.len(),
        families = configuration.families.len(),
        databases = configuration.databases.len(),
        "configuration is valid"
    );
    Ok(())
}
