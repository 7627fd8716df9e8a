pub mod check_config;
pub mod query;
pub mod replication_controller;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error in replication-controller subcommand: {0}")]
    ReplicationController(#[from] replication_controller::Error),
    #[error("error in check-config subcommand: {0}")]
    CheckConfig(#[from] check_config::Error),
    #[error("error in query subcommand: {0}")]
    Query(#[from] query::Error),
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Run the replica placement controller and its admin HTTP surface.
    ReplicationController(replication_controller::Config),

    /// Load and validate a cluster configuration file, then exit.
    CheckConfig(check_config::Config),

    /// Parse, dispatch and merge a single SQL query against the configured workers.
    Query(query::Config),
}

pub async fn command(command: Command) -> Result<(), Error> {
    match command {
        Command::ReplicationController(config) => Ok(replication_controller::command(config).await?),
        Command::CheckConfig(config) => Ok(check_config::command(config).await?),
        Command::Query(config) => Ok(query::command(config).await?),
    }
}
