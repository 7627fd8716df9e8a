mod commands;
mod worker_client;

use clap::Parser;
use commands::Command;
use trogging::cli::LoggingConfig;

fn logging_config(command: &Command) -> &LoggingConfig {
    match command {
        Command::ReplicationController(config) => &config.run_config.logging,
        Command::CheckConfig(config) => &config.logging,
        Command::Query(config) => &config.logging,
    }
}

#[derive(Debug, Parser)]
#[clap(name = "qservd", about = "Qserv replication controller daemon")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = trogging::init(logging_config(&cli.command)) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = commands::command(cli.command).await {
        observability_deps::tracing::error!(error = %e, "qservd exiting with an error");
        std::process::exit(1);
    }
}
