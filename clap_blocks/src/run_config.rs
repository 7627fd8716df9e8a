use crate::config_path::ConfigPathConfig;
use trogging::cli::LoggingConfig;

/// Flags shared by every `qservd` run mode: logging and the cluster configuration file.
#[derive(Debug, Clone, Default, clap::Parser)]
pub struct RunConfig {
    #[clap(flatten)]
    pub logging: LoggingConfig,

    #[clap(flatten)]
    pub config_path: ConfigPathConfig,
}

impl RunConfig {
    pub fn load_config(&self) -> Result<qserv_config::Configuration, qserv_config::ConfigError> {
        self.config_path.load()
    }
}
