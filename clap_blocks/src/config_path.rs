use std::path::PathBuf;

/// CLI config naming the cluster configuration file.
#[derive(Debug, Clone, Default, clap::Parser)]
pub struct ConfigPathConfig {
    /// Path to the cluster configuration file. Falls back to the `QSERV_CONFIG` environment
    /// variable, then to `replication.cfg`, if not given.
    #[clap(long = "config", env = "QSERV_CONFIG")]
    pub config: Option<PathBuf>,
}

impl ConfigPathConfig {
    /// Loads and validates the configuration this flag names.
    pub fn load(&self) -> Result<qserv_config::Configuration, qserv_config::ConfigError> {
        qserv_config::load(self.config.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_explicit_path() {
        let config = ConfigPathConfig::default();
        assert!(config.config.is_none());
    }
}
