use crate::model::Configuration;
use observability_deps::tracing::info;
use std::path::{Path, PathBuf};

/// Built-in fallback path used when neither `--config` nor the environment variable name it.
pub const DEFAULT_CONFIG_PATH: &str = "replication.cfg";

/// Environment variable consulted when no `--config` flag was passed.
pub const CONFIG_PATH_ENV_VAR: &str = "QSERV_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] crate::model::InvalidFamilyConfig),
}

/// Resolves which file to load, following `--config` > environment > built-in default, then
/// parses and validates it.
///
/// `cli_path` is the value of an explicit `--config` flag, if one was given on the command line.
pub fn load(cli_path: Option<&Path>) -> Result<Configuration, ConfigError> {
    let path = resolve_path(cli_path);
    info!(path = %path.display(), "loading configuration");
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: Configuration = toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;
    Ok(config)
}

fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV_VAR) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatabaseConfig, FamilyConfig};
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
            [[workers]]
            name = "worker-a"
            svc_host = "localhost"
            svc_port = 25000
            fs_host = "localhost"
            fs_port = 25001
            data_dir = "/data/worker-a"
            loader_host = "localhost"
            loader_port = 25002

            [[families]]
            name = "lsst"
            replication_level = 2
            num_stripes = 85
            num_sub_stripes = 12

            [[databases]]
            name = "lsst_main"
            family = "lsst"
        "#
    }

    #[test]
    fn cli_path_wins_over_env_and_default() {
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.workers.len(), 1);
        assert_eq!(config.worker("worker-a"), config.workers.first());
        assert_eq!(
            config.databases,
            vec![DatabaseConfig {
                name: "lsst_main".to_string(),
                family: "lsst".to_string(),
            }]
        );
    }

    #[test]
    fn env_var_is_used_when_no_cli_path_given() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();
        std::env::set_var(CONFIG_PATH_ENV_VAR, file.path());

        let config = load(None).unwrap();
        assert_eq!(config.families, vec![FamilyConfig {
            name: "lsst".to_string(),
            replication_level: 2,
            num_stripes: 85,
            num_sub_stripes: 12,
        }]);

        std::env::remove_var(CONFIG_PATH_ENV_VAR);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        let err = load(Some(Path::new("/nonexistent/replication.cfg"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_family_invariant_is_rejected() {
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
                [[families]]
                name = "lsst"
                replication_level = 2
                num_stripes = 0
                num_sub_stripes = 12
            "#,
        )
        .unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
