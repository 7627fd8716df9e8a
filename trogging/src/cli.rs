//! `clap`-derived logging flags, flattened into every binary's `RunConfig`.

use crate::LogFormat;

/// Logging configuration flags common to every `qservd` run mode.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
pub struct LoggingConfig {
    /// Log filter directives, in `tracing_subscriber::EnvFilter` syntax
    /// (e.g. `info,qserv_qdisp=debug`). Defaults to `info`.
    #[cfg_attr(
        feature = "clap",
        clap(long = "log-filter", env = "LOG_FILTER", action)
    )]
    pub log_filter: Option<String>,

    /// Log output encoding.
    #[cfg_attr(
        feature = "clap",
        clap(long = "log-format", env = "LOG_FORMAT", default_value = "logfmt", action)
    )]
    pub log_format: LogFormat,
}

#[cfg(feature = "clap")]
impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logfmt" => Ok(Self::Logfmt),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(format!("invalid log format '{other}', expected logfmt|json|full")),
        }
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Logfmt
    }
}
