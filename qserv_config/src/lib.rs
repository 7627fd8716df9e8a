//! The cluster configuration data model and its file loader: workers, database families,
//! databases and the general tunables shared by every process.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod loader;
pub mod model;

pub use loader::{load, ConfigError, CONFIG_PATH_ENV_VAR, DEFAULT_CONFIG_PATH};
pub use model::{Configuration, DatabaseConfig, FamilyConfig, GeneralConfig, InvalidFamilyConfig, WorkerConfig};
