//! `clap`-derived configuration blocks shared by the `qservd` binary's run modes.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod config_path;
pub mod run_config;

pub use config_path::ConfigPathConfig;
pub use run_config::RunConfig;
