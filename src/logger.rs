use std::path::PathBuf;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Where and how verbosely the crate logs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogConfig {
    /// An `EnvFilter` directive, e.g. `"info"` or `"framebus=debug"`.
    pub log_level: String,

    /// When set, logs also go to a daily-rolling `framebus.log` in this
    /// directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Install the tracing subscriber.
///
/// Idempotent: when an embedding host has already installed one, this
/// quietly leaves it in place.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.log_level)?;
    let fmt_layer = fmt::layer().with_target(true);

    match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "framebus.log");
            let file_layer = fmt::layer().with_writer(appender).with_ansi(false);
            let _ = Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .with(file_layer)
                .try_init();
        }
        None => {
            let _ = Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .try_init();
        }
    }
    Ok(())
}
