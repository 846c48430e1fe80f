//! Process-wide logging.
//!
//! The libraries log through the `log` facade; records are bridged into a
//! `tracing` subscriber that formats them to stdout.

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global subscriber. Call once, before any world starts.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.module_path)
        .with_thread_names(true);

    if config.time {
        tracing::subscriber::set_global_default(builder.finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }
    Ok(())
}
