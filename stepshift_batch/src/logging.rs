// Logger setup for the batch binary.
//
// One global `tracing` subscriber with up to two fmt layers: console
// (stderr, colored) and an optional append-only log file without ANSI
// escapes. The level comes from `LogConfig::level`; both layers share it.
// Chart-level lines carry the chart's log id in the message itself, so no
// spans are needed.

use crate::config::LogConfig;
use crate::error::BatchError;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. Fails if the level is invalid, the log
/// file cannot be opened, or a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), BatchError> {
    let level = config.level_filter()?;

    let console = config
        .log_to_console
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let file = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| BatchError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| BatchError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| BatchError::Logger(e.to_string()))
}
