// stepshift_batch: batch conversion of song files between chart types.
//
// The binary (`main.rs`) is a thin shell over this library so the pipeline
// can be driven from integration tests with a temp directory.
//
// Module overview:
// - `config.rs`:    JSON run configuration, named engine configs, overrides.
// - `error.rs`:     ConfigError, SongError, BatchError.
// - `logging.rs`:   Global tracing subscriber (console and log file).
// - `song.rs`:      `*.chart.json` song documents.
// - `version.rs`:   `[SS vX.Y.Z]` marker on generated charts; overwrite policy.
// - `scheduler.rs`: Bounded thread-per-song batch runner with progress logging.
// - `pipeline.rs`:  Startup (pads, graphs, fallbacks), discovery, per-song conversion.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod song;
pub mod version;
