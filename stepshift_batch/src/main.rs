// stepshift: command-line entry point for the batch converter.
//
// Loads the JSON config (or the built-in defaults when the default path does
// not exist), applies command-line overrides, installs logging, and runs the
// pipeline. Startup failures print to stderr and exit with status 1; per-song
// failures are logged and do not change the exit status.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use stepshift_batch::config::Config;
use stepshift_batch::error::BatchError;
use stepshift_batch::{logging, pipeline};

const DEFAULT_CONFIG_PATH: &str = "stepshift.json";

#[derive(Parser, Debug)]
#[command(name = "stepshift", version, about = "Retarget step charts between pad layouts")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the input song directory
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Override the output song directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the number of songs processed at once (0 = one per CPU)
    #[arg(long)]
    concurrency: Option<usize>,
}

fn load_config(cli: &Cli) -> Result<Config, BatchError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };
    if let Some(input) = &cli.input {
        config.input_directory = input.clone();
    }
    if let Some(output) = &cli.output {
        config.output_directory = output.clone();
    }
    if let Some(n) = cli.concurrency {
        config.concurrent_song_count = n;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stepshift: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("stepshift: {e}");
        return ExitCode::FAILURE;
    }
    match pipeline::run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("stepshift: {e}");
            ExitCode::FAILURE
        }
    }
}
