use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use evented_lines::{run, DemandSource, PipelineConfig, TracingDiagnostics};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "numlines")]
#[command(about = "Print each line of a file prefixed with its line number")]
struct Cli {
    /// File to read.
    path: PathBuf,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = PipelineConfig::default();
    let source = Arc::new(DemandSource::file(cli.path, config.chunk_size));
    let mut stdout = tokio::io::stdout();

    // Source failures are reported through `TracingDiagnostics` and end the
    // output early; only a failing stdout changes the exit status.
    match run(source, &config, &mut stdout, Box::new(TracingDiagnostics)).await {
        Ok(lines) => {
            tracing::debug!(lines, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
