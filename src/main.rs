//! finrag CLI entry point.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use finrag::cli::{Cli, execute};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "FINRAG_LOG";

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(&cli) {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            writeln!(io::stderr().lock(), "Error: {e}")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Installs the stderr log subscriber.
///
/// `--verbose` forces `debug`; otherwise `FINRAG_LOG` applies, defaulting
/// to `warn`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
