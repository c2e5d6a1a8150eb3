//! jqurl - fetch JSON from one of several URLs and query it with jq syntax

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jqurl::app;
use jqurl::cli::Cli;
use jqurl::config::RunConfig;
use jqurl::Error;

/// Logs go to stderr so stdout carries only query results.
/// `RUST_LOG` wins over `--debug`.
fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("jqurl=debug")
        } else {
            EnvFilter::new("jqurl=warn")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = RunConfig::from_cli(cli)?;
    app::run(&config).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
