// Entrypoint for the CLI application.
// - Keeps `main` small: load `.env`, parse flags, set up logging, hand over to the UI.
// - Logs go to stderr so the upload report on stdout stays readable.

use clap::Parser;
use dataset_sync_cli::ui::{self, Cli};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> std::process::ExitCode {
    // Before parsing, so `env = ...` flags see values from `.env` too.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Ignoring unreadable .env file: {e}"),
    }

    ui::run(cli).into()
}
