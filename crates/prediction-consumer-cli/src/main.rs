mod app;
mod cli;
mod config;
mod logging;

use clap::Parser;
use cli::Cli;
use config::Settings;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; real env vars win over it
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _guard = match logging::init(cli.log_path.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match app::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = format!("{err:#}"), "Prediction consumer failed");
            ExitCode::FAILURE
        }
    }
}
