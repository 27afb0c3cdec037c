mod auth;
mod cli;
mod config;
mod error;
mod providers;
mod render;
mod reports;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use error::RunfoError;
use log::info;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting runfo");

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<RunfoError>() {
                Some(RunfoError::Usage(message)) => {
                    eprintln!("{message}");
                    eprint!("{}", config::supported_definitions_help());
                    eprintln!("Run with --help for usage");
                }
                _ => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
