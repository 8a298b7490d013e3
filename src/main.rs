mod auth;
mod cli;
mod config;
mod error;
mod extract;
mod orchestrator;
mod output;
mod poller;
mod providers;
mod vcs;

use clap::Parser;
use cli::Cli;
use log::{error, info};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting CIFix");

    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
