mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stembox::config::Config;
use stembox::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let config = match cli.backend {
        Some(url) => config.with_backend_url(url)?,
        None => config,
    };

    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Process(args) => commands::process(&config, args).await?,
        Commands::Watch(args) => commands::watch(&config, args).await?,
        Commands::Download(args) => commands::download(&config, args).await?,
    }

    Ok(())
}
