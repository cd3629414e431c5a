//! Response Verifier CLI entry point.

use clap::Parser;

use response_verifier::cli::{commands, handle_error, Cli, Commands};
use response_verifier::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Verify(args) => commands::verify::execute(args, config, cli.json).await,
        Commands::Worker(args) => commands::worker::execute(args, config, cli.json).await,
        Commands::Update(args) => commands::update::execute(args, config, cli.json).await,
        Commands::Status(args) => commands::status::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        drop(logger);
        handle_error(err, cli.json);
    }
}
