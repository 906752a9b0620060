//! Privflow CLI entry point.

use clap::Parser;

use privflow::cli::commands::{artifact, inbox, init, reminders, workflow};
use privflow::cli::{Cli, Commands};
use privflow::infrastructure::config::ConfigLoader;
use privflow::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => privflow::cli::handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => privflow::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => init::execute(args, cli.json).await,
        Commands::Artifact(args) => artifact::execute(args, cli.json).await,
        Commands::Transition(args) => workflow::execute_transition(args, cli.json).await,
        Commands::Block(args) => workflow::execute_block(args, true, cli.json).await,
        Commands::Unblock(args) => workflow::execute_block(args, false, cli.json).await,
        Commands::Progress(args) => workflow::execute_progress(args, cli.json).await,
        Commands::Metrics(args) => workflow::execute_metrics(args, cli.json).await,
        Commands::History(args) => workflow::execute_history(args, cli.json).await,
        Commands::Stages(args) => workflow::execute_stages(&args, cli.json),
        Commands::Reminders(args) => reminders::execute(args, cli.json).await,
        Commands::Inbox(args) => inbox::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        privflow::cli::handle_error(err, cli.json);
    }
}
