// Chain indexer - CLI

use chain_indexer::{Cli, CliHandler};
use clap::Parser;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let handler = CliHandler::new(cli.config.into());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error initializing: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(handler.handle(cli.command)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
