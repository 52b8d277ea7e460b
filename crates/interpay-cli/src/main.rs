//! Interpay CLI — drive peer payment sessions from the terminal.

mod cli;
mod cmd;
mod config;
mod table;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let config = config::load_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Demo {
            amount,
            currency,
            customers,
        } => cmd::demo::cmd_demo(config, amount, &currency, customers),
        Commands::Currencies => {
            cmd::currencies::cmd_currencies();
            Ok(())
        }
        Commands::Config => cmd::config::cmd_config(&config, cli.config.as_deref()),
    };

    if let Err(e) = result {
        ui::error(&e);
        std::process::exit(1);
    }
}
