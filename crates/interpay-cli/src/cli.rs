//! Clap CLI definitions for Interpay.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  interpay demo                       One merchant, two customers, MXN 100
  interpay demo --amount 42.5 --currency USD --customers 3
  interpay currencies                 List supported currencies
  interpay config                     Print the effective configuration

\x1b[1;36mLogging:\x1b[0m
  RUST_LOG=debug interpay demo        Show session internals";

/// Interpay: payment requests between nearby devices.
#[derive(Parser)]
#[command(
    name = "interpay",
    version,
    about = "Interpay: send payment requests to nearby devices",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a merchant and customers on an in-process network and send one
    /// payment request.
    Demo {
        /// Amount to request.
        #[arg(long, default_value_t = 100.0)]
        amount: f64,
        /// Three-letter currency code.
        #[arg(long, default_value = "MXN")]
        currency: String,
        /// Number of customer devices.
        #[arg(long, default_value_t = 2)]
        customers: usize,
    },
    /// List supported currencies.
    Currencies,
    /// Print the effective configuration as TOML.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_defaults() {
        let cli = Cli::try_parse_from(["interpay", "demo"]).unwrap();
        match cli.command {
            Commands::Demo {
                amount,
                currency,
                customers,
            } => {
                assert_eq!(amount, 100.0);
                assert_eq!(currency, "MXN");
                assert_eq!(customers, 2);
            }
            _ => panic!("expected demo"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["interpay", "config", "--config", "/tmp/x.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["interpay"]).is_err());
    }
}
