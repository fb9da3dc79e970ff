use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "queuebot")]
#[command(author, version, about = "Telegram bot that downloads videos through a single-worker queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the bot (default)
    Run,

    /// Validate the environment configuration and external tools, then exit
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
