//! Command-line interface

use clap::{Parser, Subcommand};

/// Telegram referral reward bot with an admin payout dashboard
#[derive(Parser, Debug)]
#[command(name = "refearn", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot and the admin dashboard (the default)
    Run {
        /// Skip starting the admin dashboard
        #[arg(long)]
        no_dashboard: bool,
    },
    /// Create the database schema and exit
    InitDb,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
