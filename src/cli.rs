//! コマンドライン引数。サブコマンドなしで起動した場合は `serve` と同じ。
use std::num::NonZeroUsize;

use clap::{Parser, Subcommand};

use crate::pipeline::Section;

#[derive(Parser, Debug)]
#[command(author, version, about = "NYT archive keyword frequency service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API
    Serve,

    /// Print one month's keyword report as JSON
    Report {
        /// Archive year (1851 or later)
        #[arg(long)]
        year: i32,

        /// Month number, 1-12
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,

        /// Number of keywords to keep (defaults to KEYWORDS_TOP_N)
        #[arg(long)]
        top: Option<NonZeroUsize>,

        /// Section slug such as `world` or `business`
        #[arg(long, default_value = "all")]
        section: Section,
    },

    /// Drop every cached article and fetched-month marker
    Drop {
        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    #[must_use]
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
