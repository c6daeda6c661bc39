use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, builder::{Styles, styling::{AnsiColor, Effects}}, crate_description, crate_version};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputModeCli {
    Tree,
    Json,
    Listing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AngleUnitCli {
    Raw,
    Degrees,
}

#[derive(Parser)]
#[command(name = "lbablocks",
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Decompiles actor scripts into block graphs
    Decompile {
        #[command(subcommand)]
        command: DecompileCommand,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum DecompileCommand {
    /// Decompiles a scene, actor or script JSON file
    File {
        /// Path to the JSON file
        path: PathBuf,

        /// Output mode
        #[arg(long, value_enum, default_value_t = OutputModeCli::Tree)]
        mode: OutputModeCli,

        /// Only output the actor with this index
        #[arg(long)]
        actor: Option<i64>,

        /// Unit used for angle arguments and operands
        #[arg(long, value_enum, default_value_t = AngleUnitCli::Raw)]
        angles: AngleUnitCli,

        /// Fail on dangling references and structural problems
        #[arg(long, default_value_t = false)]
        strict: bool,
    }
}
