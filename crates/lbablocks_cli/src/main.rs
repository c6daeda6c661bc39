use clap::{CommandFactory, Parser};
use log::{LevelFilter, debug};

use crate::cli::{AngleUnitCli, Cli, DecompileCommand, OutputModeCli, TopLevel};

mod cli;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(TopLevel::Decompile { command }) => match command {
            DecompileCommand::File {
                path,
                mode,
                actor,
                angles,
                strict,
            } => {
                let mode = match mode {
                    OutputModeCli::Tree => lbablocks_lib::OutputMode::Tree,
                    OutputModeCli::Json => lbablocks_lib::OutputMode::Json,
                    OutputModeCli::Listing => lbablocks_lib::OutputMode::Listing,
                };
                let angles = match angles {
                    AngleUnitCli::Raw => lbablocks_lib::AngleUnit::Raw,
                    AngleUnitCli::Degrees => lbablocks_lib::AngleUnit::Degrees,
                };
                debug!("reading {path:?}");
                match std::fs::read(&path) {
                    Ok(bytes) => match lbablocks_lib::decompile_with_options(
                        &bytes,
                        lbablocks_lib::DecompileOptions {
                            mode,
                            angles,
                            strict,
                            actor,
                        },
                    ) {
                        Ok(out) => {
                            print!("{out}");
                        }
                        Err(e) => {
                            eprintln!("decompile error: {e}");
                            std::process::exit(1);
                        }
                    },
                    Err(e) => {
                        eprintln!("failed to read {path:?}: {e}");
                        std::process::exit(1);
                    }
                }
            }
        },
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("failed to print help: {e}");
                std::process::exit(1);
            }
        }
    }
}
