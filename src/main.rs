mod cli;
mod commands;
mod config;
mod engine;
mod local;
mod progress;
mod registry;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, EntitlementsCommand};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };

    match cli.command {
        Command::Entitle(args) => commands::entitlements::entitle(&ctx, args),
        Command::Revoke(args) => commands::entitlements::revoke(&ctx, args),
        Command::Upgrade(args) => commands::entitlements::upgrade(&ctx, args),
        Command::Sync(args) => commands::entitlements::sync(&ctx, args),
        Command::Plan(args) => commands::entitlements::plan(&ctx, args),
        Command::Validate(args) => commands::entitlements::validate(&ctx, args),
        Command::Flows(cmd) => commands::flows::run(&ctx, cmd),
        Command::Entitlements(cmd) => match cmd {
            EntitlementsCommand::List { tenant } => commands::entitlements::list(&ctx, &tenant),
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "entitlements", &mut io::stdout());
            Ok(())
        }
    }
}
