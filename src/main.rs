mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod paths;
mod progress;
mod resource;
mod runner;
mod schema;
mod secret;
mod state;
mod sudo;
mod tasks;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, ConfigCommand, SecretCommand};
use std::io;
use std::process::ExitCode;

use paths::Paths;

/// Per-invocation context built once in `main`
pub struct AppContext {
    pub verbose: u8,
    pub quiet: bool,
    pub paths: Paths,
}

fn main() -> ExitCode {
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

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if let Some(hint) = error::hint_for(&e) {
                ui::dim(&format!("hint: {hint}"));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "keel", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = AppContext {
        verbose: cli.verbose,
        quiet: cli.quiet,
        paths: Paths::resolve()?,
    };

    match cli.command {
        Command::Apply => commands::declarative::apply(&ctx).map(|s| exit_code(&s)),
        Command::Status => commands::declarative::status(&ctx).map(|s| exit_code(&s)),
        Command::Secret(cmd) => match cmd {
            SecretCommand::Keygen { path } => commands::secret::keygen(&ctx, path),
            SecretCommand::Encrypt { file } => commands::secret::encrypt(&ctx, &file),
            SecretCommand::Decrypt { file } => commands::secret::decrypt(&ctx, &file),
        }
        .map(|()| ExitCode::SUCCESS),
        Command::Config(cmd) => match cmd {
            ConfigCommand::Encrypt { remove } => commands::config::encrypt(&ctx, remove),
            ConfigCommand::Decrypt { force } => commands::config::decrypt(&ctx, force),
            ConfigCommand::CacheClear => commands::config::cache_clear(&ctx),
        }
        .map(|()| ExitCode::SUCCESS),
        Command::Doctor => commands::doctor::run(&ctx).map(|()| ExitCode::SUCCESS),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Phase errors exit with status 1
fn exit_code(summary: &declarative::RunSummary) -> ExitCode {
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
