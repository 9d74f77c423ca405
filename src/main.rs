// src/main.rs

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

/// Lines of captured stage output shown when a stage fails
const FAILURE_OUTPUT_LINES: usize = 40;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let root = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<formulary::Error>());
            if let Some(output) = root.and_then(|e| e.captured_output()) {
                print_output_tail(output);
            }
            let code = root.map(|e| e.exit_code()).unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Install {
            recipe,
            test,
            force,
            overrides,
        } => commands::cmd_install(&recipe, config_path, &overrides, test, force, show_progress),
        Commands::Test { recipe, overrides } => commands::cmd_test(&recipe, config_path, &overrides),
        Commands::Fetch { recipe, overrides } => {
            commands::cmd_fetch(&recipe, config_path, &overrides, show_progress)
        }
        Commands::Check { recipe, overrides } => commands::cmd_check(&recipe, config_path, &overrides),
    }
}

fn print_output_tail(output: &str) {
    let lines: Vec<&str> = output.lines().collect();
    if lines.is_empty() {
        return;
    }
    let start = lines.len().saturating_sub(FAILURE_OUTPUT_LINES);
    eprintln!("--- last {} lines of output ---", lines.len() - start);
    for line in &lines[start..] {
        eprintln!("{}", line);
    }
}
