//! qspimem - Bench for a flash-backed crypto memory controller
//!
//! Runs the cycle-level controller from `qspimem-core` against the SPI NOR
//! emulator from `qspimem-dummy` and drives it with host requests, the way
//! the AES and SHA accelerators would.

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);

    match &cli.command {
        Commands::Startup => commands::run_startup(&config),
        Commands::Write { request, data } => commands::run_write(&config, request, data.as_ref()),
        Commands::Read {
            request,
            kind,
            preload,
        } => commands::run_read(&config, request, *kind, preload.as_ref()),
        Commands::Roundtrip { request } => commands::run_roundtrip(&config, request),
        Commands::Stress { iterations } => commands::run_stress(&config, *iterations),
        Commands::Trace { request } => commands::run_trace(&config, request),
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
