// src/main.rs
mod cli;
mod commands;
mod config;
mod gui;
mod pipeline;
mod recorder;
mod replay;
mod serial;
mod types;
use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use cli::{Cli, Command};
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG still wins when set.
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .parse_default_env()
        .init();
}
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let session = &cli.session;
    let snapshot = session.snapshot.as_deref();
    match cli.command.unwrap_or(Command::Monitor) {
        Command::Ports => commands::ports(),
        Command::Monitor => commands::monitor(&session.resolve()?, session.simulate, snapshot),
        Command::Record(args) => {
            commands::record(&session.resolve()?, session.simulate, args.duration, snapshot)
        }
        Command::Replay(args) => {
            commands::replay(&session.resolve()?, args.log.as_deref(), args.readings)
        }
    }
}
