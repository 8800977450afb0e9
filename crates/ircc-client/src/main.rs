//! ircc binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect on the default port with the default display name
//! ircc irc.example.net guest secret
//!
//! # Explicit port and display name, verbose log
//! ircc irc.example.net:6697 guest secret "Guest User" --log-level debug
//! ```
//!
//! Type `/JOIN #channel` to join and set the active channel; plain lines go
//! to it. Any other `/COMMAND args` is sent verbatim. End input (Ctrl-D) to
//! quit.

use std::{fs::File, path::PathBuf, sync::Mutex};

use clap::Parser;
use ircc_client::{Client, Config};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Minimal terminal IRC client
#[derive(Parser, Debug)]
#[command(name = "ircc")]
#[command(about = "Minimal terminal IRC client")]
#[command(version)]
struct Args {
    /// Server as HOST or HOST:PORT
    target: String,

    /// Account name, used as nick and user
    username: String,

    /// Connection password (empty string for none)
    password: String,

    /// Display name
    realname: Option<String>,

    /// File the session log is written to
    #[arg(long, default_value = "ircc.log")]
    log_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout belongs to the conversation, so logs go to a file
    let log_file = File::create(&args.log_file)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(log_file)).with_ansi(false))
        .with(filter)
        .init();

    let config = Config::from_target(&args.target, args.username, args.password, args.realname)?;
    tracing::info!(?config, "ircc starting");

    let client = Client::connect(&config)?;
    client.run()?;

    Ok(())
}
