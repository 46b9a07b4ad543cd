//! tvlink CLI - Android TV remote control from the terminal
//!
//! tvlink pairs with an Android TV over the TV remote protocol, then sends
//! keys, text and app links to it.
//!
//! ## Quick Start
//!
//! ```bash
//! # Pair once (enter the code shown on the TV)
//! tvlink pair 192.168.1.50
//!
//! # Interactive remote
//! tvlink connect 192.168.1.50
//!
//! # One-shot commands
//! tvlink key 192.168.1.50 HOME
//! tvlink text 192.168.1.50 "hello"
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Connect(args) => commands::connect::run(args, cli.config).await,
        Command::Pair(args) => commands::pair::run(args, cli.config).await,
        Command::Key(args) => commands::control::run_key(args, cli.config).await,
        Command::Text(args) => commands::control::run_text(args, cli.config).await,
        Command::Launch(args) => commands::control::run_launch(args, cli.config).await,
        Command::Probe(args) => commands::probe::run(args, cli.config).await,
        Command::Devices(args) => commands::devices::run(args, cli.config).await,
        Command::Unpair(args) => commands::devices::run_unpair(args, cli.config).await,
        Command::Reset(args) => commands::devices::run_reset(args, cli.config).await,
        Command::Screenshot(args) => commands::debug::run_screenshot(args, cli.config).await,
        Command::Mirror(args) => commands::debug::run_mirror(args, cli.config).await,
        Command::Config(args) => commands::config::run(args, cli.config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        ui::print_hint(&e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,tvlink=debug,tvlink_core=debug"
    } else {
        "warn,tvlink=info,tvlink_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
