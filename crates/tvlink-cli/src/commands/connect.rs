//! Connect command implementation: an interactive remote.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use tvlink_core::protocol::{KeyCode, KeyDirection};
use tvlink_core::session::{SessionManager, SessionScheduler, SessionTask};

use super::ConnectArgs;
use crate::ui;

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Text(String),
    Key(KeyCode, KeyDirection),
    App(String),
    State,
    Help,
    Quit,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let Some(command) = line.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("key" | "k") => {
            let Some(name) = parts.next() else {
                return Input::Invalid("usage: /key NAME [short|long|end_long]".to_string());
            };
            let key = match name.parse::<KeyCode>() {
                Ok(key) => key,
                Err(e) => return Input::Invalid(e.to_string()),
            };
            match parts.next().map(str::parse::<KeyDirection>) {
                None => Input::Key(key, KeyDirection::Short),
                Some(Ok(direction)) => Input::Key(key, direction),
                Some(Err(e)) => Input::Invalid(e.to_string()),
            }
        }
        Some("app" | "a") => match parts.next() {
            Some(link) => Input::App(link.to_string()),
            None => Input::Invalid("usage: /app LINK".to_string()),
        },
        Some("state") => Input::State,
        Some("help" | "h" | "?") => Input::Help,
        Some("quit" | "q" | "exit") => Input::Quit,
        Some(other) => Input::Invalid(format!("unknown command /{other}")),
        None => Input::Invalid("empty command".to_string()),
    }
}

fn print_help() {
    println!("  Type text and press Enter to set the TV's input field.");
    println!("    /key NAME [DIR]    press a key (HOME, BACK, DPAD_UP, ENTER, ...)");
    println!("                       DIR is short, long (start) or end_long");
    println!("    /app LINK          open an app link");
    println!("    /state             show the session state");
    println!("    /quit              disconnect and exit");
}

/// Run the connect command.
pub async fn run(args: ConnectArgs, config: Option<PathBuf>) -> Result<()> {
    let store = super::load_store(config)?;
    let manager = Arc::new(super::session(store));

    let address = match args.address.as_deref() {
        Some(address) => super::parse_address(address)?,
        None => manager
            .last_connected()
            .context("No address given and no TV connected before")?,
    };

    manager.events().on_connected(|| println!("  (connected)"));
    manager
        .events()
        .on_disconnected(|| println!("  (connection lost, reconnecting...)"));
    manager
        .events()
        .on_text_changed(|text| println!("  TV field: {:?}", text));

    ui::header();

    if !manager.is_paired(address) {
        if args.no_pair {
            bail!("{} is not paired", address);
        }
        super::pair::pair(&manager, address).await?;
    }

    let scheduler = SessionScheduler::spawn(Arc::clone(&manager));
    let connected = scheduler
        .run(SessionTask::Connect {
            address,
            wait_for_ready: true,
        })
        .await?;
    if !connected {
        scheduler.shutdown().await;
        bail!("Could not connect to {}", address);
    }

    println!();
    println!("  Connected to {}. /help for commands.", address);
    println!();

    let result = remote_loop(&manager).await;

    scheduler.submit(SessionTask::Disconnect)?;
    scheduler.shutdown().await;
    println!("  Disconnected.");
    result
}

async fn remote_loop(manager: &SessionManager) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        match parse_input(line) {
            Input::Text(text) => manager.set_text(&text),
            Input::Key(key, direction) => manager.send_key(key, direction),
            Input::App(link) => manager.launch_app(&link),
            Input::State => println!(
                "  {} ({})",
                manager.state(),
                manager
                    .address()
                    .map_or_else(|| "no device".to_string(), |a| a.to_string())
            ),
            Input::Help => print_help(),
            Input::Quit => return Ok(()),
            Input::Invalid(message) => println!("  {}", message),
        }
    }
}
