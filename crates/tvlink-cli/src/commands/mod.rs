//! CLI command definitions and handlers.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use tvlink_core::config::ConfigStore;
use tvlink_core::connection::parse_device_address;
use tvlink_core::session::SessionManager;

pub mod config;
pub mod connect;
pub mod control;
pub mod debug;
pub mod devices;
pub mod pair;
pub mod probe;

/// Time given to queued commands to reach the TV before a one-shot command
/// disconnects.
const SETTLE: Duration = Duration::from_millis(300);

/// tvlink - Android TV remote control
#[derive(Parser)]
#[command(name = "tvlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TVLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Connect and control a TV interactively (pairs first if needed)
    Connect(ConnectArgs),

    /// Pair with a TV using the code it displays
    Pair(AddressArgs),

    /// Press one or more keys
    Key(KeyArgs),

    /// Set the text of the TV's focused input field
    Text(TextArgs),

    /// Open an app link on the TV
    Launch(LaunchArgs),

    /// Check whether the TV's remote and pairing ports are reachable
    Probe(ProbeArgs),

    /// List paired devices
    Devices(DevicesArgs),

    /// Forget a paired device
    Unpair(AddressArgs),

    /// Delete the client certificate and forget every paired device
    Reset(ResetArgs),

    /// Capture the TV screen through adb
    Screenshot(ScreenshotArgs),

    /// Mirror the TV screen with scrcpy
    Mirror(AddressArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// A single device address
#[derive(Parser)]
pub struct AddressArgs {
    /// TV address (e.g. 192.168.1.50)
    pub address: String,
}

/// Arguments for the connect command
#[derive(Parser)]
pub struct ConnectArgs {
    /// TV address; the last connected TV when omitted
    pub address: Option<String>,

    /// Fail instead of pairing when the TV is not paired
    #[arg(long)]
    pub no_pair: bool,
}

/// Arguments for the key command
#[derive(Parser)]
pub struct KeyArgs {
    /// TV address
    pub address: String,

    /// Key names (HOME, DPAD_UP, KEYCODE_BACK, ...) or numeric codes
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Long-press each key
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the text command
#[derive(Parser)]
pub struct TextArgs {
    /// TV address
    pub address: String,

    /// Text for the focused field
    pub text: String,

    /// Use the bulk text command instead of replacing the field
    #[arg(long)]
    pub bulk: bool,

    /// Type through adb instead of the remote protocol
    #[arg(long)]
    pub adb: bool,
}

/// Arguments for the launch command
#[derive(Parser)]
pub struct LaunchArgs {
    /// TV address
    pub address: String,

    /// App link (e.g. https://www.youtube.com)
    pub link: String,
}

/// Arguments for the probe command
#[derive(Parser)]
pub struct ProbeArgs {
    /// TV address
    pub address: String,

    /// Probe timeout in seconds (defaults to the configured value)
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Arguments for the devices command
#[derive(Parser)]
pub struct DevicesArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the reset command
#[derive(Parser)]
pub struct ResetArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the screenshot command
#[derive(Parser)]
pub struct ScreenshotArgs {
    /// TV address
    pub address: String,

    /// Output file (defaults to screenshot_<timestamp>.png)
    pub path: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Print only the configuration file path
    #[arg(long)]
    pub path: bool,
}

/// Load the configuration store.
pub fn load_store(path: Option<PathBuf>) -> Result<Arc<ConfigStore>> {
    let store = match path {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    }
    .context("Failed to load configuration")?;
    Ok(Arc::new(store))
}

/// Parse a device address argument.
pub fn parse_address(address: &str) -> Result<IpAddr> {
    Ok(parse_device_address(address)?)
}

/// Create a session manager that prints errors to stderr.
pub fn session(store: Arc<ConfigStore>) -> SessionManager {
    let manager = SessionManager::new(store);
    manager
        .events()
        .on_error(|message| eprintln!("  Error: {}", message));
    manager
}

/// Connect to a paired TV, waiting for it to become ready.
pub async fn connect_paired(manager: &SessionManager, address: IpAddr) -> Result<()> {
    if !manager.is_paired(address) {
        bail!(
            "{} is not paired. Pair it first with:\n  tvlink pair {}",
            address,
            address
        );
    }
    if !manager.connect(address, true).await {
        bail!("Could not connect to {}", address);
    }
    Ok(())
}

/// Let queued commands go out, then disconnect.
pub async fn finish(manager: &SessionManager) {
    tokio::time::sleep(SETTLE).await;
    manager.disconnect().await;
}
