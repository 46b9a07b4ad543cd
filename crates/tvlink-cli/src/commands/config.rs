//! Config command implementation.

use std::path::PathBuf;

use anyhow::Result;

use tvlink_core::config::Config;

use super::ConfigArgs;

/// Run the config command.
pub async fn run(args: ConfigArgs, path: Option<PathBuf>) -> Result<()> {
    let file = path.clone().unwrap_or_else(Config::config_path);
    if args.path {
        println!("{}", file.display());
        return Ok(());
    }

    let config = super::load_store(path)?.snapshot();

    println!();
    println!("tvlink Configuration ({})", file.display());
    println!("{}", "─".repeat(50));
    println!();
    println!("[general]");
    println!("  client_name = \"{}\"", config.general.client_name);
    println!("  keys_dir = \"{}\"", config.keys_dir().display());
    println!();
    println!("[remote]");
    println!("  port = {}", config.remote.port);
    println!("  pairing_port = {}", config.remote.pairing_port);
    println!("  probe_timeout = {:?}", config.remote.probe_timeout);
    println!("  connect_timeout = {:?}", config.remote.connect_timeout);
    println!("  connect_attempts = {}", config.remote.connect_attempts);
    println!("  retry_delay = {:?}", config.remote.retry_delay);
    println!("  ready_timeout = {:?}", config.remote.ready_timeout);
    println!("  reconnect_delay = {:?}", config.remote.reconnect_delay);
    println!();
    println!("[devices]");
    match config.devices.last_connected {
        Some(address) => println!("  last_connected = \"{}\"", address),
        None => println!("  last_connected = (none)"),
    }
    println!("  paired = {} device(s)", config.devices.paired.len());
    println!();
    println!("[debug_bridge]");
    println!("  path = \"{}\"", config.debug_bridge.path.display());
    println!("  port = {}", config.debug_bridge.port);
    println!("  command_timeout = {:?}", config.debug_bridge.command_timeout);
    println!();
    println!("[mirroring]");
    println!("  path = \"{}\"", config.mirroring.path.display());
    println!("  max_size = {}", config.mirroring.max_size);
    println!("  bitrate = {}", config.mirroring.bitrate);
    println!("  max_fps = {}", config.mirroring.max_fps);
    println!("  stay_awake = {}", config.mirroring.stay_awake);
    println!("  audio = {}", config.mirroring.audio);
    println!();

    Ok(())
}
