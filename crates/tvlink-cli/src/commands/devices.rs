//! Paired-device commands: devices, unpair, reset.

use std::path::PathBuf;

use anyhow::{bail, Result};

use tvlink_core::registry::PairedRegistry;

use super::{AddressArgs, DevicesArgs, ResetArgs};
use crate::ui;

/// Run the devices command.
pub async fn run(args: DevicesArgs, config: Option<PathBuf>) -> Result<()> {
    let registry = PairedRegistry::new(super::load_store(config)?);
    let paired = registry.list();
    let last = registry.last_connected();

    if args.json {
        let output = serde_json::json!({
            "paired": paired.iter().map(|a| serde_json::json!({
                "address": a.to_string(),
                "last_connected": Some(*a) == last,
            })).collect::<Vec<_>>(),
            "last_connected": last.map(|a| a.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("Paired Devices:");
    println!("{}", "─".repeat(40));
    if paired.is_empty() {
        println!("  (none)");
    }
    for address in &paired {
        let marker = if Some(*address) == last { "  (last)" } else { "" };
        println!("  {}{}", address, marker);
    }
    println!("{}", "─".repeat(40));
    println!();
    Ok(())
}

/// Run the unpair command.
pub async fn run_unpair(args: AddressArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let registry = PairedRegistry::new(super::load_store(config)?);

    if registry.remove(address)? {
        println!("  Forgot {}.", address);
    } else {
        println!("  {} was not paired.", address);
    }
    Ok(())
}

/// Run the reset command.
pub async fn run_reset(args: ResetArgs, config: Option<PathBuf>) -> Result<()> {
    if !args.yes {
        let answer = ui::prompt(
            "  Delete the client certificate and forget every paired TV? [y/N] ",
        )
        .await?;
        if !answer.eq_ignore_ascii_case("y") {
            bail!("Reset cancelled");
        }
    }

    let manager = super::session(super::load_store(config)?);
    manager.reset_pairing().await?;

    println!("  Keys reset. Pair each TV again with: tvlink pair <ADDRESS>");
    Ok(())
}
