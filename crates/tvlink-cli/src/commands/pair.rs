//! Pair command implementation.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use tvlink_core::session::SessionManager;
use tvlink_core::Error;

use super::AddressArgs;
use crate::ui;

/// Wrong codes tolerated before giving up.
const MAX_CODE_ATTEMPTS: usize = 3;

/// Run the pair command.
pub async fn run(args: AddressArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let manager = super::session(super::load_store(config)?);

    ui::header();
    pair(&manager, address).await?;
    println!("  Paired with {}.", address);
    println!();

    manager.disconnect().await;
    Ok(())
}

/// Run the pairing exchange, prompting for the code shown on the TV.
///
/// Leaves the manager connected (without waiting for readiness) on success.
pub async fn pair(manager: &SessionManager, address: IpAddr) -> Result<()> {
    println!("  Pairing with {}...", address);

    // The remote port may refuse unpaired clients; only the client is needed.
    manager.connect(address, false).await;
    manager
        .start_pairing()
        .await
        .context("Failed to start pairing")?;

    println!();
    println!("  A code is now shown on the TV.");

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = ui::prompt("  Code: ").await?;
        if code.is_empty() {
            bail!("Pairing cancelled");
        }

        match manager.finish_pairing(&code).await {
            Ok(()) => return Ok(()),
            Err(e @ (Error::PairingRejected(_) | Error::InvalidPairingCode(_)))
                if attempt < MAX_CODE_ATTEMPTS =>
            {
                tracing::debug!("Code attempt {} failed: {}", attempt, e);
                println!("  Try again.");
            }
            Err(e) => return Err(e).context("Pairing failed"),
        }
    }

    bail!("Pairing failed")
}
