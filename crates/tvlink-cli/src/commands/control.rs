//! One-shot control commands: key, text, launch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use tvlink_core::adb::{AdbController, DebugBridge};
use tvlink_core::protocol::{KeyCode, KeyDirection};

use super::{KeyArgs, LaunchArgs, TextArgs};

/// How long a `--long` press is held.
const LONG_PRESS: Duration = Duration::from_millis(800);

/// Run the key command.
pub async fn run_key(args: KeyArgs, config: Option<PathBuf>) -> Result<()> {
    let keys = args
        .keys
        .iter()
        .map(|name| name.parse::<KeyCode>())
        .collect::<Result<Vec<_>, _>>()?;

    let address = super::parse_address(&args.address)?;
    let manager = super::session(super::load_store(config)?);
    super::connect_paired(&manager, address).await?;

    for key in keys {
        if args.long {
            manager.send_key(key, KeyDirection::StartLong);
            tokio::time::sleep(LONG_PRESS).await;
            manager.send_key(key, KeyDirection::EndLong);
        } else {
            manager.send_key(key, KeyDirection::Short);
        }
        println!("  {}", key);
    }

    super::finish(&manager).await;
    Ok(())
}

/// Run the text command.
pub async fn run_text(args: TextArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let store = super::load_store(config)?;

    if args.adb {
        let adb = AdbController::new(&store.snapshot().debug_bridge);
        adb.connect(address)
            .await
            .context("Failed to attach adb")?;
        adb.send_text(&args.text).await?;
        adb.close().await;
        return Ok(());
    }

    let manager = super::session(Arc::clone(&store));
    super::connect_paired(&manager, address).await?;

    if args.bulk {
        manager.send_text(&args.text);
    } else {
        // Give the TV a moment to report the focused field first.
        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.set_text(&args.text);
    }

    super::finish(&manager).await;
    Ok(())
}

/// Run the launch command.
pub async fn run_launch(args: LaunchArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let manager = super::session(super::load_store(config)?);
    super::connect_paired(&manager, address).await?;

    manager.launch_app(&args.link);
    println!("  Launched {}", args.link);

    super::finish(&manager).await;
    Ok(())
}
