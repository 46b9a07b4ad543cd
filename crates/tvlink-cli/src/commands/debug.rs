//! Commands using the external tools: screenshot (adb) and mirror (scrcpy).

use std::path::PathBuf;

use anyhow::{Context, Result};

use tvlink_core::adb::{AdbController, DebugBridge};
use tvlink_core::mirror::{MirrorLauncher, ScrcpyLauncher};

use super::{AddressArgs, ScreenshotArgs};

/// Run the screenshot command.
pub async fn run_screenshot(args: ScreenshotArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let config = super::load_store(config)?.snapshot();

    let path = args.path.unwrap_or_else(|| {
        PathBuf::from(format!(
            "screenshot_{}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    let adb = AdbController::new(&config.debug_bridge);
    adb.connect(address)
        .await
        .context("Failed to attach adb")?;
    let result = adb.screenshot(&path).await;
    adb.close().await;
    result.context("Screenshot failed")?;

    println!("  Saved {}", path.display());
    Ok(())
}

/// Run the mirror command.
pub async fn run_mirror(args: AddressArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let config = super::load_store(config)?.snapshot();

    // scrcpy talks to the device through adb.
    let adb = AdbController::new(&config.debug_bridge);
    adb.connect(address)
        .await
        .context("Failed to attach adb")?;
    adb.close().await;

    let launcher = ScrcpyLauncher::new(&config);
    launcher.start(address).await?;
    println!("  Mirroring {}. Close the window or press Ctrl+C to stop.", address);

    tokio::select! {
        result = launcher.wait() => result?,
        _ = tokio::signal::ctrl_c() => launcher.stop().await,
    }
    Ok(())
}
