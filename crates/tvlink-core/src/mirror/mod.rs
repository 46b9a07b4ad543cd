//! Screen mirroring collaborator.
//!
//! Mirroring runs in an external `scrcpy` process. Nothing flows back into the
//! core; the launcher only starts and stops it.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::{Config, MirroringConfig};
use crate::error::{Error, Result};

/// Grace period between terminate and kill on stop.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Starts and stops a mirroring process.
#[async_trait]
pub trait MirrorLauncher: Send + Sync {
    /// Start mirroring `address`. A running mirror is left alone.
    async fn start(&self, address: IpAddr) -> Result<()>;

    /// Stop mirroring. No-op when nothing runs.
    async fn stop(&self);
}

/// [`MirrorLauncher`] spawning `scrcpy`.
#[derive(Debug)]
pub struct ScrcpyLauncher {
    settings: MirroringConfig,
    adb_port: u16,
    child: Mutex<Option<Child>>,
}

impl ScrcpyLauncher {
    /// Create a launcher from the configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            settings: config.mirroring.clone(),
            adb_port: config.debug_bridge.port,
            child: Mutex::new(None),
        }
    }

    /// Whether a mirror process is running.
    pub async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Wait for the mirror process to exit on its own (window closed).
    pub async fn wait(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            let status = child.wait().await?;
            tracing::info!("scrcpy exited with {}", status);
        }
        Ok(())
    }

    fn arguments(&self, address: IpAddr) -> Vec<String> {
        let mut args = vec![
            "--serial".to_string(),
            format!("{address}:{}", self.adb_port),
            "--window-title".to_string(),
            format!("Mirror: {address}"),
            "--max-size".to_string(),
            self.settings.max_size.to_string(),
            "--video-bit-rate".to_string(),
            self.settings.bitrate.to_string(),
            "--max-fps".to_string(),
            self.settings.max_fps.to_string(),
        ];
        if self.settings.stay_awake {
            args.push("--stay-awake".to_string());
        }
        if !self.settings.audio {
            args.push("--no-audio".to_string());
        }
        args
    }
}

#[async_trait]
impl MirrorLauncher for ScrcpyLauncher {
    async fn start(&self, address: IpAddr) -> Result<()> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                tracing::warn!("scrcpy already running");
                return Ok(());
            }
        }

        let args = self.arguments(address);
        tracing::info!("Starting {} {}", self.settings.path.display(), args.join(" "));

        let child = Command::new(&self.settings.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::Mirroring(format!(
                    "{} not found",
                    self.settings.path.display()
                )),
                _ => Error::Mirroring(format!("failed to start scrcpy: {e}")),
            })?;

        *slot = Some(child);
        Ok(())
    }

    async fn stop(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        let _ = child.start_kill();
        if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
            tracing::warn!("scrcpy did not exit within {:?}", STOP_GRACE);
        }
    }
}
