//! Debug-bridge collaborator.
//!
//! An alternate channel to the TV through the `adb` tool: screenshots, and key
//! and text input for devices whose remote-protocol IME sync is unreliable. The
//! session manager only routes input here when the caller selects
//! [`crate::session::InputRoute::DebugBridge`].
//!
//! [`AdbController`] keeps one `adb shell` open per device so that each key or
//! text command is a line written to its stdin rather than a new process.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::DebugBridgeConfig;
use crate::error::{Error, Result};
use crate::protocol::KeyCode;

/// Where screenshots are written on the device before being pulled.
const REMOTE_SCREENSHOT_PATH: &str = "/sdcard/tvlink_screenshot.png";

/// Operations the core needs from a debug bridge.
#[async_trait]
pub trait DebugBridge: Send + Sync {
    /// Attach to the device at `address`.
    async fn connect(&self, address: IpAddr) -> Result<()>;

    /// Type `text` into the focused field.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Press a key.
    async fn send_key(&self, key: KeyCode) -> Result<()>;

    /// Capture the screen into `local_path`.
    async fn screenshot(&self, local_path: &Path) -> Result<()>;
}

/// [`DebugBridge`] backed by the `adb` executable.
#[derive(Debug)]
pub struct AdbController {
    path: PathBuf,
    port: u16,
    command_timeout: Duration,
    serial: Mutex<Option<String>>,
    shell: Mutex<Option<Child>>,
}

impl AdbController {
    /// Create a controller from the `[debug_bridge]` settings.
    #[must_use]
    pub fn new(config: &DebugBridgeConfig) -> Self {
        Self {
            path: config.path.clone(),
            port: config.port,
            command_timeout: config.command_timeout,
            serial: Mutex::new(None),
            shell: Mutex::new(None),
        }
    }

    /// Whether the `adb` executable runs.
    pub async fn is_available(&self) -> bool {
        self.run(&["version"]).await.is_ok()
    }

    /// Serial of the attached device.
    pub async fn serial(&self) -> Option<String> {
        self.serial.lock().await.clone()
    }

    /// Close the persistent shell.
    pub async fn close(&self) {
        if let Some(mut child) = self.shell.lock().await.take() {
            if let Some(stdin) = child.stdin.as_mut() {
                let _ = stdin.write_all(b"exit\n").await;
            }
            let _ = child.start_kill();
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("adb {}", args.join(" "));

        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new(&self.path)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            Error::DebugBridge(format!(
                "adb {} timed out after {:?}",
                args.first().unwrap_or(&""),
                self.command_timeout
            ))
        })?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::DebugBridge(format!("{} not found", self.path.display()))
            }
            _ => Error::DebugBridge(e.to_string()),
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::DebugBridge(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn require_serial(&self) -> Result<String> {
        self.serial
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::DebugBridge("no device attached".to_string()))
    }

    async fn shell_line(&self, line: &str) -> Result<()> {
        let serial = self.require_serial().await?;
        let mut shell = self.shell.lock().await;

        let running = match shell.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            tracing::debug!("Starting persistent adb shell for {}", serial);
            let child = Command::new(&self.path)
                .args(["-s", &serial, "shell"])
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| Error::DebugBridge(format!("failed to start adb shell: {e}")))?;
            *shell = Some(child);
        }

        let written = match shell.as_mut().and_then(|c| c.stdin.as_mut()) {
            Some(stdin) => {
                let mut data = line.as_bytes().to_vec();
                data.push(b'\n');
                match stdin.write_all(&data).await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                }
            }
            None => Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
        };

        written.map_err(|e| {
            // restarted on the next command
            shell.take();
            Error::DebugBridge(format!("adb shell write failed: {e}"))
        })
    }
}

#[async_trait]
impl DebugBridge for AdbController {
    async fn connect(&self, address: IpAddr) -> Result<()> {
        let serial = format!("{address}:{}", self.port);
        tracing::info!("adb connecting to {}", serial);

        let output = self.run(&["connect", &serial]).await?;
        if !(output.contains("connected") || output.contains("already")) {
            return Err(Error::DebugBridge(output));
        }

        let previous = self.serial.lock().await.replace(serial.clone());
        if previous.as_deref() != Some(serial.as_str()) {
            self.close().await;
        }
        self.shell_line("true").await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.shell_line(&format!("input text '{}'", escape_input_text(text)))
            .await
    }

    async fn send_key(&self, key: KeyCode) -> Result<()> {
        self.shell_line(&format!("input keyevent {}", key.code())).await
    }

    async fn screenshot(&self, local_path: &Path) -> Result<()> {
        let serial = self.require_serial().await?;
        let local = local_path.to_string_lossy();

        self.run(&["-s", &serial, "shell", "screencap", "-p", REMOTE_SCREENSHOT_PATH])
            .await?;
        let pulled = self
            .run(&["-s", &serial, "pull", REMOTE_SCREENSHOT_PATH, &local])
            .await;
        if let Err(e) = self
            .run(&["-s", &serial, "shell", "rm", REMOTE_SCREENSHOT_PATH])
            .await
        {
            tracing::debug!("Could not remove device screenshot: {}", e);
        }

        pulled.map(|_| tracing::info!("Screenshot saved to {}", local_path.display()))
    }
}

/// Escape text for `input text` inside single quotes.
fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s").replace('\'', "\\'")
}
