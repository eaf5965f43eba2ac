//! Chrome discovery and launch.
//!
//! Launches Chrome with remote debugging and a persistent profile directory
//! so a storefront login survives between runs. If Chrome is already
//! listening on the debug port, the running instance is reused.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::cdp::CdpError;

/// Launch configuration for one automation run.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    /// Remote debugging port.
    pub debug_port: u16,
    /// Profile directory for persistent session state.
    pub profile_dir: PathBuf,
    /// Run without a visible window.
    pub headless: bool,
}

impl ChromeLauncher {
    pub fn new(debug_port: u16, profile_dir: PathBuf, headless: bool) -> Self {
        Self {
            debug_port,
            profile_dir,
            headless,
        }
    }

    /// The CDP endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.debug_port)
    }

    /// Find a Chrome/Chromium executable.
    pub fn find_chrome() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];

        #[cfg(target_os = "linux")]
        let paths = [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];

        #[cfg(target_os = "windows")]
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];

        paths.iter().map(PathBuf::from).find(|p| p.exists())
    }

    /// Is Chrome already listening on the debug port?
    pub async fn is_running(&self) -> bool {
        reqwest::get(format!("{}/json/version", self.endpoint()))
            .await
            .is_ok()
    }

    /// Ensure Chrome is up on the debug port, launching it if needed.
    /// Returns the child handle when this call spawned the process.
    pub async fn ensure_running(&self) -> Result<Option<Child>, CdpError> {
        if self.is_running().await {
            info!("Chrome already running on port {}", self.debug_port);
            return Ok(None);
        }

        let chrome_path = Self::find_chrome().ok_or_else(|| {
            CdpError::ChromeNotAvailable("no Chrome/Chromium executable found".into())
        })?;

        if let Err(e) = std::fs::create_dir_all(&self.profile_dir) {
            warn!("Failed to create profile directory: {}", e);
        }

        info!(
            "Launching Chrome with profile at: {}",
            self.profile_dir.display()
        );

        let mut cmd = Command::new(&chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", self.debug_port))
            .arg(format!("--user-data-dir={}", self.profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if self.headless {
            cmd.arg("--headless=new");
        }

        let child = cmd
            .spawn()
            .map_err(|e| CdpError::ConnectionFailed(format!("Failed to launch Chrome: {e}")))?;

        info!("Chrome launched with PID: {:?}", child.id());

        // Wait for the debug endpoint to come up.
        for _ in 0..30 {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            if self.is_running().await {
                return Ok(Some(child));
            }
        }

        Err(CdpError::ConnectionFailed(
            "Chrome failed to start within timeout".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format() {
        let launcher = ChromeLauncher::new(9333, PathBuf::from("/tmp/profile"), true);
        assert_eq!(launcher.endpoint(), "http://localhost:9333");
    }
}
