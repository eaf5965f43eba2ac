//! CartPilot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CartPilotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CartPilotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CartPilotConfig {
    /// Load config from the default path (~/.cartpilot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CartPilotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CartPilotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CartPilotError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CartPilot home directory (~/.cartpilot).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cartpilot")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7700
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Browser automation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome remote debugging port.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    /// Run Chrome headless by default.
    #[serde(default)]
    pub headless: bool,
    /// Profile directory for persistent login state.
    /// None = ~/.cartpilot/browser-profile.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,
    /// Bounded wait for an external login to resolve, in seconds.
    #[serde(default = "default_auth_wait")]
    pub auth_wait_secs: u64,
    /// Bounded wait for the item detail/customization view, in seconds.
    #[serde(default = "default_modal_wait")]
    pub modal_wait_secs: u64,
    /// Maximum scroll-strategy reveal steps per item.
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,
}

fn default_debug_port() -> u16 {
    9222
}
fn default_auth_wait() -> u64 {
    120
}
fn default_modal_wait() -> u64 {
    10
}
fn default_scroll_steps() -> u32 {
    5
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            headless: false,
            profile_dir: None,
            auth_wait_secs: default_auth_wait(),
            modal_wait_secs: default_modal_wait(),
            scroll_steps: default_scroll_steps(),
        }
    }
}

impl BrowserConfig {
    /// Get the profile directory, falling back to the default.
    pub fn get_profile_dir(&self) -> PathBuf {
        self.profile_dir
            .clone()
            .unwrap_or_else(|| CartPilotConfig::home_dir().join("browser-profile"))
    }
}

/// Trigger engine configuration.
/// The poll window and the recovery window are deliberately independent knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll loop interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// A trigger instant counts as due for this long after it passes.
    #[serde(default = "default_poll_window")]
    pub poll_window_secs: u64,
    /// Missed triggers older than this are dropped silently.
    #[serde(default = "default_recovery_window")]
    pub recovery_window_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_poll_window() -> u64 {
    30
}
fn default_recovery_window() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_window_secs: default_poll_window(),
            recovery_window_secs: default_recovery_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CartPilotConfig::default();
        assert_eq!(cfg.gateway.port, 7700);
        assert_eq!(cfg.scheduler.poll_interval_secs, 30);
        assert_eq!(cfg.scheduler.recovery_window_secs, 300);
        assert_eq!(cfg.browser.scroll_steps, 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: CartPilotConfig = toml::from_str("[gateway]\nport = 8080\n").unwrap();
        assert_eq!(cfg.gateway.port, 8080);
        assert_eq!(cfg.gateway.host, "127.0.0.1");
        assert_eq!(cfg.browser.auth_wait_secs, 120);
    }
}
