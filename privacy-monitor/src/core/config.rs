/*!
Configuration management for the privacy monitor
*/

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Cookie and activity sources
    #[serde(default)]
    pub source: SourceConfig,
    /// State persistence settings
    #[serde(default)]
    pub state: StateConfig,
    /// Detection behavior settings
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Output configuration
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path to the browser cookie database (Chromium `Cookies` or Firefox `cookies.sqlite`)
    pub cookie_db_path: PathBuf,
    /// Only track cookies for this host and its dot-prefixed form
    #[serde(default)]
    pub domain_filter: Option<String>,
    /// JSON-lines feed of requests, navigations, pixels and inline scripts
    #[serde(default)]
    pub activity_log_path: Option<PathBuf>,
    /// Cookie re-enumeration interval in milliseconds
    pub cookie_poll_interval_ms: u64,
    /// Activity feed check interval in milliseconds
    pub activity_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Path to persistent state database
    pub state_db_path: PathBuf,
    /// Snapshot interval in milliseconds
    pub persist_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Signals that may create tracker records
    pub detectors: Vec<DetectorKind>,
    /// Start with monitoring enabled when no saved state says otherwise
    pub monitor_on_start: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum DetectorKind {
    NetworkRequest,
    TrackingPixel,
    InlineScript,
    TrackingCookie,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Whether this output is enabled
    pub enabled: bool,
    /// Output plugin type
    pub plugin: OutputPlugin,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum OutputPlugin {
    Json { path: PathBuf, pretty: bool },
    Webhook { url: String, auth_token: Option<String> },
    Terminal { format: TerminalFormat },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum TerminalFormat {
    Plain,
    Colored,
    Json,
}

impl MonitorConfig {
    /// Load a config file, falling back to defaults for a missing file
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, toml::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("privacy-monitor")
            .join("config.toml")
    }
}

/// Where Chrome keeps the default profile's cookie database on this platform
pub fn default_cookie_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Google/Chrome/Default/Cookies")
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .unwrap_or(home)
            .join("Google/Chrome/User Data/Default/Network/Cookies")
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("google-chrome/Default/Cookies")
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("privacy-monitor")
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            cookie_db_path: default_cookie_db_path(),
            domain_filter: None,
            activity_log_path: None,
            cookie_poll_interval_ms: 3000,
            activity_poll_interval_ms: 500,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_db_path: data_dir().join("state.db"),
            persist_interval_ms: 5000,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detectors: vec![
                DetectorKind::NetworkRequest,
                DetectorKind::TrackingPixel,
                DetectorKind::InlineScript,
            ],
            monitor_on_start: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            state: StateConfig::default(),
            detection: DetectionConfig::default(),
            outputs: vec![
                OutputConfig {
                    enabled: true,
                    plugin: OutputPlugin::Terminal {
                        format: TerminalFormat::Colored
                    },
                },
                OutputConfig {
                    enabled: false,
                    plugin: OutputPlugin::Json {
                        path: data_dir().join("events.jsonl"),
                        pretty: false
                    },
                },
            ],
        }
    }
}
