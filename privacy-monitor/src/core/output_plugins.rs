/*!
Modular output system for cookie, tracker and badge notifications
*/

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use privacy_engine::{CookieKey, CookieRecord, TrackerRecord};
use serde::Serialize;
use tracing::{error, info};

use crate::core::{
    config::{OutputConfig, OutputPlugin, TerminalFormat},
    error::{MonitorError, Result},
    tracker::PurgeReport,
};

/// Something the UI layer should hear about
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A cookie was added, changed or removed
    CookieUpdate {
        key: CookieKey,
        removed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        record: Option<CookieRecord>,
    },
    /// A tracker was seen or its blocked flag changed
    TrackerUpdate {
        tracker: TrackerRecord,
        request_blocked: bool,
    },
    /// Current threat count for the badge
    Badge { threats: usize },
    MonitoringChanged { enabled: bool },
    Purge { report: PurgeReport },
}

#[derive(Serialize)]
struct Envelope<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Initialize the output handler (create files, connections, etc.)
    async fn initialize(&mut self) -> Result<()>;

    /// Handle a notification
    async fn notify(&mut self, notification: &Notification) -> Result<()>;

    /// Cleanup/finalize the output handler
    async fn finalize(&mut self) -> Result<()>;
}

/// Manages multiple output handlers
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(configs: &[OutputConfig]) -> Self {
        let mut handlers: Vec<Box<dyn OutputHandler>> = Vec::new();

        for config in configs {
            if !config.enabled {
                continue;
            }

            let handler: Box<dyn OutputHandler> = match &config.plugin {
                OutputPlugin::Json { path, pretty } => {
                    Box::new(JsonOutputHandler::new(path.clone(), *pretty))
                }
                OutputPlugin::Webhook { url, auth_token } => {
                    Box::new(WebhookOutputHandler::new(url.clone(), auth_token.clone()))
                }
                OutputPlugin::Terminal { format } => {
                    Box::new(TerminalOutputHandler::new(*format))
                }
            };

            handlers.push(handler);
        }

        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Initialize all handlers
    pub async fn initialize(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.initialize().await?;
            info!("Initialized output handler: {}", handler.name());
        }
        Ok(())
    }

    /// Send a notification to all enabled handlers. A failing handler never stops the others.
    pub async fn notify(&mut self, notification: &Notification) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.notify(notification).await {
                error!("Handler {} failed to deliver notification: {}", handler.name(), e);
            }
        }
    }

    /// Finalize all handlers
    pub async fn finalize(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.finalize().await?;
        }
        Ok(())
    }
}

/// JSON lines file output handler
pub struct JsonOutputHandler {
    file_path: PathBuf,
    pretty: bool,
    file: Option<std::fs::File>,
}

impl JsonOutputHandler {
    pub fn new(file_path: PathBuf, pretty: bool) -> Self {
        Self {
            file_path,
            pretty,
            file: None,
        }
    }
}

#[async_trait]
impl OutputHandler for JsonOutputHandler {
    fn name(&self) -> &'static str {
        "JSON"
    }

    async fn initialize(&mut self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.file = Some(OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?);
        Ok(())
    }

    async fn notify(&mut self, notification: &Notification) -> Result<()> {
        if let Some(ref mut file) = self.file {
            let envelope = Envelope {
                timestamp: Utc::now(),
                notification,
            };
            let json_str = if self.pretty {
                serde_json::to_string_pretty(&envelope)?
            } else {
                serde_json::to_string(&envelope)?
            };

            writeln!(file, "{}", json_str)?;
            file.flush()?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }
}

/// Webhook output handler
pub struct WebhookOutputHandler {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookOutputHandler {
    pub fn new(url: String, auth_token: Option<String>) -> Self {
        Self {
            url,
            auth_token,
            client: reqwest::Client::new(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let mut request = self.client.post(&self.url);

        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.json(payload).send().await?;

        if !response.status().is_success() {
            return Err(MonitorError::Other(format!(
                "Webhook delivery failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl OutputHandler for WebhookOutputHandler {
    fn name(&self) -> &'static str {
        "Webhook"
    }

    async fn initialize(&mut self) -> Result<()> {
        // Test the webhook endpoint
        let test_payload = serde_json::json!({
            "test": true,
            "timestamp": Utc::now().timestamp()
        });
        self.post(&test_payload).await
    }

    async fn notify(&mut self, notification: &Notification) -> Result<()> {
        // Badge counts change on nearly every event
        if matches!(notification, Notification::Badge { .. }) {
            return Ok(());
        }
        let envelope = Envelope {
            timestamp: Utc::now(),
            notification,
        };
        self.post(&envelope).await
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Terminal output handler
pub struct TerminalOutputHandler {
    format: TerminalFormat,
    last_badge: Option<usize>,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self {
            format,
            last_badge: None,
        }
    }

    fn format_notification(&self, notification: &Notification) -> String {
        let colored = matches!(self.format, TerminalFormat::Colored);
        match (self.format, notification) {
            (TerminalFormat::Json, _) => serde_json::to_string(notification)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
            (_, Notification::CookieUpdate { key, removed: true, .. }) => {
                paint(colored, "33", &format!("🗑️  Cookie removed: {}", key))
            }
            (_, Notification::CookieUpdate { key, record, .. }) => {
                let harmful = record.as_ref().is_some_and(|r| r.is_harmful());
                let label = record
                    .as_ref()
                    .map(|r| r.classification.purpose.to_string())
                    .unwrap_or_default();
                if harmful {
                    paint(colored, "31", &format!("🚨 Harmful cookie: {} ({})", key, label))
                } else {
                    format!("🍪 Cookie: {} ({})", key, label)
                }
            }
            (_, Notification::TrackerUpdate { tracker, request_blocked }) => {
                let status = if *request_blocked { "BLOCKED" } else { "seen" };
                paint(
                    colored,
                    if *request_blocked { "32" } else { "35" },
                    &format!(
                        "👁️  Tracker {} [{}] {} ({} risk, {} requests) {}",
                        tracker.name,
                        tracker.domain,
                        tracker.category,
                        tracker.risk_level,
                        tracker.request_count,
                        status
                    ),
                )
            }
            (_, Notification::Badge { threats }) => {
                paint(colored, "36", &format!("🛡️  Threats: {}", threats))
            }
            (_, Notification::MonitoringChanged { enabled }) => {
                format!("Monitoring {}", if *enabled { "ON" } else { "OFF" })
            }
            (_, Notification::Purge { report }) => {
                let mut text = paint(
                    colored,
                    "32",
                    &format!(
                        "🧹 Deleted {} of {} harmful cookies",
                        report.deleted_count, report.total_harmful
                    ),
                );
                for failure in &report.errors {
                    text.push_str(&format!("\n   ⚠️  {}", failure));
                }
                text
            }
        }
    }
}

fn paint(colored: bool, code: &str, text: &str) -> String {
    if colored {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn initialize(&mut self) -> Result<()> {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[32m🚀 Privacy Monitor Started\x1b[0m");
            }
            _ => {
                println!("🚀 Privacy Monitor Started");
            }
        }
        Ok(())
    }

    async fn notify(&mut self, notification: &Notification) -> Result<()> {
        if let Notification::Badge { threats } = notification {
            if self.last_badge == Some(*threats) {
                return Ok(());
            }
            self.last_badge = Some(*threats);
        }
        println!("{}", self.format_notification(notification));
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[33m🏁 Privacy Monitor Stopped\x1b[0m");
            }
            _ => {
                println!("🏁 Privacy Monitor Stopped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privacy_engine::{Cookie, DetectionKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn json_handler_appends_tagged_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let mut manager = OutputManager::new(&[
            OutputConfig {
                enabled: true,
                plugin: OutputPlugin::Json { path: path.clone(), pretty: false },
            },
            OutputConfig {
                enabled: false,
                plugin: OutputPlugin::Terminal { format: TerminalFormat::Plain },
            },
        ]);
        assert_eq!(manager.len(), 1);
        manager.initialize().await.unwrap();

        let record = CookieRecord::new(Cookie::new(".doubleclick.net", "IDE"));
        manager
            .notify(&Notification::CookieUpdate {
                key: record.key.clone(),
                removed: false,
                record: Some(record),
            })
            .await;
        manager.notify(&Notification::Badge { threats: 1 }).await;
        manager.finalize().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "cookie_update");
        assert_eq!(lines[0]["record"]["is_harmful"], true);
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["type"], "badge");
        assert_eq!(lines[1]["threats"], 1);
    }

    #[test]
    fn terminal_formats_trackers_and_purges() {
        let handler = TerminalOutputHandler::new(TerminalFormat::Plain);
        let tracker = TrackerRecord::new("doubleclick.net", DetectionKind::NetworkRequest, true, Utc::now());
        let line = handler.format_notification(&Notification::TrackerUpdate {
            tracker,
            request_blocked: true,
        });
        assert!(line.contains("DoubleClick"));
        assert!(line.contains("BLOCKED"));

        let report = PurgeReport {
            success: true,
            deleted_count: 1,
            total_harmful: 2,
            errors: vec!["Failed to delete IDE - may be protected".into()],
            error: None,
        };
        let text = handler.format_notification(&Notification::Purge { report });
        assert!(text.starts_with("🧹 Deleted 1 of 2 harmful cookies"));
        assert!(text.contains("may be protected"));
    }
}
