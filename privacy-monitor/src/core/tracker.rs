/*!
Main async coordinator that orchestrates the event-driven privacy monitor.

The coordinator is the single writer of the engine registries. Browser events,
UI commands and the shutdown signal are multiplexed onto one loop, so every
mutation is applied in arrival order.
*/

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use privacy_engine::{
    Cookie, CookieFilter, CookieKey, CookieRecord, PrivacyEngine, TrackerRecord,
    domain::is_internal_scheme, host_from_url,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserCookieStore, in_host_scope};
use crate::core::{
    config::MonitorConfig,
    detection_engine::{DetectionEngine, Signal, TrackerHit},
    error::{MonitorError, Result},
    event_system::{Activity, EventProcessor, MonitorEvent},
    output_plugins::{Notification, OutputManager},
    state_manager::StateManager,
};

/// Outcome of a single user action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Outcome of deleting every harmful cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub success: bool,
    pub deleted_count: usize,
    pub total_harmful: usize,
    /// One entry per cookie the browser refused to delete
    pub errors: Vec<String>,
    /// Set when the purge could not run at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PurgeReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            deleted_count: 0,
            total_harmful: 0,
            errors: vec![],
            error: Some(message.into()),
        }
    }
}

/// Statistics about the monitor's operation
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub monitoring_enabled: bool,
    pub cookies: usize,
    pub harmful_cookies: usize,
    pub tracking_cookies: usize,
    pub trackers: usize,
    pub blocked_domains: usize,
    pub threats: usize,
    pub privacy_score: u8,
    pub events_processed: u64,
    pub uptime_seconds: u64,
    pub last_event_time: Option<DateTime<Utc>>,
}

/// Requests accepted by a running monitor. Each carries its reply channel.
#[derive(Debug)]
pub enum Command {
    ListCookies {
        filter: CookieFilter,
        reply: oneshot::Sender<Vec<CookieRecord>>,
    },
    ListTrackers {
        reply: oneshot::Sender<Vec<TrackerRecord>>,
    },
    PrivacyScore {
        reply: oneshot::Sender<u8>,
    },
    Stats {
        reply: oneshot::Sender<MonitorStats>,
    },
    DeleteCookie {
        key: CookieKey,
        reply: oneshot::Sender<ActionResult>,
    },
    DeleteHarmfulCookies {
        reply: oneshot::Sender<PurgeReport>,
    },
    BlockDomain {
        domain: String,
        reply: oneshot::Sender<ActionResult>,
    },
    UnblockDomain {
        domain: String,
        reply: oneshot::Sender<ActionResult>,
    },
    SetMonitoring {
        enabled: bool,
        reply: oneshot::Sender<ActionResult>,
    },
}

/// Create the channel a running monitor reads commands from
pub fn command_channel(buffer: usize) -> (MonitorHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(buffer);
    (MonitorHandle { tx }, rx)
}

/// Cloneable client for a running monitor
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| MonitorError::MonitorStopped)?;
        response.await.map_err(|_| MonitorError::MonitorStopped)
    }

    pub async fn cookies(&self, filter: CookieFilter) -> Result<Vec<CookieRecord>> {
        self.request(|reply| Command::ListCookies { filter, reply }).await
    }

    pub async fn trackers(&self) -> Result<Vec<TrackerRecord>> {
        self.request(|reply| Command::ListTrackers { reply }).await
    }

    pub async fn privacy_score(&self) -> Result<u8> {
        self.request(|reply| Command::PrivacyScore { reply }).await
    }

    pub async fn stats(&self) -> Result<MonitorStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn delete_cookie(&self, key: CookieKey) -> Result<ActionResult> {
        self.request(|reply| Command::DeleteCookie { key, reply }).await
    }

    pub async fn delete_harmful_cookies(&self) -> Result<PurgeReport> {
        self.request(|reply| Command::DeleteHarmfulCookies { reply }).await
    }

    pub async fn block_domain(&self, domain: impl Into<String>) -> Result<ActionResult> {
        let domain = domain.into();
        self.request(|reply| Command::BlockDomain { domain, reply }).await
    }

    pub async fn unblock_domain(&self, domain: impl Into<String>) -> Result<ActionResult> {
        let domain = domain.into();
        self.request(|reply| Command::UnblockDomain { domain, reply }).await
    }

    pub async fn set_monitoring(&self, enabled: bool) -> Result<ActionResult> {
        self.request(|reply| Command::SetMonitoring { enabled, reply }).await
    }
}

/// Main monitor that coordinates all components
pub struct PrivacyMonitor {
    config: MonitorConfig,
    engine: PrivacyEngine,
    state_manager: StateManager,
    detection_engine: DetectionEngine,
    output_manager: OutputManager,
    cookie_store: Option<BrowserCookieStore>,
    started_at: Instant,
    events_processed: u64,
    last_event_time: Option<DateTime<Utc>>,
    /// Registries changed since the last successful save
    dirty: bool,
}

impl PrivacyMonitor {
    /// Create a new monitor, restoring any saved state
    pub async fn new(config: MonitorConfig) -> Result<Self> {
        info!("Initializing event-driven privacy monitor...");

        let state_manager = StateManager::new(config.state.clone())?;
        let engine = match state_manager.load_snapshot()? {
            Some(snapshot) => {
                info!(
                    "Restored {} cookies, {} trackers, {} blocked domains",
                    snapshot.cookie_records.len(),
                    snapshot.tracker_records.len(),
                    snapshot.blocked_domains.len()
                );
                PrivacyEngine::restore(snapshot)
            }
            None => {
                let mut engine = PrivacyEngine::new();
                engine.set_monitoring(config.detection.monitor_on_start);
                engine
            }
        };

        let cookie_store = match BrowserCookieStore::open(&config.source.cookie_db_path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(
                    "Cookie store {:?} unavailable: {}",
                    config.source.cookie_db_path, e
                );
                None
            }
        };

        let detection_engine = DetectionEngine::new(&config.detection.detectors);
        let mut output_manager = OutputManager::new(&config.outputs);

        // Initialize output handlers
        output_manager.initialize().await?;

        Ok(Self {
            config,
            engine,
            state_manager,
            detection_engine,
            output_manager,
            cookie_store,
            started_at: Instant::now(),
            events_processed: 0,
            last_event_time: None,
            dirty: false,
        })
    }

    pub fn engine(&self) -> &PrivacyEngine {
        &self.engine
    }

    /// Run until `shutdown` resolves, then persist and finalize outputs
    pub async fn run<F>(&mut self, mut commands: mpsc::Receiver<Command>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("🚀 Starting privacy monitor...");
        info!("🍪 Cookie store: {:?}", self.config.source.cookie_db_path);
        info!("📡 Activity feed: {:?}", self.config.source.activity_log_path);
        info!("💾 State DB: {:?}", self.state_manager.path());
        info!("🔍 Detectors: {:?}", self.config.detection.detectors);
        info!(
            "Monitoring is {}",
            if self.engine.monitoring_enabled() { "ON" } else { "OFF" }
        );

        let known = self
            .engine
            .cookies(CookieFilter::All)
            .map(|record| record.cookie.clone())
            .collect();
        let mut events = EventProcessor::new(&self.config, self.cookie_store.clone(), known).start();
        tokio::pin!(shutdown);
        let mut commands_open = true;
        self.push_badge().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Initiating graceful shutdown...");
                    break;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All monitor handles dropped");
                        commands_open = false;
                    }
                },
                event = events.next() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            error!("Error handling event: {}", e);
                        }
                    }
                    None => break,
                },
            }
        }

        self.shutdown().await
    }

    /// Apply one event from the monitoring sources
    pub async fn handle_event(&mut self, event: MonitorEvent) -> Result<()> {
        self.events_processed += 1;
        self.last_event_time = Some(Utc::now());

        match event {
            MonitorEvent::CookieChanged { cookie, removed: true } => {
                self.forget_cookie(cookie.key()).await;
            }
            MonitorEvent::CookieChanged { cookie, removed: false } => {
                self.observe_cookie(cookie).await;
            }
            MonitorEvent::Activity(activity) => {
                if !self.engine.monitoring_enabled() {
                    debug!("Monitoring is off, ignoring activity");
                    return Ok(());
                }
                if let Activity::Navigation { url } = &activity {
                    self.refresh_for_navigation(url).await;
                }
                let hits = self.detection_engine.detect(Signal::Activity(&activity));
                self.record_hits(hits).await;
            }
            MonitorEvent::PersistTick => {
                if self.dirty {
                    self.persist()?;
                }
            }
            MonitorEvent::SourceError(message) => {
                warn!("⚠️ Source error: {}", message);
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            Command::ListCookies { filter, reply } => {
                let _ = reply.send(self.engine.cookies(filter).cloned().collect());
            }
            Command::ListTrackers { reply } => {
                let _ = reply.send(self.engine.trackers().cloned().collect());
            }
            Command::PrivacyScore { reply } => {
                let _ = reply.send(self.engine.privacy_score());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::DeleteCookie { key, reply } => {
                let _ = reply.send(self.delete_cookie(&key).await);
            }
            Command::DeleteHarmfulCookies { reply } => {
                let _ = reply.send(self.delete_harmful_cookies().await);
            }
            Command::BlockDomain { domain, reply } => {
                let _ = reply.send(self.block_domain(&domain).await);
            }
            Command::UnblockDomain { domain, reply } => {
                let _ = reply.send(self.unblock_domain(&domain).await);
            }
            Command::SetMonitoring { enabled, reply } => {
                let _ = reply.send(self.set_monitoring(enabled).await);
            }
        }
    }

    /// Classify and store a cookie reported by the browser
    async fn observe_cookie(&mut self, cookie: Cookie) {
        let key = cookie.key();
        if self.engine.cookie(&key).is_some_and(|record| record.cookie == cookie) {
            return;
        }

        let hits = if self.engine.monitoring_enabled() {
            self.detection_engine.detect(Signal::Cookie(&cookie))
        } else {
            vec![]
        };

        let record = self.engine.upsert_cookie(cookie).clone();
        self.dirty = true;
        if record.is_harmful() {
            info!("🚨 Harmful cookie detected: {}", record.key);
        }
        self.output_manager
            .notify(&Notification::CookieUpdate {
                key,
                removed: false,
                record: Some(record),
            })
            .await;

        self.record_hits(hits).await;
        self.push_badge().await;
    }

    async fn record_hits(&mut self, hits: Vec<TrackerHit>) {
        if hits.is_empty() {
            return;
        }
        self.dirty = true;
        for hit in hits {
            let request_blocked = self.engine.should_block(&hit.domain);
            let tracker = self.engine.record_tracker_hit(&hit.domain, hit.kind).clone();
            if request_blocked {
                info!("🚫 Blocked request to: {}", hit.domain);
            } else {
                debug!("👁️ Tracker {} ({} requests)", tracker.domain, tracker.request_count);
            }
            self.output_manager
                .notify(&Notification::TrackerUpdate { tracker, request_blocked })
                .await;
        }
        self.push_badge().await;
    }

    async fn refresh_for_navigation(&mut self, url: &str) {
        if is_internal_scheme(url) || self.cookie_store.is_none() {
            return;
        }
        match host_from_url(url) {
            Ok(host) => {
                if let Err(e) = self.refresh_cookies(Some(&host)).await {
                    warn!("Could not refresh cookies for {}: {}", host, e);
                }
            }
            Err(e) => debug!("Navigation to unparseable URL {}: {}", url, e),
        }
    }

    /// Re-read the browser store and fold every cookie into the registry.
    /// Registry cookies within the listing's scope that the store no longer
    /// holds are dropped. Returns how many cookies the store reported.
    pub async fn refresh_cookies(&mut self, host: Option<&str>) -> Result<usize> {
        let store = self.cookie_store.as_ref().ok_or(MonitorError::NoCookieStore)?;
        let cookies = store.list_cookies(host)?;
        let count = cookies.len();
        let listed: HashSet<CookieKey> = cookies.iter().map(Cookie::key).collect();

        let stale: Vec<CookieKey> = self
            .engine
            .cookies(CookieFilter::All)
            .map(|record| &record.key)
            .filter(|key| host.is_none_or(|host| in_host_scope(&key.domain, host)))
            .filter(|key| !listed.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            self.forget_cookie(key).await;
        }

        for cookie in cookies {
            self.observe_cookie(cookie).await;
        }
        Ok(count)
    }

    /// Drop a cookie the browser no longer holds
    async fn forget_cookie(&mut self, key: CookieKey) {
        if self.engine.remove_cookie(&key).is_none() {
            return;
        }
        self.dirty = true;
        debug!("Cookie {} left the browser store", key);
        self.output_manager
            .notify(&Notification::CookieUpdate { key, removed: true, record: None })
            .await;
        self.push_badge().await;
    }

    /// Delete one cookie from the browser, then from the registry
    pub async fn delete_cookie(&mut self, key: &CookieKey) -> ActionResult {
        if self.engine.cookie(key).is_none() {
            return ActionResult::failure("Cookie not found in cache");
        }
        let Some(store) = self.cookie_store.clone() else {
            return ActionResult::failure(MonitorError::NoCookieStore.to_string());
        };

        match store.remove_cookie(key) {
            Ok(true) => {
                self.engine.remove_cookie(key);
                self.dirty = true;
                info!("🗑️ Deleted cookie {}", key);
                self.output_manager
                    .notify(&Notification::CookieUpdate {
                        key: key.clone(),
                        removed: true,
                        record: None,
                    })
                    .await;
                self.push_badge().await;
                self.persist_or_log();
                ActionResult::ok()
            }
            Ok(false) => {
                ActionResult::failure("Cookie removal failed - cookie may not exist or be protected")
            }
            Err(e) => {
                error!("Failed to delete cookie {}: {}", key, e);
                ActionResult::failure(e.to_string())
            }
        }
    }

    /// Re-enumerate the browser store, then attempt to delete every harmful cookie.
    /// Failures are collected; one refusal never stops the rest.
    pub async fn delete_harmful_cookies(&mut self) -> PurgeReport {
        let Some(store) = self.cookie_store.clone() else {
            return PurgeReport::failed(MonitorError::NoCookieStore.to_string());
        };

        let filter = self.config.source.domain_filter.clone();
        if let Err(e) = self.refresh_cookies(filter.as_deref()).await {
            warn!("Could not refresh cookies before purge: {}", e);
        }

        let harmful: Vec<CookieKey> = self
            .engine
            .cookies(CookieFilter::Harmful)
            .map(|record| record.key.clone())
            .collect();

        let mut report = PurgeReport {
            success: true,
            deleted_count: 0,
            total_harmful: harmful.len(),
            errors: vec![],
            error: None,
        };

        for key in harmful {
            match store.remove_cookie(&key) {
                Ok(true) => {
                    self.engine.remove_cookie(&key);
                    self.dirty = true;
                    report.deleted_count += 1;
                    self.output_manager
                        .notify(&Notification::CookieUpdate { key, removed: true, record: None })
                        .await;
                }
                Ok(false) => {
                    report.errors.push(format!("Failed to delete {} - may be protected", key.name));
                }
                Err(e) => {
                    report.errors.push(format!("Failed to delete {}: {}", key.name, e));
                }
            }
        }

        info!(
            "🧹 Deleted {} of {} harmful cookies",
            report.deleted_count, report.total_harmful
        );
        self.output_manager
            .notify(&Notification::Purge { report: report.clone() })
            .await;
        self.push_badge().await;
        self.persist_or_log();
        report
    }

    pub async fn block_domain(&mut self, domain: &str) -> ActionResult {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return ActionResult::failure("Domain must not be empty");
        }
        if self.engine.block_domain(&domain) {
            info!("🚫 Blocked domain {}", domain);
        }
        self.after_block_change(&domain).await;
        ActionResult::ok()
    }

    pub async fn unblock_domain(&mut self, domain: &str) -> ActionResult {
        let domain = domain.trim().to_ascii_lowercase();
        if !self.engine.unblock_domain(&domain) {
            return ActionResult::failure(format!("{} is not blocked", domain));
        }
        info!("Unblocked domain {}", domain);
        self.after_block_change(&domain).await;
        ActionResult::ok()
    }

    async fn after_block_change(&mut self, domain: &str) {
        self.dirty = true;
        if let Some(tracker) = self.engine.tracker(domain).cloned() {
            self.output_manager
                .notify(&Notification::TrackerUpdate {
                    tracker,
                    request_blocked: false,
                })
                .await;
        }
        self.push_badge().await;
        self.persist_or_log();
    }

    pub async fn set_monitoring(&mut self, enabled: bool) -> ActionResult {
        self.engine.set_monitoring(enabled);
        self.dirty = true;
        info!("Monitoring {}", if enabled { "enabled" } else { "disabled" });
        self.output_manager
            .notify(&Notification::MonitoringChanged { enabled })
            .await;
        self.persist_or_log();
        ActionResult::ok()
    }

    pub fn privacy_score(&self) -> u8 {
        self.engine.privacy_score()
    }

    /// Get current monitor statistics
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            monitoring_enabled: self.engine.monitoring_enabled(),
            cookies: self.engine.cookie_count(),
            harmful_cookies: self.engine.cookies(CookieFilter::Harmful).count(),
            tracking_cookies: self.engine.cookies(CookieFilter::Tracking).count(),
            trackers: self.engine.tracker_count(),
            blocked_domains: self.engine.blocked_domains().count(),
            threats: self.engine.threat_count(),
            privacy_score: self.engine.privacy_score(),
            events_processed: self.events_processed,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            last_event_time: self.last_event_time,
        }
    }

    async fn push_badge(&mut self) {
        let threats = self.engine.threat_count();
        self.output_manager
            .notify(&Notification::Badge { threats })
            .await;
    }

    /// Write the current registries to the state database
    pub fn persist(&mut self) -> Result<()> {
        self.state_manager.save_snapshot(&self.engine.snapshot())?;
        self.dirty = false;
        Ok(())
    }

    fn persist_or_log(&mut self) {
        if let Err(e) = self.persist() {
            error!("Failed to persist state: {}", e);
        }
    }

    /// Persist and finalize outputs
    pub async fn shutdown(&mut self) -> Result<()> {
        self.persist_or_log();
        self.output_manager.finalize().await?;
        info!("🏁 Privacy monitor stopped gracefully");
        Ok(())
    }
}
