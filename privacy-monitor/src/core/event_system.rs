/*!
Event-driven sources feeding the monitor: browser cookie store polling,
the browser activity feed, and the periodic persist tick
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use filetime::FileTime;
use futures::stream::{self, BoxStream, SelectAll};
use privacy_engine::{Cookie, CookieKey};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_stream::{wrappers::IntervalStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserCookieStore, in_host_scope};
use crate::core::config::MonitorConfig;
use crate::core::error::Result;

/// Events emitted by the monitoring sources
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A cookie appeared, changed, or disappeared from the browser store
    CookieChanged { cookie: Cookie, removed: bool },
    /// Browser activity: requests, navigations, images, inline scripts
    Activity(Activity),
    /// Time to snapshot the registries
    PersistTick,
    /// A source failed; monitoring continues
    SourceError(String),
}

/// One line of the activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Activity {
    /// Outgoing request about to be sent
    Request { url: String },
    /// A page finished loading
    Navigation { url: String },
    /// An image was added to a page
    Pixel { url: String },
    /// Inline script body found on a page
    Script {
        #[serde(default)]
        page: Option<String>,
        content: String,
    },
}

/// Re-enumerates the browser cookie store and reports differences
pub struct CookiePoller {
    store: BrowserCookieStore,
    domain_filter: Option<String>,
    interval: Duration,
    known: HashMap<CookieKey, (blake3::Hash, Cookie)>,
    last_modified: Option<FileTime>,
}

impl CookiePoller {
    pub fn new(store: BrowserCookieStore, domain_filter: Option<String>, interval: Duration) -> Self {
        Self {
            store,
            domain_filter,
            interval,
            known: HashMap::new(),
            last_modified: None,
        }
    }

    /// Treat `cookies` as already reported, so the first enumeration only
    /// reports what differs from them. Cookies outside the domain filter are ignored.
    pub fn with_known(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        for cookie in cookies {
            let in_scope = self
                .domain_filter
                .as_deref()
                .is_none_or(|host| in_host_scope(&cookie.domain, host));
            if in_scope {
                self.known.insert(cookie.key(), (fingerprint(&cookie), cookie));
            }
        }
        self
    }

    /// Compare the store against the last enumeration.
    /// Skips the read entirely when the database files have not been touched.
    pub fn poll(&mut self) -> Result<Vec<MonitorEvent>> {
        let modified = self.store.last_modified();
        if modified.is_some() && modified == self.last_modified {
            return Ok(vec![]);
        }

        let cookies = self.store.list_cookies(self.domain_filter.as_deref())?;
        let mut seen = HashMap::with_capacity(cookies.len());
        let mut events = Vec::new();

        for cookie in cookies {
            let key = cookie.key();
            let hash = fingerprint(&cookie);
            let changed = match self.known.get(&key) {
                Some((previous, _)) => *previous != hash,
                None => true,
            };
            if changed {
                events.push(MonitorEvent::CookieChanged {
                    cookie: cookie.clone(),
                    removed: false,
                });
            }
            seen.insert(key, (hash, cookie));
        }

        for (key, (_, cookie)) in self.known.drain() {
            if !seen.contains_key(&key) {
                events.push(MonitorEvent::CookieChanged { cookie, removed: true });
            }
        }

        if !events.is_empty() {
            debug!("Cookie store changed: {} events", events.len());
        }
        self.known = seen;
        self.last_modified = modified;
        Ok(events)
    }

    pub fn into_stream(mut self) -> BoxStream<'static, MonitorEvent> {
        let mut ticks = IntervalStream::new(tokio::time::interval(self.interval));

        Box::pin(async_stream::stream! {
            while ticks.next().await.is_some() {
                match self.poll() {
                    Ok(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    Err(e) => {
                        error!("Cookie store polling error: {}", e);
                        yield MonitorEvent::SourceError(e.to_string());
                    }
                }
            }
        })
    }
}

/// Everything that makes a cookie observably different
fn fingerprint(cookie: &Cookie) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for field in [&cookie.domain, &cookie.name, &cookie.value] {
        hasher.update(field.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(cookie.path.as_deref().unwrap_or_default().as_bytes());
    hasher.update(&[0]);
    hasher.update(&[
        flag(cookie.secure),
        flag(cookie.http_only),
        cookie.same_site.map(|s| s as u8 + 1).unwrap_or(0),
    ]);
    let expires = cookie.expires.map(|e| e.timestamp_micros()).unwrap_or_default();
    hasher.update(&expires.to_le_bytes());
    hasher.finalize()
}

fn flag(value: Option<bool>) -> u8 {
    match value {
        None => 0,
        Some(false) => 1,
        Some(true) => 2,
    }
}

/// Follows an append-only JSON-lines activity file
pub struct ActivityFeed {
    path: PathBuf,
    interval: Duration,
    offset: u64,
    /// Bytes after the last newline, decoded once the line is complete
    partial: Vec<u8>,
}

impl ActivityFeed {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            interval,
            offset: 0,
            partial: Vec::new(),
        }
    }

    /// Start following from the current end of the file
    pub async fn skip_existing(&mut self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            self.offset = tokio::fs::metadata(&self.path).await?.len();
        }
        self.partial.clear();
        Ok(())
    }

    /// Read activity appended since the last call.
    /// Malformed lines are logged and dropped; a trailing partial line waits for the next read.
    pub async fn read_new(&mut self) -> Result<Vec<Activity>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(vec![]);
        }

        let len = tokio::fs::metadata(&self.path).await?.len();
        if len < self.offset {
            info!("Activity feed truncated, reading from the start");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(vec![]);
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;

        self.partial.extend_from_slice(&buf);
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Ok(vec![]);
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        let mut activity = Vec::new();
        for raw in complete.split(|&b| b == b'\n') {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!("Skipping activity line that is not UTF-8: {}", e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Activity>(line) {
                Ok(entry) => activity.push(entry),
                Err(e) => warn!("Skipping malformed activity line ({}): {}", e, line),
            }
        }
        Ok(activity)
    }

    pub fn into_stream(mut self) -> BoxStream<'static, MonitorEvent> {
        let mut ticks = IntervalStream::new(tokio::time::interval(self.interval));

        Box::pin(async_stream::stream! {
            if let Err(e) = self.skip_existing().await {
                warn!("Could not seek activity feed {:?}: {}", self.path, e);
            }
            while ticks.next().await.is_some() {
                match self.read_new().await {
                    Ok(entries) => {
                        for entry in entries {
                            yield MonitorEvent::Activity(entry);
                        }
                    }
                    Err(e) => {
                        error!("Activity feed error: {}", e);
                        yield MonitorEvent::SourceError(e.to_string());
                    }
                }
            }
        })
    }
}

/// Merges every configured source into one event stream
pub struct EventProcessor {
    poller: Option<CookiePoller>,
    feed: Option<ActivityFeed>,
    persist_interval: Duration,
}

impl EventProcessor {
    /// `known` is the registry the monitor starts with; cookies in it that the
    /// store no longer holds are reported as removed on the first poll
    pub fn new(config: &MonitorConfig, store: Option<BrowserCookieStore>, known: Vec<Cookie>) -> Self {
        let source = &config.source;
        Self {
            poller: store.map(|store| {
                CookiePoller::new(
                    store,
                    source.domain_filter.clone(),
                    Duration::from_millis(source.cookie_poll_interval_ms),
                )
                .with_known(known)
            }),
            feed: source.activity_log_path.clone().map(|path| {
                ActivityFeed::new(path, Duration::from_millis(source.activity_poll_interval_ms))
            }),
            persist_interval: Duration::from_millis(config.state.persist_interval_ms),
        }
    }

    /// Start the event processing system
    pub fn start(self) -> SelectAll<BoxStream<'static, MonitorEvent>> {
        info!("Starting event-driven browser monitoring...");
        let mut sources: Vec<BoxStream<'static, MonitorEvent>> = Vec::new();

        if let Some(poller) = self.poller {
            sources.push(poller.into_stream());
        } else {
            warn!("No cookie store available, cookie changes will not be observed");
        }
        if let Some(feed) = self.feed {
            sources.push(feed.into_stream());
        }

        let mut ticks = tokio::time::interval(self.persist_interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sources.push(Box::pin(
            IntervalStream::new(ticks).map(|_| MonitorEvent::PersistTick),
        ));

        stream::select_all(sources)
    }
}
