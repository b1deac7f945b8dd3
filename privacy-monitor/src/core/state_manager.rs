/*!
Persistent state management for the cookie and tracker registries
*/

use std::fs::{File, OpenOptions};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use privacy_engine::{Cookie, CookieRecord, Snapshot, TrackerRecord};
use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::core::config::StateConfig;
use crate::core::error::{MonitorError, Result};

const MONITORING_KEY: &str = "monitoring_enabled";
const SAVED_AT_KEY: &str = "saved_at";

/// Owns the state database. Only one monitor may hold it at a time.
pub struct StateManager {
    config: StateConfig,
    conn: Connection,
    _lock: File,
}

impl StateManager {
    /// Lock and open the state database, creating the schema if needed
    pub fn new(config: StateConfig) -> Result<Self> {
        if let Some(parent) = config.state_db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = config.state_db_path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| MonitorError::StateLocked(lock_path.display().to_string()))?;

        let conn = Connection::open(&config.state_db_path)?;
        let manager = Self {
            config,
            conn,
            _lock: lock,
        };
        manager.initialize_schema()?;

        info!("State manager initialized with database: {:?}", manager.config.state_db_path);
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.config.state_db_path
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS monitor_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS blocked_domains (
                domain TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS tracker_records (
                domain TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                request_count INTEGER NOT NULL,
                blocked INTEGER NOT NULL,
                data_collected TEXT NOT NULL, -- JSON array
                detection_kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cookie_records (
                domain TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                cookie TEXT NOT NULL, -- JSON, re-classified on load
                PRIMARY KEY (domain, name, path)
            );
        "#)?;

        Ok(())
    }

    /// Replace the stored state with `snapshot` in a single transaction
    pub fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM blocked_domains; DELETE FROM tracker_records; DELETE FROM cookie_records;",
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO monitor_settings (key, value) VALUES (?1, ?2)",
            (MONITORING_KEY, snapshot.monitoring_enabled.to_string()),
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO monitor_settings (key, value) VALUES (?1, ?2)",
            (SAVED_AT_KEY, format_time(&Utc::now())),
        )?;

        {
            let mut stmt = tx.prepare("INSERT INTO blocked_domains (domain) VALUES (?1)")?;
            for domain in &snapshot.blocked_domains {
                stmt.execute([domain])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO tracker_records
                 (domain, name, category, risk_level, first_seen, last_seen, request_count, blocked, data_collected, detection_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for tracker in &snapshot.tracker_records {
                stmt.execute((
                    &tracker.domain,
                    &tracker.name,
                    enum_text(&tracker.category)?,
                    enum_text(&tracker.risk_level)?,
                    format_time(&tracker.first_seen),
                    format_time(&tracker.last_seen),
                    tracker.request_count as i64,
                    tracker.blocked,
                    serde_json::to_string(&tracker.data_collected)?,
                    enum_text(&tracker.detection_kind)?,
                ))?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO cookie_records (domain, name, path, cookie) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in &snapshot.cookie_records {
                stmt.execute((
                    &record.key.domain,
                    &record.key.name,
                    &record.key.path,
                    serde_json::to_string(&record.cookie)?,
                ))?;
            }
        }

        tx.commit()?;
        debug!(
            "Saved snapshot: {} cookies, {} trackers, {} blocked domains",
            snapshot.cookie_records.len(),
            snapshot.tracker_records.len(),
            snapshot.blocked_domains.len()
        );
        Ok(())
    }

    /// The last saved state, or None if nothing was ever saved
    pub fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        let monitoring: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM monitor_settings WHERE key = ?1",
                [MONITORING_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let Some(monitoring) = monitoring else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare("SELECT domain FROM blocked_domains ORDER BY domain")?;
        let blocked_domains = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Snapshot {
            monitoring_enabled: monitoring == "true",
            blocked_domains,
            tracker_records: self.load_trackers()?,
            cookie_records: self.load_cookies()?,
        }))
    }

    fn load_trackers(&self) -> Result<Vec<TrackerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, name, category, risk_level, first_seen, last_seen, request_count, blocked, data_collected, detection_kind
             FROM tracker_records ORDER BY domain",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TrackerRow {
                    domain: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    risk_level: row.get(3)?,
                    first_seen: row.get(4)?,
                    last_seen: row.get(5)?,
                    request_count: row.get(6)?,
                    blocked: row.get(7)?,
                    data_collected: row.get(8)?,
                    detection_kind: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(TrackerRow::into_record).collect()
    }

    fn load_cookies(&self) -> Result<Vec<CookieRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cookie FROM cookie_records ORDER BY domain, name, path")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for json in rows {
            let cookie: Cookie = serde_json::from_str(&json)?;
            records.push(CookieRecord::new(cookie));
        }
        Ok(records)
    }
}

struct TrackerRow {
    domain: String,
    name: String,
    category: String,
    risk_level: String,
    first_seen: String,
    last_seen: String,
    request_count: i64,
    blocked: bool,
    data_collected: String,
    detection_kind: String,
}

impl TrackerRow {
    fn into_record(self) -> Result<TrackerRecord> {
        Ok(TrackerRecord {
            domain: self.domain,
            name: self.name,
            category: enum_from_text(self.category)?,
            risk_level: enum_from_text(self.risk_level)?,
            first_seen: parse_time(&self.first_seen)?,
            last_seen: parse_time(&self.last_seen)?,
            request_count: self.request_count.max(0) as u64,
            blocked: self.blocked,
            data_collected: serde_json::from_str(&self.data_collected)?,
            detection_kind: enum_from_text(self.detection_kind)?,
        })
    }
}

/// Unit enums are stored as their serialized name, without JSON quotes
fn enum_text<T: Serialize>(value: &T) -> Result<String> {
    Ok(match serde_json::to_value(value)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn enum_from_text<T: DeserializeOwned>(text: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(text))?)
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use privacy_engine::{DetectionKind, PrivacyEngine};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn state_config(path: PathBuf) -> StateConfig {
        StateConfig {
            state_db_path: path,
            persist_interval_ms: 1000,
        }
    }

    fn populated_engine() -> PrivacyEngine {
        let mut engine = PrivacyEngine::new();
        let mut ga = Cookie::new(".google-analytics.com", "_ga");
        ga.value = "GA1.2.3".into();
        ga.expires = Some(Utc::now());
        engine.upsert_cookie(ga);
        engine.upsert_cookie(Cookie::new(".doubleclick.net", "IDE"));
        engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
        engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
        engine.record_tracker_hit("facebook.com", DetectionKind::InlineScript);
        engine.block_domain("facebook.com");
        engine.block_domain("unseen.example");
        engine.set_monitoring(false);
        engine
    }

    #[test]
    fn fresh_database_has_no_snapshot() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(state_config(dir.path().join("state.db"))).unwrap();
        assert!(manager.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn snapshot_round_trips_through_sqlite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let snapshot = populated_engine().snapshot();

        {
            let mut manager = StateManager::new(state_config(path.clone())).unwrap();
            manager.save_snapshot(&snapshot).unwrap();
        }

        let manager = StateManager::new(state_config(path)).unwrap();
        let loaded = manager.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!loaded.monitoring_enabled);
        assert_eq!(loaded.cookie_records.iter().filter(|r| r.is_harmful()).count(), 1);
    }

    #[test]
    fn saving_replaces_previous_state() {
        let dir = tempdir().unwrap();
        let mut manager = StateManager::new(state_config(dir.path().join("state.db"))).unwrap();
        manager.save_snapshot(&populated_engine().snapshot()).unwrap();

        let empty = PrivacyEngine::new().snapshot();
        manager.save_snapshot(&empty).unwrap();
        assert_eq!(manager.load_snapshot().unwrap().unwrap(), empty);
    }

    #[test]
    fn second_manager_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let _first = StateManager::new(state_config(path.clone())).unwrap();

        assert!(matches!(
            StateManager::new(state_config(path)),
            Err(MonitorError::StateLocked(_))
        ));
    }
}
