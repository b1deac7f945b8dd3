/*!
Error type shared by the monitor components
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Browser cookie database or state database failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine error: {0}")]
    Engine(#[from] privacy_engine::EngineError),

    /// Another monitor already owns the state database
    #[error("state database is locked by another monitor: {0}")]
    StateLocked(String),

    /// The cookie database has neither a `cookies` nor a `moz_cookies` table
    #[error("unsupported cookie database: {0}")]
    UnsupportedCookieStore(String),

    #[error("no browser cookie store is available")]
    NoCookieStore,

    /// The monitor loop has stopped and no longer accepts commands
    #[error("monitor is not running")]
    MonitorStopped,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
