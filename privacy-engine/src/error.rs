/*!
Errors raised at the engine boundary
*/

use thiserror::Error;

/// Classification itself never fails; these come from decoding input
#[derive(Debug, Error)]
pub enum EngineError {
    /// The URL could not be parsed
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL parsed but carries no hostname (`data:`, `about:blank`, ...)
    #[error("url has no host: {0}")]
    MissingHost(String),

    /// A persisted snapshot could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
