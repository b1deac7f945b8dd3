/*!
Hostname extraction for request and navigation URLs
*/

use url::Url;

use crate::error::{EngineError, Result};
use crate::tables::PIXEL_PATTERNS;

/// Extract the lower-cased hostname from a request or navigation URL
pub fn host_from_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).map_err(|source| EngineError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(host.trim_end_matches('.').to_ascii_lowercase()),
        _ => Err(EngineError::MissingHost(raw.to_string())),
    }
}

/// Cookie domain without the leading dot of a domain-scoped cookie
pub fn bare_cookie_domain(domain: &str) -> &str {
    domain.strip_prefix('.').unwrap_or(domain)
}

/// URL schemes that never carry third-party tracking traffic
pub fn is_internal_scheme(raw: &str) -> bool {
    const INTERNAL: &[&str] = &["chrome://", "chrome-extension://", "about:", "moz-extension://", "edge://"];
    INTERNAL.iter().any(|scheme| raw.starts_with(scheme))
}

/// Whether an image URL looks like a tracking pixel: a pixel pattern in its
/// path, query or host. Unparseable URLs are never pixels.
pub fn is_tracking_pixel(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    let path = url.path().to_ascii_lowercase();
    let query = url.query().unwrap_or_default().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    PIXEL_PATTERNS
        .iter()
        .any(|pattern| path.contains(pattern) || query.contains(pattern) || host.contains(pattern))
}
