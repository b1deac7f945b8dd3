/*!
Static pattern and lookup tables used for classification
*/

/// Advertising and cross-site tracking network identifiers.
/// Matched as substrings of the lower-cased cookie name or domain.
pub const HARMFUL_PATTERNS: &[&str] = &[
    "doubleclick",
    "googleadservices",
    "facebook",
    "googlesyndication",
    "amazon-adsystem",
    "adsystem",
    "outbrain",
    "taboola",
    "criteo",
    "scorecardresearch",
    "quantserve",
    "_gads",
];

/// DoubleClick cookie names, matched against the whole cookie name.
pub const HARMFUL_COOKIE_NAMES: &[&str] = &["ide", "dsid"];

/// Analytics and tracking token patterns.
pub const TRACKING_PATTERNS: &[&str] = &[
    "analytics",
    "tracking",
    "_ga",
    "_gid",
    "_gat",
    "__utm",
    "utm_",
    "fbp",
    "fbclid",
    "_hjid",
    "gtm",
    "hotjar",
    "mixpanel",
];

/// Session, authentication and preference tokens.
pub const ESSENTIAL_PATTERNS: &[&str] = &[
    "session",
    "auth",
    "login",
    "csrf",
    "preferences",
    "consent",
    "security",
    "cart",
    "checkout",
    "lang",
    "theme",
    "user",
];

pub const TRACKING_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.com",
    "connect.facebook.net",
    "amazon-adsystem.com",
    "googlesyndication.com",
    "outbrain.com",
    "taboola.com",
    "criteo.com",
    "scorecardresearch.com",
    "quantserve.com",
    "adsystem.amazon.com",
    "googleadservices.com",
    "bing.com",
    "yahoo.com",
    "twitter.com",
    "linkedin.com",
    "pinterest.com",
    "hotjar.com",
    "mixpanel.com",
    "segment.com",
];

/// Display names, first substring match wins
pub const TRACKER_NAMES: &[(&str, &str)] = &[
    ("google-analytics.com", "Google Analytics"),
    ("googletagmanager.com", "Google Tag Manager"),
    ("doubleclick.net", "DoubleClick"),
    ("facebook.com", "Facebook Pixel"),
    ("connect.facebook.net", "Facebook SDK"),
    ("amazon-adsystem.com", "Amazon Advertising"),
    ("googlesyndication.com", "Google AdSense"),
    ("outbrain.com", "Outbrain"),
    ("taboola.com", "Taboola"),
    ("criteo.com", "Criteo"),
    ("googleadservices.com", "Google Ads"),
];

pub const HIGH_RISK_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "facebook.com",
    "criteo.com",
    "outbrain.com",
    "taboola.com",
];

pub const MEDIUM_RISK_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "amazon-adsystem.com",
];

pub const TRACKER_DATA_COLLECTED: &[(&str, &[&str])] = &[
    (
        "google-analytics.com",
        &["Page views", "User interactions", "Device info", "Location"],
    ),
    (
        "facebook.com",
        &["Social interactions", "Profile data", "Custom events", "Conversions"],
    ),
    (
        "doubleclick.net",
        &["Browsing history", "Ad interactions", "Demographics", "Interests"],
    ),
    (
        "amazon-adsystem.com",
        &["Shopping behavior", "Product views", "Purchase history"],
    ),
];

pub const DEFAULT_DATA_COLLECTED: &[&str] = &["User behavior", "Page interactions"];

/// Path, query or host fragments that mark an image load as a tracking pixel
pub const PIXEL_PATTERNS: &[&str] = &[
    "pixel",
    "beacon",
    "track",
    "analytics",
    "collect",
    "impression",
    "view",
    "event",
    "conversion",
];

/// Inline script snippets and the tracker domain each one loads
pub const INLINE_SCRIPT_SIGNATURES: &[(&str, &str)] = &[
    ("google-analytics.com", "google-analytics.com"),
    ("googletagmanager.com", "googletagmanager.com"),
    ("facebook.com/tr", "facebook.com"),
    ("doubleclick.net", "doubleclick.net"),
    ("googlesyndication.com", "googlesyndication.com"),
    ("amazon-adsystem.com", "amazon-adsystem.com"),
    ("gtag(", "googletagmanager.com"),
    ("ga(", "google-analytics.com"),
    ("fbq(", "facebook.com"),
    ("_gaq", "google-analytics.com"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_pattern_tables_are_disjoint() {
        for pattern in HARMFUL_PATTERNS {
            assert!(!TRACKING_PATTERNS.contains(pattern), "{pattern}");
            assert!(!ESSENTIAL_PATTERNS.contains(pattern), "{pattern}");
        }
        for pattern in TRACKING_PATTERNS {
            assert!(!ESSENTIAL_PATTERNS.contains(pattern), "{pattern}");
        }
    }

    #[test]
    fn cookie_patterns_are_lower_case() {
        let all = HARMFUL_PATTERNS
            .iter()
            .chain(HARMFUL_COOKIE_NAMES)
            .chain(TRACKING_PATTERNS)
            .chain(ESSENTIAL_PATTERNS);
        for pattern in all {
            assert_eq!(*pattern, pattern.to_lowercase());
        }
    }
}
