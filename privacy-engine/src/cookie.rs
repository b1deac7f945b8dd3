/*!
Cookie records and their privacy classification
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tables::{ESSENTIAL_PATTERNS, HARMFUL_COOKIE_NAMES, HARMFUL_PATTERNS, TRACKING_PATTERNS};

pub const DEFAULT_PATH: &str = "/";

/// Identifies "the same cookie" across observations, independent of value and attributes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CookieKey {
    pub domain: String,
    pub name: String,
    pub path: String,
}

impl CookieKey {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, path: Option<&str>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            path: path.unwrap_or(DEFAULT_PATH).to_string(),
        }
    }
}

impl fmt::Display for CookieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.domain, self.name, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    #[serde(alias = "no_restriction")]
    None,
}

/// A cookie as reported by the cookie source.
///
/// Only `name` and `domain` are required; every other attribute is optional and
/// an absent attribute counts as "not set" for risk purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub http_only: Option<bool>,
    #[serde(default)]
    pub same_site: Option<SameSite>,
    /// Absent for session cookies
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub store_id: Option<String>,
}

impl Cookie {
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            value: String::new(),
            path: None,
            secure: None,
            http_only: None,
            same_site: None,
            expires: None,
            store_id: None,
        }
    }

    pub fn key(&self) -> CookieKey {
        CookieKey::new(self.domain.clone(), self.name.clone(), self.path.as_deref())
    }

    /// Host-only cookies are bound to the exact host; a leading dot widens the scope
    pub fn is_host_only(&self) -> bool {
        !self.domain.starts_with('.')
    }

    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    #[serde(rename = "Associated with known tracking network")]
    KnownTrackingNetwork,
    #[serde(rename = "Third-party cookie (cross-site tracking)")]
    ThirdParty,
    #[serde(rename = "Accessible via JavaScript (XSS risk)")]
    ScriptAccessible,
    #[serde(rename = "Not secure (can be intercepted)")]
    NotSecure,
    #[serde(rename = "No SameSite protection")]
    NoSameSite,
}

impl RiskFactor {
    pub fn description(&self) -> &'static str {
        match self {
            RiskFactor::KnownTrackingNetwork => "Associated with known tracking network",
            RiskFactor::ThirdParty => "Third-party cookie (cross-site tracking)",
            RiskFactor::ScriptAccessible => "Accessible via JavaScript (XSS risk)",
            RiskFactor::NotSecure => "Not secure (can be intercepted)",
            RiskFactor::NoSameSite => "No SameSite protection",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    #[serde(rename = "Cross-site tracking and advertising")]
    Advertising,
    #[serde(rename = "Analytics and user tracking")]
    Analytics,
    #[serde(rename = "Essential website functionality")]
    Essential,
    #[serde(rename = "General website functionality")]
    General,
}

impl Purpose {
    pub fn description(&self) -> &'static str {
        match self {
            Purpose::Advertising => "Cross-site tracking and advertising",
            Purpose::Analytics => "Analytics and user tracking",
            Purpose::Essential => "Essential website functionality",
            Purpose::General => "General website functionality",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_harmful: bool,
    pub is_tracking: bool,
    pub is_essential: bool,
    pub risk_factors: Vec<RiskFactor>,
    pub purpose: Purpose,
}

/// A classified cookie as held in the cookie registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub key: CookieKey,
    pub cookie: Cookie,
    #[serde(flatten)]
    pub classification: Classification,
}

impl CookieRecord {
    pub fn new(cookie: Cookie) -> Self {
        let classification = classify_cookie(&cookie);
        Self {
            key: cookie.key(),
            cookie,
            classification,
        }
    }

    pub fn is_harmful(&self) -> bool {
        self.classification.is_harmful
    }

    pub fn is_tracking(&self) -> bool {
        self.classification.is_tracking
    }

    pub fn is_essential(&self) -> bool {
        self.classification.is_essential
    }
}

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| haystack.contains(pattern))
}

pub fn is_harmful_cookie(cookie: &Cookie) -> bool {
    let name = cookie.name.to_lowercase();
    let domain = cookie.domain.to_lowercase();
    matches_any(&name, HARMFUL_PATTERNS)
        || matches_any(&domain, HARMFUL_PATTERNS)
        || HARMFUL_COOKIE_NAMES.contains(&name.as_str())
}

pub fn is_tracking_cookie(cookie: &Cookie) -> bool {
    matches_any(&cookie.name.to_lowercase(), TRACKING_PATTERNS)
        || matches_any(&cookie.domain.to_lowercase(), TRACKING_PATTERNS)
}

pub fn is_essential_cookie(cookie: &Cookie) -> bool {
    matches_any(&cookie.name.to_lowercase(), ESSENTIAL_PATTERNS)
        || matches_any(&cookie.domain.to_lowercase(), ESSENTIAL_PATTERNS)
}

/// Classify a cookie against the static pattern tables.
///
/// Depends only on the cookie itself, so classifying the same cookie twice
/// always gives the same result.
pub fn classify_cookie(cookie: &Cookie) -> Classification {
    let is_harmful = is_harmful_cookie(cookie);
    let is_tracking = is_tracking_cookie(cookie);
    let is_essential = is_essential_cookie(cookie);

    let mut risk_factors = Vec::new();
    if is_harmful {
        risk_factors.push(RiskFactor::KnownTrackingNetwork);
    }
    if !cookie.is_host_only() {
        risk_factors.push(RiskFactor::ThirdParty);
    }
    if !cookie.http_only.unwrap_or(false) {
        risk_factors.push(RiskFactor::ScriptAccessible);
    }
    if !cookie.secure.unwrap_or(false) && !cookie.domain.contains("localhost") {
        risk_factors.push(RiskFactor::NotSecure);
    }
    if matches!(cookie.same_site, None | Some(SameSite::None)) {
        risk_factors.push(RiskFactor::NoSameSite);
    }

    let purpose = if is_harmful {
        Purpose::Advertising
    } else if is_tracking {
        Purpose::Analytics
    } else if is_essential {
        Purpose::Essential
    } else {
        Purpose::General
    };

    Classification {
        is_harmful,
        is_tracking,
        is_essential,
        risk_factors,
        purpose,
    }
}
