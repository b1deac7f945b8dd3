/*!
Tracker records and the lookups used to describe a newly seen tracking domain
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tables::{
    DEFAULT_DATA_COLLECTED, HIGH_RISK_DOMAINS, INLINE_SCRIPT_SIGNATURES, MEDIUM_RISK_DOMAINS,
    TRACKER_DATA_COLLECTED, TRACKER_NAMES, TRACKING_DOMAINS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerCategory {
    Analytics,
    Advertising,
    Social,
    Fingerprinting,
    Other,
}

impl fmt::Display for TrackerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrackerCategory::Analytics => "analytics",
            TrackerCategory::Advertising => "advertising",
            TrackerCategory::Social => "social",
            TrackerCategory::Fingerprinting => "fingerprinting",
            TrackerCategory::Other => "other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(label)
    }
}

/// How a tracker was first observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    NetworkRequest,
    TrackingPixel,
    InlineScript,
    Cookie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub domain: String,
    pub name: String,
    pub category: TrackerCategory,
    pub risk_level: RiskLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub request_count: u64,
    pub blocked: bool,
    pub data_collected: Vec<String>,
    pub detection_kind: DetectionKind,
}

impl TrackerRecord {
    /// Describe a tracking domain seen for the first time
    pub fn new(domain: &str, kind: DetectionKind, blocked: bool, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_string(),
            name: tracker_name(domain),
            category: tracker_category(domain),
            risk_level: tracker_risk_level(domain),
            first_seen: now,
            last_seen: now,
            request_count: 1,
            blocked,
            data_collected: tracker_data_collected(domain),
            detection_kind: kind,
        }
    }

    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.request_count += 1;
        self.last_seen = now;
    }
}

/// Whether `domain` looks like a known tracking domain.
///
/// Containment is checked both ways, so subdomains (`stats.g.doubleclick.net`)
/// and fragments (`facebook`) both match. This favours recall over precision.
pub fn is_tracking_domain(domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    TRACKING_DOMAINS
        .iter()
        .any(|tracker| domain.contains(tracker) || tracker.contains(domain))
}

pub fn tracker_name(domain: &str) -> String {
    for (key, name) in TRACKER_NAMES {
        if domain.contains(key) {
            return name.to_string();
        }
    }
    capitalize(domain)
}

pub fn tracker_category(domain: &str) -> TrackerCategory {
    let has = |needle: &str| domain.contains(needle);
    if has("analytics") || has("tag") {
        TrackerCategory::Analytics
    } else if has("ads") || has("doubleclick") || has("adsystem") {
        TrackerCategory::Advertising
    } else if has("facebook") || has("twitter") || has("linkedin") {
        TrackerCategory::Social
    } else if has("fingerprint") {
        TrackerCategory::Fingerprinting
    } else {
        TrackerCategory::Other
    }
}

pub fn tracker_risk_level(domain: &str) -> RiskLevel {
    if HIGH_RISK_DOMAINS.iter().any(|d| domain.contains(d)) {
        RiskLevel::High
    } else if MEDIUM_RISK_DOMAINS.iter().any(|d| domain.contains(d)) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn tracker_data_collected(domain: &str) -> Vec<String> {
    let labels = TRACKER_DATA_COLLECTED
        .iter()
        .find(|(key, _)| domain.contains(key))
        .map(|(_, labels)| *labels)
        .unwrap_or(DEFAULT_DATA_COLLECTED);
    labels.iter().map(|label| label.to_string()).collect()
}

/// Tracker domains whose loader snippets appear in an inline script, without duplicates
pub fn inline_script_trackers(content: &str) -> Vec<&'static str> {
    let mut domains: Vec<&'static str> = Vec::new();
    for (snippet, domain) in INLINE_SCRIPT_SIGNATURES {
        if content.contains(snippet) && !domains.contains(domain) {
            domains.push(*domain);
        }
    }
    domains
}

fn capitalize(domain: &str) -> String {
    let mut chars = domain.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_domain_matches_subdomains_and_fragments() {
        assert!(is_tracking_domain("stats.g.doubleclick.net"));
        assert!(is_tracking_domain("www.google-analytics.com"));
        assert!(is_tracking_domain("facebook"));
        assert!(!is_tracking_domain("example.org"));
        assert!(!is_tracking_domain(""));
    }

    #[test]
    fn names_fall_back_to_capitalized_domain() {
        assert_eq!(tracker_name("www.google-analytics.com"), "Google Analytics");
        assert_eq!(tracker_name("doubleclick.net"), "DoubleClick");
        assert_eq!(tracker_name("hotjar.com"), "Hotjar.com");
    }

    #[test]
    fn category_rules_apply_in_order() {
        assert_eq!(tracker_category("google-analytics.com"), TrackerCategory::Analytics);
        assert_eq!(tracker_category("googletagmanager.com"), TrackerCategory::Analytics);
        assert_eq!(tracker_category("doubleclick.net"), TrackerCategory::Advertising);
        assert_eq!(tracker_category("amazon-adsystem.com"), TrackerCategory::Advertising);
        assert_eq!(tracker_category("facebook.com"), TrackerCategory::Social);
        assert_eq!(tracker_category("fingerprintjs.com"), TrackerCategory::Fingerprinting);
        assert_eq!(tracker_category("segment.com"), TrackerCategory::Other);
    }

    #[test]
    fn risk_levels_default_to_low() {
        assert_eq!(tracker_risk_level("ad.doubleclick.net"), RiskLevel::High);
        assert_eq!(tracker_risk_level("googletagmanager.com"), RiskLevel::Medium);
        assert_eq!(tracker_risk_level("bing.com"), RiskLevel::Low);
    }

    #[test]
    fn data_collected_has_generic_fallback() {
        assert_eq!(tracker_data_collected("facebook.com").len(), 4);
        assert_eq!(
            tracker_data_collected("segment.com"),
            vec!["User behavior".to_string(), "Page interactions".to_string()]
        );
    }

    #[test]
    fn inline_snippets_map_to_tracker_domains() {
        let script = "window.dataLayer=[];function gtag(){} gtag('js', new Date()); fbq('init', '1');";
        assert_eq!(
            inline_script_trackers(script),
            vec!["googletagmanager.com", "facebook.com"]
        );
        assert!(inline_script_trackers("console.log('hello')").is_empty());
    }

    #[test]
    fn new_record_starts_with_single_request() {
        let now = Utc::now();
        let record = TrackerRecord::new("criteo.com", DetectionKind::NetworkRequest, false, now);
        assert_eq!(record.request_count, 1);
        assert_eq!(record.first_seen, record.last_seen);
        assert_eq!(record.name, "Criteo");
        assert_eq!(record.risk_level, RiskLevel::High);
    }
}
