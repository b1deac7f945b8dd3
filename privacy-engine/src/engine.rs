/*!
The classification engine: owns the cookie registry, the tracker registry and
the blocked-domain set
*/

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::{
    cookie::{Cookie, CookieKey, CookieRecord},
    snapshot::Snapshot,
    tracker::{DetectionKind, TrackerRecord},
};

/// Which cookies a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookieFilter {
    #[default]
    All,
    Harmful,
    Tracking,
    Essential,
}

impl CookieFilter {
    pub fn matches(&self, record: &CookieRecord) -> bool {
        match self {
            CookieFilter::All => true,
            CookieFilter::Harmful => record.is_harmful(),
            CookieFilter::Tracking => record.is_tracking(),
            CookieFilter::Essential => record.is_essential(),
        }
    }
}

/// Score a set of cookies and trackers on a 0-100 scale.
///
/// Every harmful cookie costs 10 points, every tracking cookie 5 and every
/// unblocked tracker 8.
pub fn compute_privacy_score<'a, C, T>(cookies: C, trackers: T) -> u8
where
    C: IntoIterator<Item = &'a CookieRecord>,
    T: IntoIterator<Item = &'a TrackerRecord>,
{
    let mut score: i64 = 100;
    for cookie in cookies {
        if cookie.is_harmful() {
            score -= 10;
        }
        if cookie.is_tracking() {
            score -= 5;
        }
    }
    score -= 8 * trackers.into_iter().filter(|t| !t.blocked).count() as i64;
    score.clamp(0, 100) as u8
}

/// Single-writer engine state. Callers apply one event at a time.
#[derive(Debug, Default)]
pub struct PrivacyEngine {
    cookies: BTreeMap<CookieKey, CookieRecord>,
    trackers: BTreeMap<String, TrackerRecord>,
    blocked_domains: BTreeSet<String>,
    monitoring_enabled: bool,
}

impl PrivacyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an engine from a persisted snapshot.
    ///
    /// Cookies are re-classified and tracker `blocked` flags are taken from the
    /// blocked-domain list, so a stale snapshot cannot break either invariant.
    pub fn restore(snapshot: Snapshot) -> Self {
        let mut engine = Self {
            monitoring_enabled: snapshot.monitoring_enabled,
            blocked_domains: snapshot.blocked_domains.into_iter().collect(),
            ..Self::default()
        };
        for record in snapshot.cookie_records {
            engine.upsert_cookie(record.cookie);
        }
        for mut tracker in snapshot.tracker_records {
            tracker.blocked = engine.blocked_domains.contains(&tracker.domain);
            engine.trackers.insert(tracker.domain.clone(), tracker);
        }
        engine
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            monitoring_enabled: self.monitoring_enabled,
            blocked_domains: self.blocked_domains.iter().cloned().collect(),
            tracker_records: self.trackers.values().cloned().collect(),
            cookie_records: self.cookies.values().cloned().collect(),
        }
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring_enabled
    }

    pub fn set_monitoring(&mut self, enabled: bool) {
        self.monitoring_enabled = enabled;
    }

    /// Classify `cookie` and insert it, replacing any record with the same key
    pub fn upsert_cookie(&mut self, cookie: Cookie) -> &CookieRecord {
        let record = CookieRecord::new(cookie);
        let key = record.key.clone();
        self.cookies.insert(key.clone(), record);
        &self.cookies[&key]
    }

    /// Returns the removed record; removing an unknown key is a no-op
    pub fn remove_cookie(&mut self, key: &CookieKey) -> Option<CookieRecord> {
        self.cookies.remove(key)
    }

    pub fn cookie(&self, key: &CookieKey) -> Option<&CookieRecord> {
        self.cookies.get(key)
    }

    pub fn cookies(&self, filter: CookieFilter) -> impl Iterator<Item = &CookieRecord> {
        self.cookies.values().filter(move |record| filter.matches(record))
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    pub fn record_tracker_hit(&mut self, domain: &str, kind: DetectionKind) -> &TrackerRecord {
        self.record_tracker_hit_at(domain, kind, Utc::now())
    }

    /// Count one more hit for `domain`, creating its record on first sight
    pub fn record_tracker_hit_at(
        &mut self,
        domain: &str,
        kind: DetectionKind,
        now: DateTime<Utc>,
    ) -> &TrackerRecord {
        let blocked = self.blocked_domains.contains(domain);
        self.trackers
            .entry(domain.to_string())
            .and_modify(|tracker| tracker.record_hit(now))
            .or_insert_with(|| TrackerRecord::new(domain, kind, blocked, now))
    }

    pub fn tracker(&self, domain: &str) -> Option<&TrackerRecord> {
        self.trackers.get(domain)
    }

    pub fn trackers(&self) -> impl Iterator<Item = &TrackerRecord> {
        self.trackers.values()
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Add `domain` to the blocked set and flag its tracker record.
    /// Returns false if it was already blocked.
    pub fn block_domain(&mut self, domain: &str) -> bool {
        let added = self.blocked_domains.insert(domain.to_string());
        if let Some(tracker) = self.trackers.get_mut(domain) {
            tracker.blocked = true;
        }
        added
    }

    /// Returns false if `domain` was not blocked
    pub fn unblock_domain(&mut self, domain: &str) -> bool {
        let removed = self.blocked_domains.remove(domain);
        if let Some(tracker) = self.trackers.get_mut(domain) {
            tracker.blocked = false;
        }
        removed
    }

    pub fn blocked_domains(&self) -> impl Iterator<Item = &str> {
        self.blocked_domains.iter().map(String::as_str)
    }

    /// Containment check made before a matched request is let through
    pub fn should_block(&self, domain: &str) -> bool {
        self.blocked_domains.contains(domain)
    }

    pub fn privacy_score(&self) -> u8 {
        compute_privacy_score(self.cookies.values(), self.trackers.values())
    }

    /// Badge value: harmful cookies plus observed trackers
    pub fn threat_count(&self) -> usize {
        self.cookies(CookieFilter::Harmful).count() + self.trackers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn harmful(i: usize) -> Cookie {
        Cookie::new(".doubleclick.net", format!("id_{i}"))
    }

    #[test]
    fn upsert_replaces_whole_record() {
        let mut engine = PrivacyEngine::new();
        let mut cookie = Cookie::new("example.com", "sid");
        cookie.secure = Some(false);
        cookie.value = "one".into();
        engine.upsert_cookie(cookie.clone());

        cookie.secure = Some(true);
        cookie.value = "two".into();
        let record = engine.upsert_cookie(cookie).clone();

        assert_eq!(engine.cookie_count(), 1);
        assert_eq!(record.cookie.value, "two");
        assert_eq!(record.cookie.secure, Some(true));
        assert!(!record
            .classification
            .risk_factors
            .contains(&crate::cookie::RiskFactor::NotSecure));
    }

    #[test]
    fn removing_unknown_cookie_is_noop() {
        let mut engine = PrivacyEngine::new();
        engine.upsert_cookie(Cookie::new("example.com", "a"));
        assert!(engine.remove_cookie(&CookieKey::new("example.com", "b", None)).is_none());
        assert_eq!(engine.cookie_count(), 1);
    }

    #[test]
    fn tracker_hits_accumulate() {
        let mut engine = PrivacyEngine::new();
        let start = Utc::now();
        engine.record_tracker_hit_at("doubleclick.net", DetectionKind::NetworkRequest, start);
        engine.record_tracker_hit_at(
            "doubleclick.net",
            DetectionKind::TrackingPixel,
            start + Duration::seconds(5),
        );

        let tracker = engine.tracker("doubleclick.net").unwrap();
        assert_eq!(tracker.request_count, 2);
        assert_eq!(tracker.first_seen, start);
        assert_eq!(tracker.last_seen, start + Duration::seconds(5));
        assert_eq!(tracker.detection_kind, DetectionKind::NetworkRequest);
    }

    #[test]
    fn new_tracker_inherits_block_state() {
        let mut engine = PrivacyEngine::new();
        engine.block_domain("criteo.com");
        let tracker = engine.record_tracker_hit("criteo.com", DetectionKind::NetworkRequest);
        assert!(tracker.blocked);
    }

    #[test]
    fn unblock_clears_flag() {
        let mut engine = PrivacyEngine::new();
        engine.record_tracker_hit("taboola.com", DetectionKind::NetworkRequest);
        assert!(engine.block_domain("taboola.com"));
        assert!(!engine.block_domain("taboola.com"));
        assert!(engine.unblock_domain("taboola.com"));
        assert!(!engine.tracker("taboola.com").unwrap().blocked);
        assert!(!engine.should_block("taboola.com"));
    }

    #[test]
    fn score_clamps_at_zero() {
        let mut engine = PrivacyEngine::new();
        for i in 0..20 {
            engine.upsert_cookie(harmful(i));
        }
        assert_eq!(engine.privacy_score(), 0);
    }

    #[test]
    fn blocked_trackers_do_not_cost_points() {
        let mut engine = PrivacyEngine::new();
        engine.record_tracker_hit("bing.com", DetectionKind::NetworkRequest);
        assert_eq!(engine.privacy_score(), 92);
        engine.block_domain("bing.com");
        assert_eq!(engine.privacy_score(), 100);
    }

    #[test]
    fn threat_count_adds_harmful_cookies_and_trackers() {
        let mut engine = PrivacyEngine::new();
        engine.upsert_cookie(harmful(1));
        engine.upsert_cookie(Cookie::new("example.com", "theme"));
        engine.record_tracker_hit("hotjar.com", DetectionKind::NetworkRequest);
        engine.block_domain("hotjar.com");
        assert_eq!(engine.threat_count(), 2);
    }

    #[test]
    fn filters_select_by_classification() {
        let mut engine = PrivacyEngine::new();
        engine.upsert_cookie(harmful(1));
        engine.upsert_cookie(Cookie::new("example.com", "_gid"));
        engine.upsert_cookie(Cookie::new("example.com", "csrf_token"));

        assert_eq!(engine.cookies(CookieFilter::All).count(), 3);
        assert_eq!(engine.cookies(CookieFilter::Harmful).count(), 1);
        assert_eq!(engine.cookies(CookieFilter::Tracking).count(), 1);
        assert_eq!(engine.cookies(CookieFilter::Essential).count(), 1);
    }

    #[test]
    fn restore_reestablishes_block_flags() {
        let mut engine = PrivacyEngine::new();
        engine.record_tracker_hit("outbrain.com", DetectionKind::NetworkRequest);
        let mut snapshot = engine.snapshot();
        snapshot.blocked_domains.push("outbrain.com".into());

        let restored = PrivacyEngine::restore(snapshot);
        assert!(restored.tracker("outbrain.com").unwrap().blocked);
    }
}
