use chrono::{Duration, Utc};
use privacy_engine::{
    Cookie, CookieFilter, CookieKey, DetectionKind, PrivacyEngine, Purpose, RiskFactor, SameSite,
    Snapshot, classify_cookie, compute_privacy_score,
};

fn sample_engine() -> PrivacyEngine {
    let mut engine = PrivacyEngine::new();

    let mut ga = Cookie::new(".google-analytics.com", "_ga");
    ga.value = "GA1.2.123456789.1234567890".into();
    ga.expires = Some(Utc::now() + Duration::days(365));
    engine.upsert_cookie(ga);

    let mut session = Cookie::new("localhost", "session_token");
    session.http_only = Some(true);
    session.same_site = Some(SameSite::Lax);
    engine.upsert_cookie(session);

    engine.upsert_cookie(Cookie::new(".facebook.com", "fb_tracking"));

    engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
    engine.record_tracker_hit("facebook.com", DetectionKind::InlineScript);
    engine.block_domain("facebook.com");
    engine.set_monitoring(true);
    engine
}

#[test]
fn upsert_twice_equals_upsert_once() {
    let cookie = Cookie::new(".doubleclick.net", "doubleclick_id");

    let mut once = PrivacyEngine::new();
    once.upsert_cookie(cookie.clone());

    let mut twice = PrivacyEngine::new();
    twice.upsert_cookie(cookie.clone());
    twice.upsert_cookie(cookie);

    assert_eq!(once.snapshot(), twice.snapshot());
}

#[test]
fn same_identity_with_new_value_updates_in_place() {
    let mut engine = PrivacyEngine::new();
    let mut cookie = Cookie::new("example.com", "prefs");
    cookie.path = Some("/app".into());
    cookie.value = "a".into();
    engine.upsert_cookie(cookie.clone());

    cookie.value = "b".into();
    cookie.secure = Some(true);
    engine.upsert_cookie(cookie);

    assert_eq!(engine.cookie_count(), 1);
    let record = engine
        .cookie(&CookieKey::new("example.com", "prefs", Some("/app")))
        .unwrap();
    assert_eq!(record.cookie.value, "b");
}

#[test]
fn different_paths_are_different_cookies() {
    let mut engine = PrivacyEngine::new();
    let mut root = Cookie::new("example.com", "sid");
    root.path = Some("/".into());
    let mut nested = root.clone();
    nested.path = Some("/admin".into());

    engine.upsert_cookie(root);
    engine.upsert_cookie(nested);
    engine.upsert_cookie(Cookie::new("example.com", "sid"));

    assert_eq!(engine.cookie_count(), 2);
}

#[test]
fn documented_classification_examples() {
    let ga = classify_cookie(&Cookie::new(".google-analytics.com", "_ga"));
    assert!(ga.is_tracking);
    assert!(!ga.is_harmful);
    assert_eq!(ga.purpose, Purpose::Analytics);

    let dc = classify_cookie(&Cookie::new(".doubleclick.net", "doubleclick_id"));
    assert!(dc.is_harmful);
    assert!(dc.risk_factors.contains(&RiskFactor::ThirdParty));
    assert!(dc.risk_factors.contains(&RiskFactor::KnownTrackingNetwork));

    let mut auth = Cookie::new("example.com", "auth_token");
    auth.secure = Some(false);
    auth.http_only = Some(false);
    let auth = classify_cookie(&auth);
    assert_eq!(auth.risk_factors.len(), 3);
    assert!(!auth.risk_factors.contains(&RiskFactor::ThirdParty));
    assert!(!auth.risk_factors.contains(&RiskFactor::KnownTrackingNetwork));
}

#[test]
fn each_harmful_cookie_costs_ten_points() {
    let mut engine = PrivacyEngine::new();
    engine.upsert_cookie(Cookie::new("example.com", "theme"));
    let mut previous = engine.privacy_score();
    assert_eq!(previous, 100);

    for i in 0..12 {
        engine.upsert_cookie(Cookie::new(".criteo.com", format!("uid{i}")));
        let score = engine.privacy_score();
        assert_eq!(score, previous.saturating_sub(10));
        previous = score;
    }
    assert_eq!(previous, 0);
}

#[test]
fn score_is_bounded() {
    let empty = compute_privacy_score(std::iter::empty(), std::iter::empty());
    assert_eq!(empty, 100);

    let engine = sample_engine();
    let score = engine.privacy_score();
    // harmful fb_tracking (-10, also tracking -5), tracking _ga (-5), unblocked doubleclick (-8)
    assert_eq!(score, 100 - 10 - 5 - 5 - 8);
}

#[test]
fn tracker_aggregation_by_domain() {
    let mut engine = PrivacyEngine::new();
    for _ in 0..3 {
        engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
    }
    engine.record_tracker_hit("facebook.com", DetectionKind::NetworkRequest);

    let trackers: Vec<_> = engine.trackers().collect();
    assert_eq!(trackers.len(), 2);

    let dc = engine.tracker("doubleclick.net").unwrap();
    assert_eq!(dc.request_count, 3);
    assert!(dc.first_seen <= dc.last_seen);
    assert_eq!(engine.tracker("facebook.com").unwrap().request_count, 1);
}

#[test]
fn blocking_survives_later_hits() {
    let mut engine = PrivacyEngine::new();
    engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
    engine.block_domain("doubleclick.net");

    assert!(engine.tracker("doubleclick.net").unwrap().blocked);
    assert!(engine.blocked_domains().any(|d| d == "doubleclick.net"));

    let tracker = engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
    assert!(tracker.blocked);
    assert_eq!(tracker.request_count, 2);
}

#[test]
fn snapshot_round_trip_through_json() {
    let engine = sample_engine();
    let snapshot = engine.snapshot();

    let json = snapshot.to_json().unwrap();
    let decoded = Snapshot::from_json(&json).unwrap();
    assert_eq!(decoded, snapshot);

    let restored = PrivacyEngine::restore(decoded);
    assert_eq!(restored.snapshot(), snapshot);
    assert_eq!(
        restored.cookies(CookieFilter::Harmful).count(),
        engine.cookies(CookieFilter::Harmful).count()
    );
    assert!(restored.monitoring_enabled());
}

#[test]
fn snapshot_uses_camel_case_boundary_names() {
    let json = sample_engine().snapshot().to_json().unwrap();
    assert!(json.contains("\"monitoringEnabled\":true"));
    assert!(json.contains("\"blockedDomains\":[\"facebook.com\"]"));
    assert!(json.contains("\"trackerRecords\""));
    assert!(json.contains("\"cookieRecords\""));
}
