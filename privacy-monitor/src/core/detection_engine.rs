/*!
Plugin-based detection engine for identifying tracker activity in browser signals
*/

use privacy_engine::{
    Cookie, DetectionKind, domain::{bare_cookie_domain, is_internal_scheme}, host_from_url,
    inline_script_trackers, is_tracking_domain, is_tracking_pixel,
};
use tracing::{debug, info};

use crate::core::{config::DetectorKind, event_system::Activity};

/// Something observed in the browser that may reveal a tracker
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    Activity(&'a Activity),
    Cookie(&'a Cookie),
}

/// A tracker domain that should be counted once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerHit {
    pub domain: String,
    pub kind: DetectionKind,
}

impl TrackerHit {
    fn new(domain: impl Into<String>, kind: DetectionKind) -> Self {
        Self {
            domain: domain.into(),
            kind,
        }
    }
}

/// Trait for tracker detection plugins
pub trait TrackerDetector: Send + Sync {
    /// Name of the detector
    fn name(&self) -> &'static str;

    /// Config switch that enables this detector
    fn kind(&self) -> DetectorKind;

    /// Tracker domains revealed by the signal, if any
    fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit>;
}

/// Main detection engine that coordinates multiple detectors
pub struct DetectionEngine {
    detectors: Vec<Box<dyn TrackerDetector>>,
}

impl DetectionEngine {
    pub fn new(enabled: &[DetectorKind]) -> Self {
        let mut detectors: Vec<Box<dyn TrackerDetector>> = vec![
            Box::new(NetworkRequestDetector),
            Box::new(TrackingPixelDetector),
            Box::new(InlineScriptDetector),
            Box::new(TrackingCookieDetector),
        ];

        // Filter detectors based on configuration
        detectors.retain(|detector| enabled.contains(&detector.kind()));

        info!("Initialized detection engine with {} detectors", detectors.len());

        Self { detectors }
    }

    pub fn is_enabled(&self, kind: DetectorKind) -> bool {
        self.detectors.iter().any(|detector| detector.kind() == kind)
    }

    /// Run every detector over the signal. A domain is reported at most once per signal;
    /// the first detector to claim it decides the detection kind.
    pub fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit> {
        let mut hits: Vec<TrackerHit> = Vec::new();
        for detector in &self.detectors {
            for hit in detector.detect(signal) {
                if hits.iter().any(|existing| existing.domain == hit.domain) {
                    continue;
                }
                debug!("{} detected tracker {}", detector.name(), hit.domain);
                hits.push(hit);
            }
        }
        hits
    }
}

/// Requests and navigations whose host is a known tracking domain
pub struct NetworkRequestDetector;

impl TrackerDetector for NetworkRequestDetector {
    fn name(&self) -> &'static str {
        "NetworkRequestDetector"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::NetworkRequest
    }

    fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit> {
        let url = match signal {
            Signal::Activity(Activity::Request { url })
            | Signal::Activity(Activity::Navigation { url })
            | Signal::Activity(Activity::Pixel { url }) => url,
            _ => return vec![],
        };
        if is_internal_scheme(url) {
            return vec![];
        }

        match host_from_url(url) {
            Ok(host) if is_tracking_domain(&host) => {
                vec![TrackerHit::new(host, DetectionKind::NetworkRequest)]
            }
            Ok(_) => vec![],
            Err(e) => {
                debug!("Ignoring unparseable request URL {}: {}", url, e);
                vec![]
            }
        }
    }
}

/// Images whose URL looks like a tracking beacon
pub struct TrackingPixelDetector;

impl TrackerDetector for TrackingPixelDetector {
    fn name(&self) -> &'static str {
        "TrackingPixelDetector"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::TrackingPixel
    }

    fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit> {
        let Signal::Activity(Activity::Pixel { url }) = signal else {
            return vec![];
        };
        if !is_tracking_pixel(url) {
            return vec![];
        }
        match host_from_url(url) {
            Ok(host) => vec![TrackerHit::new(host, DetectionKind::TrackingPixel)],
            Err(_) => vec![],
        }
    }
}

/// Inline scripts carrying a known tracker loader
pub struct InlineScriptDetector;

impl TrackerDetector for InlineScriptDetector {
    fn name(&self) -> &'static str {
        "InlineScriptDetector"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::InlineScript
    }

    fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit> {
        let Signal::Activity(Activity::Script { content, .. }) = signal else {
            return vec![];
        };
        inline_script_trackers(content)
            .into_iter()
            .map(|domain| TrackerHit::new(domain, DetectionKind::InlineScript))
            .collect()
    }
}

/// Cookies set by a tracking domain. Off unless configured.
pub struct TrackingCookieDetector;

impl TrackerDetector for TrackingCookieDetector {
    fn name(&self) -> &'static str {
        "TrackingCookieDetector"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::TrackingCookie
    }

    fn detect(&self, signal: Signal<'_>) -> Vec<TrackerHit> {
        let Signal::Cookie(cookie) = signal else {
            return vec![];
        };
        let domain = bare_cookie_domain(&cookie.domain).to_ascii_lowercase();
        if is_tracking_domain(&domain) {
            vec![TrackerHit::new(domain, DetectionKind::Cookie)]
        } else {
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_detectors() -> DetectionEngine {
        DetectionEngine::new(&[
            DetectorKind::NetworkRequest,
            DetectorKind::TrackingPixel,
            DetectorKind::InlineScript,
            DetectorKind::TrackingCookie,
        ])
    }

    fn request(url: &str) -> Activity {
        Activity::Request { url: url.to_string() }
    }

    #[test]
    fn tracking_requests_are_detected_by_host() {
        let engine = all_detectors();
        let hits = engine.detect(Signal::Activity(&request("https://stats.g.doubleclick.net/collect?v=1")));
        assert_eq!(
            hits,
            vec![TrackerHit::new("stats.g.doubleclick.net", DetectionKind::NetworkRequest)]
        );

        assert!(engine.detect(Signal::Activity(&request("https://example.org/"))).is_empty());
        assert!(engine.detect(Signal::Activity(&request("not a url"))).is_empty());
        assert!(engine
            .detect(Signal::Activity(&request("chrome-extension://abc/analytics.js")))
            .is_empty());
    }

    #[test]
    fn pixel_on_tracking_host_counts_once() {
        let engine = all_detectors();
        let pixel = Activity::Pixel {
            url: "https://www.facebook.com/tr?id=1&ev=PageView".into(),
        };
        let hits = engine.detect(Signal::Activity(&pixel));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, DetectionKind::NetworkRequest);
    }

    #[test]
    fn pixel_on_unknown_host_is_a_tracking_pixel() {
        let engine = all_detectors();
        let pixel = Activity::Pixel {
            url: "https://cdn.example.net/beacon.gif".into(),
        };
        assert_eq!(
            engine.detect(Signal::Activity(&pixel)),
            vec![TrackerHit::new("cdn.example.net", DetectionKind::TrackingPixel)]
        );
    }

    #[test]
    fn inline_scripts_map_to_owning_domain() {
        let engine = all_detectors();
        let script = Activity::Script {
            page: Some("https://news.example.com/".into()),
            content: "gtag('config', 'G-1'); ga('send'); fbq('track', 'Lead');".into(),
        };
        let domains: Vec<_> = engine
            .detect(Signal::Activity(&script))
            .into_iter()
            .map(|hit| hit.domain)
            .collect();
        assert_eq!(
            domains,
            vec!["googletagmanager.com", "google-analytics.com", "facebook.com"]
        );
    }

    #[test]
    fn cookie_detector_is_opt_in() {
        let cookie = Cookie::new(".DoubleClick.net", "IDE");

        let default_engine = DetectionEngine::new(&[DetectorKind::NetworkRequest]);
        assert!(!default_engine.is_enabled(DetectorKind::TrackingCookie));
        assert!(default_engine.detect(Signal::Cookie(&cookie)).is_empty());

        assert_eq!(
            all_detectors().detect(Signal::Cookie(&cookie)),
            vec![TrackerHit::new("doubleclick.net", DetectionKind::Cookie)]
        );
    }
}
