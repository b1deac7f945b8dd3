/*!
Cookie and tracker classification engine.

Cookies and request domains are classified against static pattern tables and
folded into two registries keyed by identity, alongside a user-maintained set
of blocked domains. All operations are synchronous and infallible; the only
errors come from decoding URLs and snapshots at the boundary.

```
use privacy_engine::{Cookie, DetectionKind, PrivacyEngine};

let mut engine = PrivacyEngine::new();
engine.upsert_cookie(Cookie::new(".doubleclick.net", "id"));
engine.record_tracker_hit("doubleclick.net", DetectionKind::NetworkRequest);
assert_eq!(engine.privacy_score(), 100 - 10 - 8);
```
*/

pub mod cookie;
pub mod domain;
pub mod engine;
pub mod error;
pub mod snapshot;
pub mod tables;
pub mod tracker;

pub use cookie::{
    Classification, Cookie, CookieKey, CookieRecord, Purpose, RiskFactor, SameSite, classify_cookie,
};
pub use domain::{host_from_url, is_tracking_pixel};
pub use engine::{CookieFilter, PrivacyEngine, compute_privacy_score};
pub use error::{EngineError, Result};
pub use snapshot::Snapshot;
pub use tracker::{
    DetectionKind, RiskLevel, TrackerCategory, TrackerRecord, inline_script_trackers,
    is_tracking_domain,
};
