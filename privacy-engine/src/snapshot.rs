/*!
Serializable view of the engine state handed to the persistence layer
*/

use serde::{Deserialize, Serialize};

use crate::{cookie::CookieRecord, error::Result, tracker::TrackerRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub monitoring_enabled: bool,
    pub blocked_domains: Vec<String>,
    pub tracker_records: Vec<TrackerRecord>,
    pub cookie_records: Vec<CookieRecord>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
