//! Banner windows: named roster runs used to attribute pulls when several
//! runs of a themed banner share one pool type.
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::codec::WIRE_TIME_FORMAT;
use crate::record::PoolType;

mod wire_time {
    use super::{NaiveDateTime, WIRE_TIME_FORMAT};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        time: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(WIRE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let value = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&value, WIRE_TIME_FORMAT).map_err(Error::custom)
    }
}

/// One run of a themed banner: its 5★/4★ roster and validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerWindow {
    pub name: String,
    /// Featured 5★ names.
    #[serde(default)]
    pub five: Vec<String>,
    /// Featured 4★ names.
    #[serde(default)]
    pub four: Vec<String>,
    #[serde(rename = "from", with = "wire_time")]
    pub from_time: NaiveDateTime,
    #[serde(rename = "to", with = "wire_time")]
    pub to_time: NaiveDateTime,
}

impl BannerWindow {
    /// Whether a pull time falls inside `[from_time, to_time)`.
    #[must_use]
    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.from_time <= time && time < self.to_time
    }
}

/// All known banner windows keyed by pool code token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BannerSchedule {
    windows: BTreeMap<String, Vec<BannerWindow>>,
}

impl BannerSchedule {
    /// Load a schedule from JSON keyed by pool token
    /// (`{"11": [...], "12": [...]}`).
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a schedule.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Windows known for a pool, most recent first as listed in the source.
    #[must_use]
    pub fn windows_for(&self, pool_type: PoolType) -> &[BannerWindow] {
        self.windows
            .get(pool_type.wire_token())
            .map_or(&[], Vec::as_slice)
    }

    /// The window of a pool active at a given time, if any.
    #[must_use]
    pub fn active_at(&self, pool_type: PoolType, time: NaiveDateTime) -> Option<&BannerWindow> {
        self.windows_for(pool_type)
            .iter()
            .find(|window| window.contains(time))
    }
}
