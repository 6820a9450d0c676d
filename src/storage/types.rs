//! Core data types for the MK2 realtime database
//!
//! - `Reading`: one timestamped sample from the diverter
//! - `UserPaths`: per-user storage namespace
//! - `LogQuery`: ordered range query over a readings log

use serde::{Deserialize, Serialize};

/// One timestamped sensor sample from the MK2 diverter.
///
/// The timestamp (seconds since epoch) doubles as the ordering key of the
/// readings log. Numeric fields are optional because the device payload is
/// stored as-is; a missing field is displayed empty and never plotted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Power at the supply, W
    #[serde(default)]
    pub power: Option<f64>,
    /// Energy diverted to the load, W/h
    #[serde(default)]
    pub diverted: Option<f64>,
    /// Power at the load, W. Older firmware writes this as `temperature`.
    #[serde(default, alias = "temperature")]
    pub load: Option<f64>,
}

impl Reading {
    /// Create a complete reading at a specific timestamp
    pub fn new(timestamp: i64, power: f64, diverted: f64, load: f64) -> Self {
        Self {
            timestamp,
            power: Some(power),
            diverted: Some(diverted),
            load: Some(load),
        }
    }
}

/// Storage paths owned by one user.
///
/// Every component of a dashboard session reads this namespace; none of
/// them mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    uid: String,
    readings: String,
    chart_range: String,
}

impl UserPaths {
    pub fn for_uid(uid: &str) -> Self {
        let root = format!("UsersData/{}", uid);
        Self {
            uid: uid.to_string(),
            readings: format!("{}/readings", root),
            chart_range: format!("{}/charts/range", root),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Path of the readings log
    pub fn readings(&self) -> &str {
        &self.readings
    }

    /// Path of the stored chart range
    pub fn chart_range(&self) -> &str {
        &self.chart_range
    }
}

/// Ordered range query over a readings log.
///
/// Results are always ascending by timestamp. `end_at` is inclusive and is
/// applied before `limit_to_last`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub limit_to_last: Option<usize>,
    pub end_at: Option<i64>,
}

impl LogQuery {
    /// Query matching every reading
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder method: keep only the newest `n` matches
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit_to_last = Some(n);
        self
    }

    /// Builder method: ignore readings newer than `timestamp`
    pub fn end_at(mut self, timestamp: i64) -> Self {
        self.end_at = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_decodes_legacy_temperature_field() {
        let json = r#"{"timestamp": 1641317355, "power": 120.5, "diverted": 30.2, "temperature": 22.1}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading, Reading::new(1641317355, 120.5, 30.2, 22.1));
    }

    #[test]
    fn test_reading_decodes_load_field() {
        let json = r#"{"timestamp": 1641317355, "power": 120.5, "diverted": 30.2, "load": 22.1}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.load, Some(22.1));
    }

    #[test]
    fn test_reading_missing_fields_are_none() {
        let reading: Reading = serde_json::from_str(r#"{"timestamp": 10}"#).unwrap();
        assert_eq!(reading.power, None);
        assert_eq!(reading.diverted, None);
        assert_eq!(reading.load, None);
    }

    #[test]
    fn test_reading_serializes_canonical_load() {
        let json = serde_json::to_string(&Reading::new(1, 1.0, 2.0, 3.0)).unwrap();
        assert!(json.contains("\"load\":3.0"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_user_paths() {
        let paths = UserPaths::for_uid("abc123");
        assert_eq!(paths.uid(), "abc123");
        assert_eq!(paths.readings(), "UsersData/abc123/readings");
        assert_eq!(paths.chart_range(), "UsersData/abc123/charts/range");
    }

    #[test]
    fn test_log_query_builder() {
        let query = LogQuery::all().end_at(500).limit_to_last(100);
        assert_eq!(query.limit_to_last, Some(100));
        assert_eq!(query.end_at, Some(500));
        assert_eq!(LogQuery::all(), LogQuery::default());
    }
}
