//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::Reading;

// ============================================
// READING DTOs
// ============================================

/// Reading pushed by the device or a script
#[derive(Debug, Deserialize)]
pub struct PushReadingRequest {
    /// Epoch seconds, defaults to now
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub power: Option<f64>,
    #[serde(default)]
    pub diverted: Option<f64>,
    /// Older firmware sends the load as `temperature`
    #[serde(default, alias = "temperature")]
    pub load: Option<f64>,
}

impl PushReadingRequest {
    pub fn into_reading(self) -> Reading {
        Reading {
            timestamp: self.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
            power: self.power,
            diverted: self.diverted,
            load: self.load,
        }
    }
}

/// Query parameters of `GET /api/v1/readings`
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    /// Newest readings to return
    #[serde(default)]
    pub last: Option<usize>,
    /// Inclusive upper bound on the timestamp
    #[serde(default)]
    pub end_at: Option<i64>,
}

/// Readings listing, ascending by timestamp
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingsResponse {
    pub count: usize,
    pub readings: Vec<Reading>,
}

// ============================================
// RANGE DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct SetRangeRequest {
    pub range: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RangeResponse {
    /// Stored range, absent until the user picks one
    pub range: Option<u32>,
    /// Range the charts actually use
    pub effective: u32,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or unhealthy
    pub status: String,
    /// Storage status
    pub storage: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Open dashboard pages
    pub connections: usize,
    /// Readings held across all users
    pub readings: usize,
    /// Application version
    pub version: String,
}
