//! Latest-value cards shown above the charts.

use serde::Serialize;

use super::time_format::to_date_time;
use crate::storage::Reading;

/// Display text of the summary cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryCard {
    pub power: String,
    pub diverted: String,
    pub load: String,
    pub last_update: String,
}

impl SummaryCard {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            power: display_value(reading.power),
            diverted: display_value(reading.diverted),
            load: display_value(reading.load),
            last_update: to_date_time(reading.timestamp),
        }
    }
}

/// Shortest decimal form of a value; empty when the reading lacks it
pub fn display_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
