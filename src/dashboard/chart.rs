//! Chart Views
//!
//! A chart view is one single-series time chart rendered by the browser.
//! The server owns the series data and tells the page what to draw:
//! `chart_created` when a view is created, `point_added` for every plotted
//! point and `chart_destroyed` when the view is torn down.
//!
//! Views cannot be cleared or resized in place. Changing what a chart shows
//! means destroying it and creating a fresh one.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::time_format::to_axis_time;
use super::UiSink;
use crate::storage::Reading;
use crate::websocket::ServerMessage;

/// Points kept per series before the oldest is evicted
pub const DEFAULT_WINDOW: usize = 40;

/// Options a chart is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// DOM anchor the chart renders into
    pub target: String,
    pub series_name: String,
    /// Series colour; the renderer's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_color: Option<String>,
    pub y_axis_label: String,
    /// Sliding-window size of the series
    pub window: usize,
}

impl ChartConfig {
    pub fn new(
        target: impl Into<String>,
        series_name: impl Into<String>,
        y_axis_label: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            series_name: series_name.into(),
            series_color: None,
            y_axis_label: y_axis_label.into(),
            window: DEFAULT_WINDOW,
        }
    }

    /// Builder method: set series colour
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.series_color = Some(color.into());
        self
    }

    /// Builder method: set sliding-window size
    pub fn window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Power drawn at the supply
    pub fn power_supply() -> Self {
        Self::new("chart-power-supply", "POWER SUPPLY", "W").color("#A62639")
    }

    /// Energy diverted to the load
    pub fn diverted_energy() -> Self {
        Self::new("chart-diverted-energy", "ENERGY DIVERTED", "W/h").color("#50b8b4")
    }

    /// Power at the load
    pub fn power_at_load() -> Self {
        Self::new("chart-powerAtLoad", "POWER AT LOAD", "W")
    }
}

/// Rendering options sent to the browser with `chart_created`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    #[serde(flatten)]
    pub config: ChartConfig,
    pub chart_type: &'static str,
    pub animation: bool,
    pub data_labels: bool,
    pub credits: bool,
    pub x_axis: &'static str,
    pub second_format: &'static str,
}

impl From<&ChartConfig> for ChartSpec {
    fn from(config: &ChartConfig) -> Self {
        Self {
            config: config.clone(),
            chart_type: "spline",
            animation: false,
            data_labels: true,
            credits: false,
            x_axis: "datetime",
            second_format: "%H:%M:%S",
        }
    }
}

/// One plotted point: x in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: i64,
    pub y: f64,
}

/// Append-only point buffer with a sliding window.
///
/// Once the length exceeds the window the oldest point is evicted on
/// insert, so the series never holds more than `window` points.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    points: VecDeque<ChartPoint>,
    window: usize,
}

impl ChartSeries {
    pub fn new(window: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(window + 1),
            window,
        }
    }

    /// Append a point, returning the evicted one if the window overflowed
    pub fn push(&mut self, point: ChartPoint) -> Option<ChartPoint> {
        self.points.push_back(point);
        if self.points.len() > self.window {
            self.points.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn oldest(&self) -> Option<&ChartPoint> {
        self.points.front()
    }

    pub fn latest(&self) -> Option<&ChartPoint> {
        self.points.back()
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }
}

/// Handle to one live chart.
///
/// Dropping a view without `destroy` leaves the browser chart in place.
pub struct ChartView {
    config: ChartConfig,
    series: ChartSeries,
    ui: UiSink,
}

impl ChartView {
    /// Create a chart with one empty series and announce it to the page
    pub fn create(config: ChartConfig, ui: &UiSink) -> Self {
        let _ = ui.send(ServerMessage::ChartCreated {
            chart: ChartSpec::from(&config),
        });

        Self {
            series: ChartSeries::new(config.window),
            config,
            ui: ui.clone(),
        }
    }

    /// Plot `value` at `timestamp` (epoch seconds) and redraw immediately
    pub fn add_point(&mut self, timestamp: i64, value: f64) {
        let point = ChartPoint {
            x: to_axis_time(timestamp),
            y: value,
        };
        let shift = self.series.push(point).is_some();

        let _ = self.ui.send(ServerMessage::PointAdded {
            target: self.config.target.clone(),
            x: point.x,
            y: point.y,
            shift,
        });
    }

    /// Release the chart. The handle is consumed; create a new one to plot again.
    pub fn destroy(self) {
        let _ = self.ui.send(ServerMessage::ChartDestroyed {
            target: self.config.target,
        });
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn series(&self) -> &ChartSeries {
        &self.series
    }
}

/// The three dashboard charts, owned together
pub struct ChartSet {
    pub power: ChartView,
    pub diverted: ChartView,
    pub load: ChartView,
}

impl ChartSet {
    /// Create the power supply, diverted energy and load charts
    pub fn create(window: usize, ui: &UiSink) -> Self {
        Self {
            power: ChartView::create(ChartConfig::power_supply().window(window), ui),
            diverted: ChartView::create(ChartConfig::diverted_energy().window(window), ui),
            load: ChartView::create(ChartConfig::power_at_load().window(window), ui),
        }
    }

    /// Fan a reading out to every chart. Missing values are not plotted.
    pub fn plot(&mut self, reading: &Reading) {
        if let Some(power) = reading.power {
            self.power.add_point(reading.timestamp, power);
        }
        if let Some(diverted) = reading.diverted {
            self.diverted.add_point(reading.timestamp, diverted);
        }
        if let Some(load) = reading.load {
            self.load.add_point(reading.timestamp, load);
        }
    }

    pub fn destroy(self) {
        self.power.destroy();
        self.diverted.destroy();
        self.load.destroy();
    }
}
