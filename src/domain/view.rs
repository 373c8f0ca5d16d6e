// Map view domain models: markers, heat points, statistics and viewport framing
use super::sensor::{SensorId, SensorRegistry};
use super::series::SensorSeries;
use serde::Serialize;
use std::collections::HashMap;

/// Width of the buckets used for the spread statistic
pub const SPREAD_BUCKET_SECS: i64 = 600;

const FIT_PADDING_PX: u32 = 50;
const FIT_MAX_ZOOM: u8 = 17;
const SINGLE_POINT_ZOOM: u8 = 15;

/// Round half up, matching how the map labels display temperatures (-2.5 -> -2)
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    /// Compare rounded temperatures; no previous reading means flat
    pub fn between(previous: Option<f64>, current: f64) -> Self {
        let Some(previous) = previous else {
            return Trend::Flat;
        };
        let (p, c) = (round_half_up(previous), round_half_up(current));
        match c.cmp(&p) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub lat: f64,
    pub lon: f64,
    pub temperature: f64,
    pub display_temperature: i64,
    pub trend: Trend,
    pub timestamp: i64,
    pub display_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lon: f64,
    pub intensity: f64,
}

/// How temperatures are turned into heat overlay intensities
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeatmapScale {
    Raw,
    Normalized { min: f64, max: f64 },
}

impl HeatmapScale {
    pub fn intensity(&self, temperature: f64) -> f64 {
        match *self {
            HeatmapScale::Raw => temperature,
            HeatmapScale::Normalized { min, max } => {
                ((temperature - min) / (max - min)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Aggregates over the whole loaded series. `None` means no data.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Statistics {
    pub active_sensors: usize,
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_bucket_spread: Option<f64>,
}

impl Statistics {
    pub fn compute(series: &SensorSeries, registry: &SensorRegistry) -> Self {
        let active_sensors = series
            .iter()
            .filter(|(id, readings)| !readings.is_empty() && registry.contains(*id))
            .count();

        let mut max_temperature: Option<f64> = None;
        let mut min_temperature: Option<f64> = None;
        let mut buckets: HashMap<i64, (f64, f64, usize)> = HashMap::new();

        for reading in series.readings() {
            let t = reading.temperature;
            max_temperature = Some(max_temperature.map_or(t, |m| m.max(t)));
            min_temperature = Some(min_temperature.map_or(t, |m| m.min(t)));

            let bucket = reading.timestamp.div_euclid(SPREAD_BUCKET_SECS);
            let entry = buckets.entry(bucket).or_insert((t, t, 0));
            entry.0 = entry.0.min(t);
            entry.1 = entry.1.max(t);
            entry.2 += 1;
        }

        let max_bucket_spread = buckets
            .values()
            .filter(|(_, _, count)| *count >= 2)
            .map(|(lo, hi, _)| hi - lo)
            .fold(None, |acc: Option<f64>, spread| {
                Some(acc.map_or(spread, |a| a.max(spread)))
            });

        Self {
            active_sensors,
            max_temperature,
            min_temperature,
            max_bucket_spread,
        }
    }
}

/// Viewport instruction for the map widget
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewport {
    FitBounds {
        south_west: [f64; 2],
        north_east: [f64; 2],
        padding: u32,
        max_zoom: u8,
    },
    Center {
        lat: f64,
        lon: f64,
        zoom: u8,
    },
}

impl Viewport {
    /// Bounds of all marker positions, or a close-up when they coincide
    pub fn covering(markers: &[Marker]) -> Option<Self> {
        let first = markers.first()?;
        let (mut south, mut west) = (first.lat, first.lon);
        let (mut north, mut east) = (first.lat, first.lon);
        for m in &markers[1..] {
            south = south.min(m.lat);
            north = north.max(m.lat);
            west = west.min(m.lon);
            east = east.max(m.lon);
        }

        if south == north && west == east {
            return Some(Viewport::Center {
                lat: south,
                lon: west,
                zoom: SINGLE_POINT_ZOOM,
            });
        }

        Some(Viewport::FitBounds {
            south_west: [south, west],
            north_east: [north, east],
            padding: FIT_PADDING_PX,
            max_zoom: FIT_MAX_ZOOM,
        })
    }
}

/// Tracks whether a consumer already received its initial viewport
#[derive(Debug, Clone, Default)]
pub struct FramingState {
    framed: bool,
}

impl FramingState {
    /// Returns a viewport for the first non-empty render only
    pub fn frame(&mut self, markers: &[Marker]) -> Option<Viewport> {
        if self.framed {
            return None;
        }
        let viewport = Viewport::covering(markers)?;
        self.framed = true;
        Some(viewport)
    }
}

/// Everything the map widget needs to draw one selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSet {
    pub index: Option<usize>,
    pub selected_timestamp: Option<i64>,
    pub selected_time: Option<String>,
    pub markers: Vec<Marker>,
    pub heat: Vec<HeatPoint>,
    pub statistics: Statistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl RenderSet {
    pub fn empty(statistics: Statistics) -> Self {
        Self {
            index: None,
            selected_timestamp: None,
            selected_time: None,
            markers: Vec::new(),
            heat: Vec::new(),
            statistics,
            viewport: None,
        }
    }
}
