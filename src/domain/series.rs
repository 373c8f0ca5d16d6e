// Time-series domain models: readings grouped per sensor and the global timestamp axis
use super::sensor::SensorId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Unix seconds
    pub timestamp: i64,
    pub temperature: f64,
}

impl Reading {
    pub fn new(timestamp: i64, temperature: f64) -> Self {
        Self {
            timestamp,
            temperature,
        }
    }
}

/// A reading that passed ingestion filters, tagged with its sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor_id: SensorId,
    pub reading: Reading,
}

impl SensorReading {
    pub fn new(sensor_id: SensorId, timestamp: i64, temperature: f64) -> Self {
        Self {
            sensor_id,
            reading: Reading::new(timestamp, temperature),
        }
    }
}

/// Half-open query window `[start, end)` sent to the metrics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Readings per sensor, most recent first, one reading per timestamp
#[derive(Debug, Clone, Default)]
pub struct SensorSeries {
    series: BTreeMap<SensorId, Vec<Reading>>,
}

/// Ascending, deduplicated observation times across all sensors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimestampAxis {
    timestamps: Vec<i64>,
}

impl SensorSeries {
    /// Group accepted readings per sensor and derive the timestamp axis.
    ///
    /// Readings sharing a sensor and timestamp collapse to the one that came
    /// last in input order.
    pub fn group(entries: impl IntoIterator<Item = SensorReading>) -> (Self, TimestampAxis) {
        let mut grouped: BTreeMap<SensorId, BTreeMap<i64, f64>> = BTreeMap::new();
        let mut timestamps = BTreeSet::new();

        for entry in entries {
            grouped
                .entry(entry.sensor_id)
                .or_default()
                .insert(entry.reading.timestamp, entry.reading.temperature);
            timestamps.insert(entry.reading.timestamp);
        }

        let series = grouped
            .into_iter()
            .map(|(id, readings)| {
                let readings = readings
                    .into_iter()
                    .rev()
                    .map(|(ts, temp)| Reading::new(ts, temp))
                    .collect();
                (id, readings)
            })
            .collect();

        (
            Self { series },
            TimestampAxis {
                timestamps: timestamps.into_iter().collect(),
            },
        )
    }

    #[cfg(test)]
    pub fn get(&self, id: SensorId) -> Option<&[Reading]> {
        self.series.get(&id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorId, &[Reading])> {
        self.series.iter().map(|(id, r)| (*id, r.as_slice()))
    }

    /// Every reading of every sensor
    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.series.values().flatten()
    }

    pub fn sensor_count(&self) -> usize {
        self.series.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl TimestampAxis {
    pub fn get(&self, index: usize) -> Option<i64> {
        self.timestamps.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Index of the most recent timestamp, the "live" selection
    pub fn last_index(&self) -> Option<usize> {
        self.timestamps.len().checked_sub(1)
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.timestamps
    }
}

/// Position of the most recent reading at or before `timestamp`.
///
/// `readings` must be sorted descending by timestamp.
pub fn position_at_or_before(readings: &[Reading], timestamp: i64) -> Option<usize> {
    let idx = readings.partition_point(|r| r.timestamp > timestamp);
    (idx < readings.len()).then_some(idx)
}

/// The next older reading after `position`, strictly earlier in time
pub fn older_than(readings: &[Reading], position: usize) -> Option<&Reading> {
    let current = readings.get(position)?;
    readings[position + 1..]
        .iter()
        .find(|r| r.timestamp < current.timestamp)
}
