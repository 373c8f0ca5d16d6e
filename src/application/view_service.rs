// View service - Resolves a slider position into markers, heat points and statistics
use crate::application::session::{Snapshot, ViewError};
use crate::domain::sensor::SensorRegistry;
use crate::domain::series::{older_than, position_at_or_before};
use crate::domain::view::{
    HeatPoint, HeatmapScale, Marker, RenderSet, Statistics, Trend, round_half_up,
};
use crate::domain::clock::CivilClock;

#[derive(Debug, Clone, Copy)]
pub struct ViewService {
    clock: CivilClock,
    scale: HeatmapScale,
}

impl ViewService {
    pub fn new(clock: CivilClock, scale: HeatmapScale) -> Self {
        Self { clock, scale }
    }

    pub fn clock(&self) -> &CivilClock {
        &self.clock
    }

    /// Render the given selection, or an empty set when nothing is loaded
    pub fn render_selection(
        &self,
        snapshot: &Snapshot,
        registry: &SensorRegistry,
        selection: Option<usize>,
    ) -> Result<RenderSet, ViewError> {
        match selection {
            Some(index) => self.select_timestamp(snapshot, registry, index),
            None => Ok(RenderSet::empty(Statistics::compute(
                &snapshot.series,
                registry,
            ))),
        }
    }

    /// Per sensor, the latest reading at or before `axis[index]` with its trend.
    ///
    /// Sensors without such a reading, or without a known position, are left out.
    pub fn select_timestamp(
        &self,
        snapshot: &Snapshot,
        registry: &SensorRegistry,
        index: usize,
    ) -> Result<RenderSet, ViewError> {
        let selected = snapshot
            .axis
            .get(index)
            .ok_or(ViewError::SelectionOutOfRange {
                index,
                len: snapshot.axis.len(),
            })?;

        let mut markers = Vec::new();
        let mut heat = Vec::new();

        for (sensor_id, readings) in snapshot.series.iter() {
            let Some(position) = position_at_or_before(readings, selected) else {
                continue;
            };
            let Some(sensor) = registry.get(sensor_id) else {
                continue;
            };

            let current = readings[position];
            let previous = older_than(readings, position).map(|r| r.temperature);

            markers.push(Marker {
                sensor_id,
                sensor_name: sensor.name.clone(),
                lat: sensor.lat,
                lon: sensor.lon,
                temperature: current.temperature,
                display_temperature: round_half_up(current.temperature),
                trend: Trend::between(previous, current.temperature),
                timestamp: current.timestamp,
                display_time: self.clock.format(current.timestamp),
            });
            heat.push(HeatPoint {
                lat: sensor.lat,
                lon: sensor.lon,
                intensity: self.scale.intensity(current.temperature),
            });
        }

        Ok(RenderSet {
            index: Some(index),
            selected_timestamp: Some(selected),
            selected_time: Some(self.clock.format(selected)),
            markers,
            heat,
            statistics: Statistics::compute(&snapshot.series, registry),
            viewport: None,
        })
    }
}
