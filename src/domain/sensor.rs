// Sensor domain model
use serde::Serialize;
use std::collections::HashMap;

pub type SensorId = i64;

/// A located sensor as reported by the devices endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub id: SensorId,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

impl Sensor {
    pub fn new(id: SensorId, lat: f64, lon: f64, name: String) -> Self {
        Self { id, lat, lon, name }
    }
}

/// Known sensors keyed by id. Replaced wholesale on every metadata load.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    sensors: HashMap<SensorId, Sensor>,
}

impl SensorRegistry {
    pub fn new(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        Self {
            sensors: sensors.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(&id)
    }

    pub fn contains(&self, id: SensorId) -> bool {
        self.sensors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Sensor ids in ascending order, so request URLs are stable between refreshes
    pub fn ids(&self) -> Vec<SensorId> {
        let mut ids: Vec<SensorId> = self.sensors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn sensors(&self) -> Vec<&Sensor> {
        let mut sensors: Vec<&Sensor> = self.sensors.values().collect();
        sensors.sort_by_key(|s| s.id);
        sensors
    }
}
