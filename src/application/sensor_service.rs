// Sensor service - Use case for loading the sensor registry
use crate::application::sensor_api::{DeviceRecord, SensorApi, SourceError};
use crate::application::session::Session;
use crate::domain::sensor::{Sensor, SensorRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct SensorService {
    api: Arc<dyn SensorApi>,
    tag: Option<String>,
}

impl SensorService {
    pub fn new(api: Arc<dyn SensorApi>, tag: Option<String>) -> Self {
        Self { api, tag }
    }

    /// Refresh the session's registry from the devices endpoint.
    ///
    /// Failures are logged and leave the previous registry in place; the
    /// registry in effect afterwards is returned either way.
    pub async fn load_sensors(&self, session: &Session) -> Arc<SensorRegistry> {
        match self.fetch_registry().await {
            Ok(registry) => {
                if registry.is_empty() {
                    tracing::warn!(
                        "No devices with coordinates found (tag: {})",
                        self.tag.as_deref().unwrap_or("<none>")
                    );
                } else {
                    tracing::info!("Loaded {} devices with coordinates", registry.len());
                }
                session.replace_registry(registry).await
            }
            Err(e) => {
                tracing::error!("Error fetching device metadata: {}", e);
                session.registry().await
            }
        }
    }

    async fn fetch_registry(&self) -> Result<SensorRegistry, SourceError> {
        let devices = self.api.list_devices(self.tag.as_deref()).await?;
        Ok(SensorRegistry::new(devices.into_iter().filter_map(located)))
    }
}

fn located(device: DeviceRecord) -> Option<Sensor> {
    let (Some(lat), Some(lon)) = (device.latitude, device.longitude) else {
        return None;
    };
    let name = device
        .name
        .unwrap_or_else(|| format!("Sensor {}", device.device_id));
    Some(Sensor::new(device.device_id, lat, lon, name))
}
