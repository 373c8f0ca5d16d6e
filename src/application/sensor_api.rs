// Port for the remote devices/metrics API
use crate::domain::sensor::SensorId;
use crate::domain::series::TimeWindow;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Parse(String),
}

/// One device as listed by the API; positions may be missing
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: SensorId,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
}

/// One metrics entry. `None` marks a value that was present but not numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricEntry {
    pub device_id: SensorId,
    pub temperature: Option<f64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPage {
    pub entries: Vec<MetricEntry>,
    /// Rows dropped because they had no usable device id or were not objects
    pub malformed: usize,
    pub page: u32,
    pub total_pages: Option<u32>,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
    pub sensor_ids: Vec<SensorId>,
    pub window: TimeWindow,
    pub limit: u32,
}

#[async_trait]
pub trait SensorApi: Send + Sync {
    /// List devices, optionally restricted to one tag
    async fn list_devices(&self, tag: Option<&str>) -> Result<Vec<DeviceRecord>, SourceError>;

    /// Fetch one page (1-based) of metrics
    async fn fetch_metrics_page(
        &self,
        query: &MetricsQuery,
        page: u32,
    ) -> Result<MetricsPage, SourceError>;
}
