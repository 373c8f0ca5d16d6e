// HTTP implementation of the sensor API port
use crate::application::sensor_api::{
    DeviceRecord, MetricEntry, MetricsPage, MetricsQuery, SensorApi, SourceError,
};
use crate::infrastructure::time_window::to_wire;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpSensorApi {
    client: reqwest::Client,
    base_url: String,
}

// Rows stay untyped until parsed one by one, so a single bad row is skipped
// instead of failing the whole response.
#[derive(Debug, Deserialize)]
struct DevicesResponse {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WireDevice {
    #[serde(default)]
    device_id: Value,
    #[serde(default)]
    latitude: Value,
    #[serde(default)]
    longitude: Value,
    #[serde(default)]
    name: Value,
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    data: Vec<Value>,
    #[serde(default)]
    pagination: Option<WirePagination>,
}

#[derive(Debug, Deserialize)]
struct WireMetric {
    #[serde(default)]
    device_id: Value,
    #[serde(default)]
    temperature: Value,
    #[serde(default)]
    timestamp_server: Value,
}

#[derive(Debug, Deserialize)]
struct WirePagination {
    page: u32,
    #[serde(default)]
    total_pages: Option<u32>,
    has_next: bool,
}

impl HttpSensorApi {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_devices_url(&self, tag: Option<&str>) -> String {
        match tag {
            Some(tag) => format!(
                "{}/devices?tag_name={}",
                self.base_url,
                urlencoding::encode(tag)
            ),
            None => format!("{}/devices", self.base_url),
        }
    }

    fn build_metrics_url(&self, query: &MetricsQuery, page: u32) -> String {
        let ids = query
            .sensor_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}/metrics?device_ids={}&min_date={}&max_date={}&limit={}&page={}",
            self.base_url,
            urlencoding::encode(&ids),
            urlencoding::encode(&to_wire(&query.window.start)),
            urlencoding::encode(&to_wire(&query.window.end)),
            query.limit,
            page
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| SourceError::Parse(e.to_string()))
    }
}

fn parse_devices(response: DevicesResponse) -> Vec<DeviceRecord> {
    let total = response.data.len();
    let devices: Vec<DeviceRecord> = response
        .data
        .into_iter()
        .filter_map(|row| {
            let d: WireDevice = serde_json::from_value(row).ok()?;
            Some(DeviceRecord {
                device_id: id_from(&d.device_id)?,
                latitude: number_from(&d.latitude),
                longitude: number_from(&d.longitude),
                name: d.name.as_str().map(str::to_string),
            })
        })
        .collect();

    if devices.len() < total {
        tracing::warn!("Skipped {} malformed device entries", total - devices.len());
    }
    devices
}

fn parse_metrics(response: MetricsResponse, requested_page: u32) -> MetricsPage {
    let total = response.data.len();
    let entries: Vec<MetricEntry> = response
        .data
        .into_iter()
        .filter_map(|row| {
            let m: WireMetric = serde_json::from_value(row).ok()?;
            Some(MetricEntry {
                device_id: id_from(&m.device_id)?,
                temperature: number_from(&m.temperature),
                timestamp: timestamp_from(&m.timestamp_server),
            })
        })
        .collect();
    let malformed = total - entries.len();

    // Unpaginated responses are complete in one go
    match response.pagination {
        Some(p) => MetricsPage {
            entries,
            malformed,
            page: p.page,
            total_pages: p.total_pages,
            has_next: p.has_next,
        },
        None => MetricsPage {
            entries,
            malformed,
            page: requested_page,
            total_pages: Some(requested_page),
            has_next: false,
        },
    }
}

/// Accept finite JSON numbers and numeric strings alike
fn number_from(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn timestamp_from(value: &Value) -> Option<i64> {
    number_from(value)
        .map(f64::floor)
        .filter(|ts| *ts >= i64::MIN as f64 && *ts < i64::MAX as f64)
        .map(|ts| ts as i64)
}

fn id_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl SensorApi for HttpSensorApi {
    async fn list_devices(&self, tag: Option<&str>) -> Result<Vec<DeviceRecord>, SourceError> {
        let url = self.build_devices_url(tag);
        let response: DevicesResponse = self.get_json(&url).await?;
        Ok(parse_devices(response))
    }

    async fn fetch_metrics_page(
        &self,
        query: &MetricsQuery,
        page: u32,
    ) -> Result<MetricsPage, SourceError> {
        let url = self.build_metrics_url(query, page);
        let response: MetricsResponse = self.get_json(&url).await?;
        Ok(parse_metrics(response, page))
    }
}
