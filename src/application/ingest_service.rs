// Ingest service - Paginated metrics fetch grouped into per-sensor series
use crate::application::sensor_api::{MetricEntry, MetricsQuery, SensorApi, SourceError};
use crate::domain::sensor::SensorRegistry;
use crate::domain::series::{SensorReading, SensorSeries, TimeWindow, TimestampAxis};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: u32,
    pub entries: usize,
    pub accepted: usize,
    pub unknown_sensor: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub series: SensorSeries,
    pub axis: TimestampAxis,
    pub report: IngestReport,
}

/// Everything collected by one paginated fetch
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub entries: Vec<MetricEntry>,
    pub pages: u32,
    pub malformed: usize,
}

#[derive(Clone)]
pub struct IngestService {
    api: Arc<dyn SensorApi>,
    page_limit: u32,
    max_pages: u32,
}

impl IngestService {
    pub fn new(api: Arc<dyn SensorApi>, page_limit: u32, max_pages: u32) -> Self {
        Self {
            api,
            page_limit,
            max_pages,
        }
    }

    /// Fetch readings for every registered sensor within `window`.
    ///
    /// All pages are collected before anything is grouped; a failing page
    /// fails the whole load.
    pub async fn load_readings(
        &self,
        registry: &SensorRegistry,
        window: TimeWindow,
    ) -> Result<Ingested, SourceError> {
        let query = MetricsQuery {
            sensor_ids: registry.ids(),
            window,
            limit: self.page_limit,
        };

        let fetched = self.fetch_all(&query).await?;
        let (accepted, mut report) = filter_entries(&fetched.entries, registry);
        report.pages = fetched.pages;
        report.entries += fetched.malformed;
        report.invalid += fetched.malformed;

        let (series, axis) = SensorSeries::group(accepted);

        tracing::debug!(
            "Grouped {} readings into {} series over {} timestamps",
            report.accepted,
            series.sensor_count(),
            axis.len()
        );

        Ok(Ingested {
            series,
            axis,
            report,
        })
    }

    /// Follow `has_next` page by page, collecting every entry
    pub async fn fetch_all(&self, query: &MetricsQuery) -> Result<Fetched, SourceError> {
        let mut fetched = Fetched::default();
        let mut page = 1;

        loop {
            if page > self.max_pages {
                return Err(SourceError::Parse(format!(
                    "pagination did not end within {} pages",
                    self.max_pages
                )));
            }

            let result = self.api.fetch_metrics_page(query, page).await?;
            tracing::debug!(
                "Loaded metrics page {}/{} ({} entries, has_next={})",
                result.page,
                result
                    .total_pages
                    .map_or_else(|| "?".to_string(), |t| t.to_string()),
                result.entries.len(),
                result.has_next
            );

            fetched.entries.extend(result.entries);
            fetched.malformed += result.malformed;
            fetched.pages = page;
            if !result.has_next {
                return Ok(fetched);
            }
            page += 1;
        }
    }
}

fn filter_entries(
    entries: &[MetricEntry],
    registry: &SensorRegistry,
) -> (Vec<SensorReading>, IngestReport) {
    let mut report = IngestReport {
        entries: entries.len(),
        ..IngestReport::default()
    };

    let accepted: Vec<SensorReading> = entries
        .iter()
        .filter_map(|entry| {
            if !registry.contains(entry.device_id) {
                report.unknown_sensor += 1;
                return None;
            }
            match (entry.timestamp, entry.temperature) {
                (Some(ts), Some(temp)) => Some(SensorReading::new(entry.device_id, ts, temp)),
                _ => {
                    report.invalid += 1;
                    None
                }
            }
        })
        .collect();

    if report.invalid > 0 {
        tracing::debug!("Skipped {} entries without numeric values", report.invalid);
    }
    report.accepted = accepted.len();
    (accepted, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sensor_api::{DeviceRecord, MetricsPage};
    use crate::domain::sensor::Sensor;
    use crate::domain::series::Reading;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct PagedMetrics {
        pages: Vec<Result<MetricsPage, SourceError>>,
        requested: Mutex<Vec<u32>>,
    }

    impl PagedMetrics {
        fn new(pages: Vec<Result<MetricsPage, SourceError>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SensorApi for PagedMetrics {
        async fn list_devices(&self, _tag: Option<&str>) -> Result<Vec<DeviceRecord>, SourceError> {
            Ok(Vec::new())
        }

        async fn fetch_metrics_page(
            &self,
            _query: &MetricsQuery,
            page: u32,
        ) -> Result<MetricsPage, SourceError> {
            self.requested.lock().unwrap().push(page);
            match &self.pages[(page - 1) as usize] {
                Ok(p) => Ok(p.clone()),
                Err(e) => Err(SourceError::Network(e.to_string())),
            }
        }
    }

    fn entry(id: i64, ts: i64, temp: f64) -> MetricEntry {
        MetricEntry {
            device_id: id,
            temperature: Some(temp),
            timestamp: Some(ts),
        }
    }

    fn page(n: u32, count: usize, has_next: bool) -> Result<MetricsPage, SourceError> {
        Ok(MetricsPage {
            entries: (0..count)
                .map(|i| entry(1, (n as i64) * 1000 + i as i64, 20.0))
                .collect(),
            malformed: 0,
            page: n,
            total_pages: Some(3),
            has_next,
        })
    }

    fn window() -> TimeWindow {
        TimeWindow {
            start: Utc.with_ymd_and_hms(2025, 7, 19, 22, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 7, 20, 22, 0, 0).unwrap(),
        }
    }

    fn registry(ids: &[i64]) -> SensorRegistry {
        SensorRegistry::new(
            ids.iter()
                .map(|id| Sensor::new(*id, 49.0, 11.0, format!("s{}", id))),
        )
    }

    #[tokio::test]
    async fn test_pagination_accumulates_all_pages() {
        let api = Arc::new(PagedMetrics::new(vec![
            page(1, 100, true),
            page(2, 100, true),
            page(3, 37, false),
        ]));
        let service = IngestService::new(api.clone(), 100, 1000);
        let query = MetricsQuery {
            sensor_ids: vec![1],
            window: window(),
            limit: 100,
        };

        let fetched = service.fetch_all(&query).await.unwrap();

        assert_eq!(fetched.entries.len(), 237);
        assert_eq!(fetched.pages, 3);
        assert_eq!(api.requested.lock().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failing_page_aborts_load() {
        let api = Arc::new(PagedMetrics::new(vec![
            page(1, 100, true),
            Err(SourceError::Status {
                status: 500,
                body: String::new(),
            }),
        ]));
        let service = IngestService::new(api, 100, 1000);

        let result = service.load_readings(&registry(&[1]), window()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_runaway_pagination_is_capped() {
        let api = Arc::new(PagedMetrics::new(vec![
            page(1, 1, true),
            page(2, 1, true),
            page(3, 1, true),
        ]));
        let service = IngestService::new(api, 100, 2);

        let result = service.load_readings(&registry(&[1]), window()).await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_readings_groups_and_filters() {
        let api = Arc::new(PagedMetrics::new(vec![Ok(MetricsPage {
            entries: vec![
                entry(1, 100, 20.0),
                entry(2, 200, 18.0),
                entry(1, 200, 21.4),
                entry(99, 300, 30.0),
                MetricEntry {
                    device_id: 2,
                    temperature: None,
                    timestamp: Some(400),
                },
            ],
            malformed: 0,
            page: 1,
            total_pages: Some(1),
            has_next: false,
        })]));
        let service = IngestService::new(api, 100, 1000);

        let ingested = service
            .load_readings(&registry(&[1, 2]), window())
            .await
            .unwrap();

        assert_eq!(
            ingested.series.get(1).unwrap(),
            &[Reading::new(200, 21.4), Reading::new(100, 20.0)]
        );
        assert_eq!(ingested.axis.as_slice(), &[100, 200]);
        assert_eq!(
            ingested.report,
            IngestReport {
                pages: 1,
                entries: 5,
                accepted: 3,
                unknown_sensor: 1,
                invalid: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_rows_count_as_invalid() {
        let api = Arc::new(PagedMetrics::new(vec![
            Ok(MetricsPage {
                entries: vec![entry(1, 100, 20.0)],
                malformed: 1,
                page: 1,
                total_pages: Some(2),
                has_next: true,
            }),
            Ok(MetricsPage {
                entries: vec![entry(1, 200, 21.0)],
                malformed: 2,
                page: 2,
                total_pages: Some(2),
                has_next: false,
            }),
        ]));
        let service = IngestService::new(api, 100, 1000);

        let ingested = service
            .load_readings(&registry(&[1]), window())
            .await
            .unwrap();

        assert_eq!(ingested.axis.as_slice(), &[100, 200]);
        assert_eq!(ingested.report.entries, 5);
        assert_eq!(ingested.report.accepted, 2);
        assert_eq!(ingested.report.invalid, 3);
    }
}
