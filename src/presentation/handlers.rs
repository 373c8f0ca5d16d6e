// HTTP request handlers
use crate::application::pipeline::PipelineError;
use crate::domain::series::TimeWindow;
use crate::domain::view::{FramingState, RenderSet};
use crate::infrastructure::chunked_json::stream_response;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Deserialize)]
pub struct RenderQuery {
    pub index: Option<usize>,
    #[serde(default)]
    pub initial: bool,
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    pub index: usize,
}

#[derive(Serialize)]
struct AxisResponse<'a> {
    timestamps: &'a [i64],
    selection: Option<usize>,
    window: Option<TimeWindow>,
    fetched_at: Option<DateTime<Utc>>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn respond<T: Serialize>(data: &T, headers: &HeaderMap) -> Response {
    match json_response(data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

fn with_viewport(framing: &mut FramingState, mut render: RenderSet) -> RenderSet {
    render.viewport = framing.frame(&render.markers);
    render
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Sensors currently known to the session
pub async fn list_sensors(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let registry = state.session.registry().await;
    respond(&registry.sensors(), &headers).await
}

/// Timestamp axis driving the slider, with the current selection
pub async fn get_axis(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let (snapshot, selection) = state.session.current().await;
    let axis = AxisResponse {
        timestamps: snapshot.axis.as_slice(),
        selection,
        window: snapshot.window,
        fetched_at: snapshot.fetched_at,
    };
    respond(&axis, &headers).await
}

/// Render a slider position without changing the shared selection
pub async fn get_render(
    Query(query): Query<RenderQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (snapshot, selection) = state.session.current().await;
    let registry = state.session.registry().await;

    let index = query.index.or(selection);
    match state.view.render_selection(&snapshot, &registry, index) {
        Ok(mut render) => {
            if query.initial {
                render.viewport = FramingState::default().frame(&render.markers);
            }
            respond(&render, &headers).await
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Move the shared selection; the render is also pushed to stream subscribers
pub async fn post_selection(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Response {
    match state.pipeline.select(request.index).await {
        Ok(render) => respond(&render, &headers).await,
        Err(PipelineError::View(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Request an out-of-band refresh
pub async fn post_refresh(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.refresh().await {
        Ok(outcome) => {
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "refresh": outcome }))).into_response()
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Stream renders as newline-delimited JSON, starting with the current one
pub async fn stream_render(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Subscribe first so no update published in between is lost
    let mut rx = state.updates.subscribe();
    let (snapshot, selection) = state.session.current().await;
    let registry = state.session.registry().await;
    let initial = state.view.render_selection(&snapshot, &registry, selection).ok();

    let stream = async_stream::stream! {
        let mut framing = FramingState::default();

        if let Some(render) = initial {
            yield with_viewport(&mut framing, render);
        }

        loop {
            match rx.recv().await {
                Ok(render) => {
                    yield with_viewport(&mut framing, render);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Render stream lagged, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    stream_response(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ingest_service::IngestService;
    use crate::application::pipeline::Pipeline;
    use crate::application::sensor_api::{
        DeviceRecord, MetricEntry, MetricsPage, MetricsQuery, SensorApi, SourceError,
    };
    use crate::application::sensor_service::SensorService;
    use crate::application::session::Session;
    use crate::application::view_service::ViewService;
    use crate::domain::view::HeatmapScale;
    use crate::domain::clock::{CivilClock, DEFAULT_TIMEZONE};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    struct StaticApi;

    #[async_trait]
    impl SensorApi for StaticApi {
        async fn list_devices(&self, _tag: Option<&str>) -> Result<Vec<DeviceRecord>, SourceError> {
            Ok(vec![
                DeviceRecord {
                    device_id: 1,
                    latitude: Some(49.440754),
                    longitude: Some(10.942086),
                    name: Some("Lora3 Sensor".to_string()),
                },
                DeviceRecord {
                    device_id: 2,
                    latitude: Some(49.448719),
                    longitude: Some(11.08766),
                    name: Some("Andis Sensor".to_string()),
                },
            ])
        }

        async fn fetch_metrics_page(
            &self,
            _query: &MetricsQuery,
            page: u32,
        ) -> Result<MetricsPage, SourceError> {
            let entry = |device_id, timestamp, temperature| MetricEntry {
                device_id,
                temperature: Some(temperature),
                timestamp: Some(timestamp),
            };
            Ok(MetricsPage {
                entries: vec![entry(1, 100, 20.0), entry(1, 200, 21.4), entry(2, 200, 18.0)],
                malformed: 0,
                page,
                total_pages: Some(1),
                has_next: false,
            })
        }
    }

    async fn state() -> Arc<AppState> {
        let api = Arc::new(StaticApi);
        let session = Arc::new(Session::new());
        let view = ViewService::new(
            CivilClock::new(DEFAULT_TIMEZONE).unwrap(),
            HeatmapScale::Raw,
        );
        let pipeline = Pipeline::new(
            session.clone(),
            SensorService::new(api.clone(), None),
            IngestService::new(api, 100, 10),
            view,
            Duration::from_secs(3600),
            false,
        );
        pipeline
            .refresh_cycle(Utc.with_ymd_and_hms(2025, 7, 20, 10, 0, 0).unwrap())
            .await
            .unwrap();
        let updates = pipeline.updates();
        let (handle, _task) = pipeline.spawn();

        Arc::new(AppState {
            session,
            pipeline: handle,
            view,
            updates,
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_initial_render_includes_viewport() {
        let state = state().await;

        let response = get_render(
            Query(RenderQuery {
                index: None,
                initial: true,
            }),
            HeaderMap::new(),
            State(state),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["index"], 1);
        assert_eq!(body["markers"].as_array().unwrap().len(), 2);
        assert_eq!(body["viewport"]["kind"], "fit_bounds");
    }

    #[tokio::test]
    async fn test_render_without_initial_has_no_viewport() {
        let state = state().await;

        let response = get_render(
            Query(RenderQuery {
                index: Some(0),
                initial: false,
            }),
            HeaderMap::new(),
            State(state),
        )
        .await;

        let body = body_json(response).await;
        assert_eq!(body["selected_timestamp"], 100);
        assert!(body.get("viewport").is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_render_is_bad_request() {
        let state = state().await;

        let response = get_render(
            Query(RenderQuery {
                index: Some(9),
                initial: false,
            }),
            HeaderMap::new(),
            State(state),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_selection_moves_shared_selection() {
        let state = state().await;

        let response = post_selection(
            HeaderMap::new(),
            State(state.clone()),
            Json(SelectionRequest { index: 0 }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let axis = body_json(get_axis(HeaderMap::new(), State(state)).await).await;
        assert_eq!(axis["selection"], 0);
        assert_eq!(axis["timestamps"], serde_json::json!([100, 200]));
    }

    #[tokio::test]
    async fn test_list_sensors() {
        let state = state().await;

        let body = body_json(list_sensors(HeaderMap::new(), State(state)).await).await;

        assert_eq!(body[0]["name"], "Lora3 Sensor");
        assert_eq!(body[1]["id"], 2);
    }
}
