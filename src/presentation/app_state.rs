// Application state for HTTP handlers
use crate::application::pipeline::PipelineHandle;
use crate::application::session::Session;
use crate::application::view_service::ViewService;
use crate::domain::view::RenderSet;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub pipeline: PipelineHandle,
    pub view: ViewService,
    pub updates: broadcast::Sender<RenderSet>,
}
