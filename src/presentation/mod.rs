// Presentation layer - HTTP feed consumed by the map widget
pub mod app_state;
pub mod handlers;
