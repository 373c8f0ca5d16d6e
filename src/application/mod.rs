// Application layer - Use cases wiring the sensor API into the map view
pub mod ingest_service;
pub mod pipeline;
pub mod sensor_api;
pub mod sensor_service;
pub mod session;
pub mod view_service;
