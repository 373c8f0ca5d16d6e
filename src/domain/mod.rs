// Domain layer - Sensors, readings and the derived map view
pub mod clock;
pub mod sensor;
pub mod series;
pub mod view;
