pub mod cancel;
pub mod devices;
pub mod event;
pub mod reactor;
pub mod scheduler;
pub mod state;
pub mod telemetry;
