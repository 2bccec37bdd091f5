//! Host side of the Flume water monitor integration.
//!
//! Polls the sensors of one Flume account and tracks their connectivity.
//!
//! # Architecture
//!
//! ```text
//!       Flume cloud API
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │       flumewater::FlumeApi               │
//! │  - Authorize (single-flight refresh)     │
//! │  - Classify and decode responses         │
//! └─────────────────────────────────────────┘
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │       Sensor Manager                     │
//! │  - Account handler (bridge status)       │
//! │  - Sensor handlers (periodic jobs)       │
//! │  - Discovery (48h rescan)                │
//! └─────────────────────────────────────────┘
//!          ↓
//!    Status board → HTTP status API
//! ```
//!
//! # Core Types
//!
//! - [`SensorManager`] - Builds and owns every handler
//! - [`AccountHandler`] - Account status, authorization errors
//! - [`SensorHandler`] - Water use and battery polling for one sensor
//! - [`DeviceSource`] - Trait the handlers read device data through
//! - [`StatusReporter`] - Trait receiving connectivity changes

mod source;
pub mod account;
pub mod api;
pub mod discovery;
pub mod manager;
pub mod sensor;
pub mod status;

#[cfg(test)]
mod test_support;

// Re-export public types
pub use account::AccountHandler;
pub use discovery::{DiscoveredSensor, DiscoveryService};
pub use manager::SensorManager;
pub use sensor::{SensorHandler, SensorReadings};
pub use source::DeviceSource;
pub use status::{StatusBoard, StatusDetail, StatusReporter, ThingStatus};
