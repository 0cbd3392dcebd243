pub mod bus;
pub mod registry;
pub mod telemetry;

pub use bus::{BusError, BusPublisher};
pub use registry::{DeviceRegistry, RegistryError};
pub use telemetry::{Notification, PathUpdate, SessionError, TelemetrySource, UpdateStream};
