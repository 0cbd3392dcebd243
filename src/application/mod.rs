pub mod acquisition;
pub mod history;
pub mod sink;
pub mod subscription;
pub mod timemachine;

#[cfg(test)]
pub mod testing;

pub use acquisition::{AcquisitionEngine, CollectionMode};
pub use sink::{OutboundEvent, SinkDispatcher};
pub use timemachine::{TickSettings, TimeMachine};
