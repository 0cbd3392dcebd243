pub mod clab;
pub mod gateway;
pub mod mqtt;

pub use clab::{ClabRegistry, TopologyFile};
pub use gateway::{GatewayConfig, GatewaySource};
pub use mqtt::MqttBus;
