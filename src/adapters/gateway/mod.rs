pub mod client;

pub use client::{GatewayConfig, GatewaySource};
