pub mod inspect;
pub mod topology;

pub use inspect::ClabRegistry;
pub use topology::{TopologyFile, TopologyGraph};
