pub mod device;
pub mod path;
pub mod snapshot;
pub mod stats;
pub mod value;

pub use device::Device;
pub use path::UpdatePath;
pub use snapshot::{apply_update, epoch_now, CycleData, CycleSnapshot, DeviceInterfaces};
pub use stats::{score, StatsRecord};
