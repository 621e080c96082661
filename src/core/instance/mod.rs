pub mod manager;
pub mod staging;

pub use manager::{InstanceKey, InstanceManager, RunningInstanceInfo};
