pub mod paths;
pub mod store;

pub use paths::{validate_path_type, ConfigDefaults, ConfigField, PathKind};
pub use store::{ConfigStore, ManagerConfig};
