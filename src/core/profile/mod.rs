pub mod model;
pub mod store;

pub use model::{ModEntry, Profile, ProfileDescriptor};
pub use store::{ProfileLocks, ProfileStore};
