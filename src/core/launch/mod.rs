pub mod task;

pub use task::{classify_exit, ExitOutcome, GameCommand, PlatformGameCommand};
