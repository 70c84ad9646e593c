pub mod accounting;
pub mod config;
pub mod engine;
pub mod input;
pub mod mutator;
pub mod stage;
pub mod state;

pub use config::{ConfigError, DriverConfig, MutatorOptions};
pub use engine::BitFlipEngine;
pub use input::SeedInput;
pub use mutator::{InputInfo, MutateFlags, MutateOutcome, MutatorError, ResumableMutator};
pub use stage::Stage;
pub use state::{MutationState, SnapshotError, StateSnapshot};
