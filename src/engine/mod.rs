mod executor;
pub mod graph;
pub mod nodes;

pub use executor::{execute_trigger, EngineError, RunOutcome};
