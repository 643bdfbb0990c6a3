pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod safety;
pub mod services;
pub mod state;
pub mod telemetry;

pub use engine::{execute_trigger, EngineError, RunOutcome};
pub use state::EngineState;
