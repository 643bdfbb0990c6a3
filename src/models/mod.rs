pub mod execution;
pub mod integration;
pub mod phase;
pub mod trigger;
pub mod usage;
pub mod workflow;
