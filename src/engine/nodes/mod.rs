mod filter;
mod send;

pub use filter::FilterNode;
pub use send::SendNode;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::integration::Integration;
use crate::models::trigger::TriggerEvent;
use crate::models::usage::ActionKind;
use crate::models::workflow::NodeDef;
use crate::safety::policy::{EffectiveLimits, SafetySettings};
use crate::state::EngineState;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{} limit reached, action blocked", action.noun())]
    RateLimited { action: ActionKind },
    #[error("content rejected: {reason}")]
    ContentRejected { reason: String },
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),
    #[error("integration has no usable credentials")]
    Credential,
}

/// What a node tells the coordinator after running.
#[derive(Debug)]
pub enum NodeOutcome {
    /// Node finished; downstream nodes keep running.
    Continue(Value),
    /// Node finished and the run stops here, successfully. Used by gates
    /// whose condition did not match.
    Halt { outputs: Value, reason: String },
}

/// Per-run scratch state threaded through every node of one execution.
pub struct RunContext<'a> {
    pub state: &'a EngineState,
    pub trigger: &'a TriggerEvent,
    pub integration: &'a Integration,
    pub account_id: Uuid,
    pub settings: &'a SafetySettings,
    /// `None` means safety enforcement is off for this run.
    pub limits: Option<EffectiveLimits>,
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn execute(
        &self,
        node: &NodeDef,
        ctx: &RunContext<'_>,
    ) -> Result<NodeOutcome, NodeError>;
}

/// Dispatch table from node kind to handler. New node types plug in here
/// without touching the coordinator.
pub struct NodeRegistry {
    handlers: HashMap<&'static str, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FilterNode));
        registry.register(Arc::new(SendNode));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(kind).cloned()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
