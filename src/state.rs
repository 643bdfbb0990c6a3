use std::sync::Arc;

use crate::config::Config;
use crate::db::execution_repository::ExecutionRepository;
use crate::db::usage_repository::UsageRepository;
use crate::engine::nodes::NodeRegistry;
use crate::safety::rate_limiter::RateLimiter;
use crate::safety::tracker::ActionTracker;
use crate::services::messenger::Messenger;

/// Everything a run needs, behind trait objects so tests swap in the
/// in-memory implementations.
#[derive(Clone)]
pub struct EngineState {
    pub executions: Arc<dyn ExecutionRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub limiter: Arc<dyn RateLimiter>,
    pub tracker: Arc<ActionTracker>,
    pub messenger: Arc<dyn Messenger>,
    pub nodes: Arc<NodeRegistry>,
    pub config: Arc<Config>,
}

impl EngineState {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        usage: Arc<dyn UsageRepository>,
        limiter: Arc<dyn RateLimiter>,
        messenger: Arc<dyn Messenger>,
        config: Config,
    ) -> Self {
        let tracker = Arc::new(ActionTracker::new(usage.clone()));
        EngineState {
            executions,
            usage,
            limiter,
            tracker,
            messenger,
            nodes: Arc::new(NodeRegistry::builtin()),
            config: Arc::new(config),
        }
    }

    /// Same state with a custom node registry, for embedders that add their
    /// own node kinds.
    pub fn with_registry(mut self, nodes: NodeRegistry) -> Self {
        self.nodes = Arc::new(nodes);
        self
    }
}
