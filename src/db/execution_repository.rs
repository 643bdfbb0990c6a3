use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::execution::WorkflowExecution;
use crate::models::integration::Integration;
use crate::models::phase::ExecutionPhase;
use crate::models::workflow::Workflow;

/// Persistence surface the execution coordinator writes through. Execution
/// rows and phases are its exclusive property; everything else in the
/// product reads them.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn find_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, sqlx::Error>;

    async fn find_integration(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<Integration>, sqlx::Error>;

    async fn create_execution(
        &self,
        workflow_id: Uuid,
        account_id: Uuid,
        trigger: Value,
        snapshot: Value,
    ) -> Result<WorkflowExecution, sqlx::Error>;

    /// Writes the terminal status. Guarded so a `running` row transitions at
    /// most once; repeated calls are no-ops.
    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error>;

    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, sqlx::Error>;

    async fn insert_phase(
        &self,
        execution_id: Uuid,
        seq: i32,
        node_id: &str,
        node_kind: &str,
        inputs: Option<Value>,
    ) -> Result<ExecutionPhase, sqlx::Error>;

    async fn complete_phase(
        &self,
        phase_id: Uuid,
        status: &str,
        outputs: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error>;

    async fn list_phases(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<ExecutionPhase>, sqlx::Error>;

    /// Monotonic per-run statistics bump on the owning workflow: exactly one
    /// increment per terminal run.
    async fn record_workflow_run(
        &self,
        workflow_id: Uuid,
        success: bool,
    ) -> Result<(), sqlx::Error>;

    async fn mark_comment_replied(&self, comment_id: &str) -> Result<(), sqlx::Error>;

    async fn mark_comment_dm_sent(&self, comment_id: &str) -> Result<(), sqlx::Error>;
}
