use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::execution_repository::ExecutionRepository;
use crate::models::execution::{WorkflowExecution, STATUS_RUNNING};
use crate::models::integration::Integration;
use crate::models::phase::ExecutionPhase;
use crate::models::workflow::Workflow;

pub struct PostgresExecutionRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ExecutionRepository for PostgresExecutionRepository {
    async fn find_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, sqlx::Error> {
        let result = sqlx::query_as::<_, Workflow>(
            r#"
            SELECT id,
                   account_id,
                   integration_id,
                   name,
                   data,
                   is_active,
                   run_count,
                   success_count,
                   last_run_status,
                   last_run_at,
                   created_at,
                   updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_integration(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<Integration>, sqlx::Error> {
        let result = sqlx::query_as::<_, Integration>(
            r#"
            SELECT id,
                   account_id,
                   access_token,
                   external_user_id,
                   is_active,
                   created_at,
                   updated_at
            FROM integrations
            WHERE id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn create_execution(
        &self,
        workflow_id: Uuid,
        account_id: Uuid,
        trigger: Value,
        snapshot: Value,
    ) -> Result<WorkflowExecution, sqlx::Error> {
        let result = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            INSERT INTO workflow_executions (workflow_id, account_id, trigger, snapshot, status, started_at, created_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            RETURNING id, workflow_id, account_id, trigger, snapshot, status, error, started_at, finished_at, created_at
            "#,
        )
        .bind(workflow_id)
        .bind(account_id)
        .bind(trigger)
        .bind(snapshot)
        .bind(STATUS_RUNNING)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        // The status guard makes the terminal transition happen at most once.
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                error = $3,
                finished_at = now()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(execution_id)
        .bind(status)
        .bind(error)
        .bind(STATUS_RUNNING)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, sqlx::Error> {
        let result = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT id, workflow_id, account_id, trigger, snapshot, status, error, started_at, finished_at, created_at
            FROM workflow_executions
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn insert_phase(
        &self,
        execution_id: Uuid,
        seq: i32,
        node_id: &str,
        node_kind: &str,
        inputs: Option<Value>,
    ) -> Result<ExecutionPhase, sqlx::Error> {
        let result = sqlx::query_as::<_, ExecutionPhase>(
            r#"
            INSERT INTO execution_phases (execution_id, seq, node_id, node_kind, status, inputs, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            RETURNING id, execution_id, seq, node_id, node_kind, status, inputs, outputs, error, started_at, finished_at
            "#,
        )
        .bind(execution_id)
        .bind(seq)
        .bind(node_id)
        .bind(node_kind)
        .bind(STATUS_RUNNING)
        .bind(inputs)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn complete_phase(
        &self,
        phase_id: Uuid,
        status: &str,
        outputs: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE execution_phases
            SET status = $2,
                outputs = $3,
                error = $4,
                finished_at = now()
            WHERE id = $1
            "#,
        )
        .bind(phase_id)
        .bind(status)
        .bind(outputs)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_phases(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<ExecutionPhase>, sqlx::Error> {
        let results = sqlx::query_as::<_, ExecutionPhase>(
            r#"
            SELECT id, execution_id, seq, node_id, node_kind, status, inputs, outputs, error, started_at, finished_at
            FROM execution_phases
            WHERE execution_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn record_workflow_run(
        &self,
        workflow_id: Uuid,
        success: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE workflows
            SET run_count = run_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                last_run_status = CASE WHEN $2 THEN 'success' ELSE 'failed' END,
                last_run_at = now(),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(success)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_comment_replied(&self, comment_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE comments
            SET replied = TRUE,
                updated_at = now()
            WHERE external_id = $1
            "#,
        )
        .bind(comment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_comment_dm_sent(&self, comment_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE comments
            SET dm_sent = TRUE,
                updated_at = now()
            WHERE external_id = $1
            "#,
        )
        .bind(comment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
