use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::db::execution_repository::ExecutionRepository;
use crate::db::usage_repository::UsageRepository;
use crate::models::execution::{WorkflowExecution, STATUS_RUNNING};
use crate::models::integration::Integration;
use crate::models::phase::ExecutionPhase;
use crate::models::usage::{ActionKind, DailyUsage};
use crate::models::workflow::Workflow;

/// In-memory [`ExecutionRepository`] used by tests and Postgres-less
/// embedders. State is plainly inspectable through the public mutexes.
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    pub workflows: Mutex<HashMap<Uuid, Workflow>>,
    pub integrations: Mutex<HashMap<Uuid, Integration>>,
    pub executions: Mutex<Vec<WorkflowExecution>>,
    pub phases: Mutex<Vec<ExecutionPhase>>,
    pub replied_comments: Mutex<Vec<String>>,
    pub dm_sent_comments: Mutex<Vec<String>>,
    pub should_fail: bool,
}

impl InMemoryExecutionRepository {
    pub fn insert_workflow(&self, workflow: Workflow) {
        self.workflows
            .lock()
            .expect("workflow map lock")
            .insert(workflow.id, workflow);
    }

    pub fn insert_integration(&self, integration: Integration) {
        self.integrations
            .lock()
            .expect("integration map lock")
            .insert(integration.id, integration);
    }

    fn fail_if_configured(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("in-memory repo failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn find_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .workflows
            .lock()
            .expect("workflow map lock")
            .get(&workflow_id)
            .cloned())
    }

    async fn find_integration(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<Integration>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .integrations
            .lock()
            .expect("integration map lock")
            .get(&integration_id)
            .cloned())
    }

    async fn create_execution(
        &self,
        workflow_id: Uuid,
        account_id: Uuid,
        trigger: Value,
        snapshot: Value,
    ) -> Result<WorkflowExecution, sqlx::Error> {
        self.fail_if_configured()?;
        let now = OffsetDateTime::now_utc();
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id,
            account_id,
            trigger,
            snapshot,
            status: STATUS_RUNNING.to_string(),
            error: None,
            started_at: now,
            finished_at: None,
            created_at: now,
        };
        self.executions
            .lock()
            .expect("execution list lock")
            .push(execution.clone());
        Ok(execution)
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        let mut executions = self.executions.lock().expect("execution list lock");
        if let Some(execution) = executions
            .iter_mut()
            .find(|e| e.id == execution_id && e.status == STATUS_RUNNING)
        {
            execution.status = status.to_string();
            execution.error = error.map(|e| e.to_string());
            execution.finished_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .executions
            .lock()
            .expect("execution list lock")
            .iter()
            .find(|e| e.id == execution_id)
            .cloned())
    }

    async fn insert_phase(
        &self,
        execution_id: Uuid,
        seq: i32,
        node_id: &str,
        node_kind: &str,
        inputs: Option<Value>,
    ) -> Result<ExecutionPhase, sqlx::Error> {
        self.fail_if_configured()?;
        let phase = ExecutionPhase {
            id: Uuid::new_v4(),
            execution_id,
            seq,
            node_id: node_id.to_string(),
            node_kind: node_kind.to_string(),
            status: STATUS_RUNNING.to_string(),
            inputs,
            outputs: None,
            error: None,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
        };
        self.phases
            .lock()
            .expect("phase list lock")
            .push(phase.clone());
        Ok(phase)
    }

    async fn complete_phase(
        &self,
        phase_id: Uuid,
        status: &str,
        outputs: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        let mut phases = self.phases.lock().expect("phase list lock");
        if let Some(phase) = phases.iter_mut().find(|p| p.id == phase_id) {
            phase.status = status.to_string();
            phase.outputs = outputs;
            phase.error = error.map(|e| e.to_string());
            phase.finished_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn list_phases(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<ExecutionPhase>, sqlx::Error> {
        self.fail_if_configured()?;
        let mut phases: Vec<ExecutionPhase> = self
            .phases
            .lock()
            .expect("phase list lock")
            .iter()
            .filter(|p| p.execution_id == execution_id)
            .cloned()
            .collect();
        phases.sort_by_key(|p| p.seq);
        Ok(phases)
    }

    async fn record_workflow_run(
        &self,
        workflow_id: Uuid,
        success: bool,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        let mut workflows = self.workflows.lock().expect("workflow map lock");
        if let Some(workflow) = workflows.get_mut(&workflow_id) {
            workflow.run_count += 1;
            if success {
                workflow.success_count += 1;
            }
            workflow.last_run_status = Some(if success { "success" } else { "failed" }.to_string());
            workflow.last_run_at = Some(OffsetDateTime::now_utc());
            workflow.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_comment_replied(&self, comment_id: &str) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        self.replied_comments
            .lock()
            .expect("replied list lock")
            .push(comment_id.to_string());
        Ok(())
    }

    async fn mark_comment_dm_sent(&self, comment_id: &str) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        self.dm_sent_comments
            .lock()
            .expect("dm-sent list lock")
            .push(comment_id.to_string());
        Ok(())
    }
}

/// In-memory [`UsageRepository`] with the same upsert semantics as the
/// Postgres implementation.
#[derive(Default)]
pub struct InMemoryUsageRepository {
    pub rows: Mutex<HashMap<(Uuid, Date), DailyUsage>>,
    pub should_fail: bool,
}

impl InMemoryUsageRepository {
    pub fn seed(&self, row: DailyUsage) {
        self.rows
            .lock()
            .expect("usage map lock")
            .insert((row.account_id, row.day), row);
    }

    fn fail_if_configured(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("in-memory repo failure".into()));
        }
        Ok(())
    }

    fn upsert<F: FnOnce(&mut DailyUsage)>(&self, account_id: Uuid, day: Date, apply: F) {
        let mut rows = self.rows.lock().expect("usage map lock");
        let row = rows.entry((account_id, day)).or_insert_with(|| DailyUsage {
            account_id,
            day,
            comment_count: 0,
            dm_count: 0,
            total_count: 0,
            workflow_runs: 0,
            updated_at: OffsetDateTime::now_utc(),
        });
        apply(row);
        row.updated_at = OffsetDateTime::now_utc();
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn increment_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
        action: ActionKind,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        self.upsert(account_id, day, |row| {
            match action {
                ActionKind::CommentReply => row.comment_count += 1,
                ActionKind::DirectMessage => row.dm_count += 1,
            }
            row.total_count += 1;
        });
        Ok(())
    }

    async fn increment_workflow_runs(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        self.upsert(account_id, day, |row| row.workflow_runs += 1);
        Ok(())
    }

    async fn get_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<Option<DailyUsage>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .rows
            .lock()
            .expect("usage map lock")
            .get(&(account_id, day))
            .cloned())
    }

    async fn list_usage_since(
        &self,
        account_id: Uuid,
        since: Date,
    ) -> Result<Vec<DailyUsage>, sqlx::Error> {
        self.fail_if_configured()?;
        let mut rows: Vec<DailyUsage> = self
            .rows
            .lock()
            .expect("usage map lock")
            .values()
            .filter(|row| row.account_id == account_id && row.day >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.day);
        Ok(rows)
    }
}
