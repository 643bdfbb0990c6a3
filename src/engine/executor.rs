use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::graph::WorkflowGraph;
use crate::engine::nodes::{NodeOutcome, RunContext};
use crate::models::execution::{STATUS_FAILED, STATUS_SUCCESS};
use crate::models::integration::Integration;
use crate::models::trigger::TriggerEvent;
use crate::models::workflow::{Workflow, WorkflowDefinition};
use crate::safety::policy::{self, EffectiveLimits};
use crate::state::EngineState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {workflow_id} has an invalid definition: {source}")]
    InvalidDefinition {
        workflow_id: Uuid,
        source: serde_json::Error,
    },
    #[error("persistence failure during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        source: sqlx::Error,
    },
}

fn persistence(operation: &'static str) -> impl FnOnce(sqlx::Error) -> EngineError {
    move |source| EngineError::Persistence { operation, source }
}

/// How a trigger was disposed of. Only `Completed` leaves an execution row
/// behind; the other variants are decided before anything is persisted.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        execution_id: Uuid,
        status: &'static str,
    },
    /// Outside the configured active-hours window; the caller may requeue.
    Deferred,
    /// A workflow-level daily budget is already spent.
    DailyLimit { reason: String },
    /// Workflow or integration is switched off.
    Inactive,
}

/// Runs one workflow against one trigger event, end to end: gate checks,
/// execution row, per-node phases, terminal status and run statistics.
///
/// Node-level failures fail the run but never this function; an `Err` here
/// means the engine itself could not make progress (bad definition or a
/// failed write on the coordination path).
pub async fn execute_trigger(
    state: &EngineState,
    workflow: &Workflow,
    integration: &Integration,
    trigger: &TriggerEvent,
) -> Result<RunOutcome, EngineError> {
    if !workflow.is_active || !integration.is_active {
        info!(workflow_id = %workflow.id, "skipping trigger for inactive workflow");
        return Ok(RunOutcome::Inactive);
    }

    let definition = workflow
        .definition()
        .map_err(|source| EngineError::InvalidDefinition {
            workflow_id: workflow.id,
            source,
        })?;
    let limits = policy::resolve(&definition.safety);

    if let Some(limits) = limits {
        let local_hour = state.config.local_hour(OffsetDateTime::now_utc());
        if !policy::is_within_active_hours(&definition.safety, local_hour) {
            info!(workflow_id = %workflow.id, local_hour, "outside active hours, deferring");
            return Ok(RunOutcome::Deferred);
        }

        if let Some(reason) = daily_budget_spent(state, workflow, trigger, &definition, limits) {
            info!(workflow_id = %workflow.id, %reason, "daily budget spent, skipping trigger");
            return Ok(RunOutcome::DailyLimit { reason });
        }
    }

    let execution = state
        .executions
        .create_execution(
            workflow.id,
            workflow.account_id,
            trigger.payload(),
            workflow.data.clone(),
        )
        .await
        .map_err(persistence("create_execution"))?;
    info!(execution_id = %execution.id, workflow_id = %workflow.id, "run started");

    let graph = match WorkflowGraph::from_definition(&definition) {
        Ok(graph) => graph,
        Err(err) => {
            return fail_run(state, workflow, execution.id, &err.to_string()).await;
        }
    };
    let order = match graph.execution_order() {
        Ok(order) => order.into_iter().cloned().collect::<Vec<_>>(),
        Err(err) => {
            return fail_run(state, workflow, execution.id, &err.to_string()).await;
        }
    };

    // Resolve every handler up front: an unknown node type is a structural
    // error and must fail the run before any node gets to act.
    let mut plan = Vec::with_capacity(order.len());
    for node in &order {
        match state.nodes.get(&node.kind) {
            Some(handler) => plan.push(handler),
            None => {
                let message = format!("unknown node type '{}'", node.kind);
                return fail_run(state, workflow, execution.id, &message).await;
            }
        }
    }

    let ctx = RunContext {
        state,
        trigger,
        integration,
        account_id: workflow.account_id,
        settings: &definition.safety,
        limits,
    };

    for (seq, (node, handler)) in order.iter().zip(plan).enumerate() {
        let phase = state
            .executions
            .insert_phase(
                execution.id,
                seq as i32,
                &node.id,
                &node.kind,
                Some(node.config.clone()),
            )
            .await
            .map_err(persistence("insert_phase"))?;

        match handler.execute(node, &ctx).await {
            Ok(NodeOutcome::Continue(outputs)) => {
                state
                    .executions
                    .complete_phase(phase.id, STATUS_SUCCESS, Some(outputs), None)
                    .await
                    .map_err(persistence("complete_phase"))?;
            }
            Ok(NodeOutcome::Halt { outputs, reason }) => {
                state
                    .executions
                    .complete_phase(phase.id, STATUS_SUCCESS, Some(outputs), None)
                    .await
                    .map_err(persistence("complete_phase"))?;
                info!(execution_id = %execution.id, node_id = %node.id, %reason, "run halted early");
                break;
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(persist_err) = state
                    .executions
                    .complete_phase(phase.id, STATUS_FAILED, None, Some(&message))
                    .await
                {
                    warn!(%persist_err, phase_id = %phase.id, "failed to record phase failure");
                }
                return fail_run(state, workflow, execution.id, &message).await;
            }
        }
    }

    state
        .executions
        .complete_execution(execution.id, STATUS_SUCCESS, None)
        .await
        .map_err(persistence("complete_execution"))?;
    state
        .executions
        .record_workflow_run(workflow.id, true)
        .await
        .map_err(persistence("record_workflow_run"))?;
    if let Err(err) = state.tracker.track_run(workflow.account_id).await {
        warn!(%err, account_id = %workflow.account_id, "run usage write failed");
    }
    info!(execution_id = %execution.id, "run succeeded");

    Ok(RunOutcome::Completed {
        execution_id: execution.id,
        status: STATUS_SUCCESS,
    })
}

/// Marks the run failed and bumps run statistics. The status guard in the
/// repository keeps the terminal write idempotent.
async fn fail_run(
    state: &EngineState,
    workflow: &Workflow,
    execution_id: Uuid,
    error: &str,
) -> Result<RunOutcome, EngineError> {
    warn!(%execution_id, workflow_id = %workflow.id, error, "run failed");
    state
        .executions
        .complete_execution(execution_id, STATUS_FAILED, Some(error))
        .await
        .map_err(persistence("complete_execution"))?;
    state
        .executions
        .record_workflow_run(workflow.id, false)
        .await
        .map_err(persistence("record_workflow_run"))?;
    if let Err(err) = state.tracker.track_run(workflow.account_id).await {
        warn!(%err, account_id = %workflow.account_id, "run usage write failed");
    }
    Ok(RunOutcome::Completed {
        execution_id,
        status: STATUS_FAILED,
    })
}

/// Pre-run daily budget check over the action classes this workflow would
/// actually perform for this trigger. Saves an execution row when the day's
/// budget is already gone; the per-send gates still apply during the run.
fn daily_budget_spent(
    state: &EngineState,
    workflow: &Workflow,
    trigger: &TriggerEvent,
    definition: &WorkflowDefinition,
    limits: EffectiveLimits,
) -> Option<String> {
    let stats = state.tracker.get_daily_stats(workflow.account_id);

    if wants_comment_action(definition, trigger) && stats.comments >= limits.comments_per_day {
        return Some(format!(
            "Daily comment limit reached ({}/day)",
            limits.comments_per_day
        ));
    }
    if wants_dm_action(definition) && stats.dms >= limits.dms_per_day {
        return Some(format!(
            "Daily DM limit reached ({}/day)",
            limits.dms_per_day
        ));
    }
    None
}

fn send_configs(definition: &WorkflowDefinition) -> Vec<&Value> {
    definition
        .nodes
        .iter()
        .filter(|n| n.kind == "send")
        .map(|n| &n.config)
        .collect()
}

fn wants_comment_action(
    definition: &WorkflowDefinition,
    trigger: &TriggerEvent,
) -> bool {
    if !trigger.is_comment() || trigger.data.comment_id.is_none() {
        return false;
    }
    send_configs(definition).iter().any(|config| {
        config
            .get("publicReplies")
            .and_then(|v| v.as_array())
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    })
}

fn wants_dm_action(definition: &WorkflowDefinition) -> bool {
    send_configs(definition).iter().any(|config| {
        config
            .get("dmMessage")
            .and_then(|v| v.as_str())
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::json;

    use crate::config::Config;
    use crate::db::memory::{InMemoryExecutionRepository, InMemoryUsageRepository};
    use crate::models::trigger::TriggerData;
    use crate::models::usage::ActionKind;
    use crate::safety::rate_limiter::InMemorySlidingWindow;
    use crate::services::messenger::MockMessenger;

    struct Harness {
        state: EngineState,
        repo: Arc<InMemoryExecutionRepository>,
        messenger: Arc<MockMessenger>,
    }

    fn harness() -> Harness {
        harness_with(MockMessenger::default())
    }

    fn harness_with(messenger: MockMessenger) -> Harness {
        let repo = Arc::new(InMemoryExecutionRepository::default());
        let messenger = Arc::new(messenger);
        let config = Config {
            database_url: String::new(),
            api_base_url: String::new(),
            utc_offset_hours: 0,
        };
        let state = EngineState::new(
            repo.clone(),
            Arc::new(InMemoryUsageRepository::default()),
            Arc::new(InMemorySlidingWindow::new()),
            messenger.clone(),
            config,
        );
        Harness {
            state,
            repo,
            messenger,
        }
    }

    fn workflow(data: Value) -> Workflow {
        let now = OffsetDateTime::now_utc();
        Workflow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            integration_id: Uuid::new_v4(),
            name: "price autoresponder".into(),
            data,
            is_active: true,
            run_count: 0,
            success_count: 0,
            last_run_status: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn integration_for(workflow: &Workflow) -> Integration {
        let now = OffsetDateTime::now_utc();
        Integration {
            id: workflow.integration_id,
            account_id: workflow.account_id,
            access_token: Some("tok-1".into()),
            external_user_id: Some("acct-ext".into()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn comment_trigger(text: &str) -> TriggerEvent {
        TriggerEvent {
            kind: "comment".into(),
            data: TriggerData {
                id: "evt-1".into(),
                text: text.into(),
                user_id: "u1".into(),
                comment_id: Some("c-1".into()),
            },
        }
    }

    fn price_funnel(safety: Value) -> Value {
        json!({
            "nodes": [
                { "id": "filter-1", "type": "filter", "config": { "includeKeywords": ["price"] } },
                { "id": "send-1", "type": "send", "config": {
                    "publicReplies": ["Check DM!"],
                    "dmMessage": "Here's our catalog"
                } }
            ],
            "edges": [ { "source": "filter-1", "target": "send-1" } ],
            "safety": safety
        })
    }

    /// Safety block that gates but never sleeps, so tests stay fast.
    fn gated_safety() -> Value {
        json!({ "enabled": true, "delays": { "enabled": false } })
    }

    async fn run(
        h: &Harness,
        workflow: &Workflow,
        trigger: &TriggerEvent,
    ) -> RunOutcome {
        h.repo.insert_workflow(workflow.clone());
        let integration = integration_for(workflow);
        execute_trigger(&h.state, workflow, &integration, trigger)
            .await
            .expect("engine made progress")
    }

    #[tokio::test]
    async fn matched_comment_gets_reply_and_dm() {
        let h = harness();
        let wf = workflow(price_funnel(json!({})));

        let outcome = run(&h, &wf, &comment_trigger("what's the price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));

        let replies = h.messenger.replies.lock().unwrap();
        assert_eq!(replies.as_slice(), &[("c-1".to_string(), "Check DM!".to_string())]);
        let dms = h.messenger.dms.lock().unwrap();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].0, "u1");
        assert_eq!(dms[0].1.text, "Here's our catalog");

        let executions = h.repo.executions.lock().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, STATUS_SUCCESS);
        let phases = h.repo.phases.lock().unwrap();
        assert_eq!(phases.len(), 2);
        assert!(phases.iter().all(|p| p.status == STATUS_SUCCESS));

        assert_eq!(h.repo.replied_comments.lock().unwrap().as_slice(), &["c-1".to_string()]);
        assert_eq!(h.repo.dm_sent_comments.lock().unwrap().as_slice(), &["c-1".to_string()]);
    }

    #[tokio::test]
    async fn successful_run_bumps_workflow_stats() {
        let h = harness();
        let wf = workflow(price_funnel(json!({})));

        run(&h, &wf, &comment_trigger("price please")).await;

        let workflows = h.repo.workflows.lock().unwrap();
        let stored = workflows.get(&wf.id).unwrap();
        assert_eq!(stored.run_count, 1);
        assert_eq!(stored.success_count, 1);
        assert_eq!(stored.last_run_status.as_deref(), Some("success"));
        assert!(stored.last_run_at.is_some());
    }

    #[tokio::test]
    async fn disabled_safety_skips_every_gate_even_at_ceiling() {
        let h = harness();
        let wf = workflow(price_funnel(json!({ "enabled": false })));

        // Push the account past every recommended and platform ceiling.
        for _ in 0..250 {
            h.state
                .tracker
                .track_action(wf.account_id, ActionKind::CommentReply)
                .await
                .unwrap();
        }

        let started = Instant::now();
        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));
        // No pacing delay and no quota denial on the ungated path.
        assert!(started.elapsed().as_secs() < 2);
        assert_eq!(h.messenger.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hourly_pacing_limit_fails_the_run() {
        let h = harness();
        let wf = workflow(price_funnel(json!({
            "enabled": true,
            "customLimits": { "commentsPerHour": 0 },
            "delays": { "enabled": false }
        })));

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_FAILED, .. }
        ));

        assert!(h.messenger.replies.lock().unwrap().is_empty());
        let executions = h.repo.executions.lock().unwrap();
        let error = executions[0].error.as_deref().unwrap();
        assert!(error.contains("comment limit"), "got: {error}");
    }

    #[tokio::test]
    async fn banned_phrase_in_dm_fails_the_run() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [
                { "id": "send-1", "type": "send", "config": { "dmMessage": "dm me for free stuff" } }
            ],
            "edges": [],
            "safety": gated_safety()
        }));

        let outcome = run(&h, &wf, &comment_trigger("hello")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_FAILED, .. }
        ));

        assert!(h.messenger.dms.lock().unwrap().is_empty());
        let executions = h.repo.executions.lock().unwrap();
        let error = executions[0].error.as_deref().unwrap();
        assert!(error.contains("banned phrase"), "got: {error}");
    }

    #[tokio::test]
    async fn outside_active_hours_defers_without_a_run() {
        let h = harness();
        let hour = h.state.config.local_hour(OffsetDateTime::now_utc());
        let wf = workflow(price_funnel(json!({
            "enabled": true,
            "activeHours": {
                "enabled": true,
                "startHour": (hour + 2) % 24,
                "endHour": (hour + 3) % 24
            }
        })));

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert_eq!(outcome, RunOutcome::Deferred);
        assert!(h.repo.executions.lock().unwrap().is_empty());
        assert!(h.messenger.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spent_daily_budget_skips_before_creating_a_run() {
        let h = harness();
        let wf = workflow(price_funnel(json!({
            "enabled": true,
            "customLimits": { "commentsPerDay": 1 },
            "delays": { "enabled": false }
        })));

        h.state
            .tracker
            .track_action(wf.account_id, ActionKind::CommentReply)
            .await
            .unwrap();

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        match outcome {
            RunOutcome::DailyLimit { reason } => {
                assert!(reason.contains("Daily comment limit"), "got: {reason}")
            }
            other => panic!("expected DailyLimit, got {other:?}"),
        }
        assert!(h.repo.executions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_filter_halts_the_run_successfully() {
        let h = harness();
        let wf = workflow(price_funnel(json!({})));

        let outcome = run(&h, &wf, &comment_trigger("love this post!")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));

        // The send node never ran.
        assert_eq!(h.repo.phases.lock().unwrap().len(), 1);
        assert!(h.messenger.replies.lock().unwrap().is_empty());
        assert!(h.messenger.dms.lock().unwrap().is_empty());

        let workflows = h.repo.workflows.lock().unwrap();
        assert_eq!(workflows.get(&wf.id).unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn cyclic_definition_fails_before_any_node_runs() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [
                { "id": "a", "type": "filter", "config": {} },
                { "id": "b", "type": "filter", "config": {} }
            ],
            "edges": [
                { "source": "a", "target": "b" },
                { "source": "b", "target": "a" }
            ],
            "safety": {}
        }));

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_FAILED, .. }
        ));

        assert!(h.repo.phases.lock().unwrap().is_empty());
        assert!(h.messenger.replies.lock().unwrap().is_empty());
        let executions = h.repo.executions.lock().unwrap();
        let error = executions[0].error.as_deref().unwrap();
        assert!(error.contains("cycle"), "got: {error}");
    }

    #[tokio::test]
    async fn unknown_node_kind_fails_the_run() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [ { "id": "wait-1", "type": "wait", "config": {} } ],
            "edges": [],
            "safety": {}
        }));

        let outcome = run(&h, &wf, &comment_trigger("hello")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_FAILED, .. }
        ));

        // Structural failure happens before the first phase row is written.
        assert!(h.repo.phases.lock().unwrap().is_empty());
        let executions = h.repo.executions.lock().unwrap();
        let error = executions[0].error.as_deref().unwrap();
        assert!(error.contains("unknown node type"), "got: {error}");

        let workflows = h.repo.workflows.lock().unwrap();
        let stored = workflows.get(&wf.id).unwrap();
        assert_eq!(stored.run_count, 1);
        assert_eq!(stored.success_count, 0);
        assert_eq!(stored.last_run_status.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn unknown_downstream_node_fails_before_any_send() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [
                { "id": "send-1", "type": "send", "config": {
                    "publicReplies": ["Check DM!"],
                    "dmMessage": "Here's our catalog"
                } },
                { "id": "wait-1", "type": "wait", "config": {} }
            ],
            "edges": [ { "source": "send-1", "target": "wait-1" } ],
            "safety": {}
        }));

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_FAILED, .. }
        ));

        // The upstream send node must not have acted.
        assert!(h.messenger.replies.lock().unwrap().is_empty());
        assert!(h.messenger.dms.lock().unwrap().is_empty());
        assert!(h.repo.phases.lock().unwrap().is_empty());
        let executions = h.repo.executions.lock().unwrap();
        let error = executions[0].error.as_deref().unwrap();
        assert!(error.contains("unknown node type"), "got: {error}");
    }

    #[tokio::test]
    async fn skip_content_check_override_delivers_flagged_message() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [
                { "id": "send-1", "type": "send", "config": {
                    "dmMessage": "dm me for free stuff",
                    "skipContentCheck": true
                } }
            ],
            "edges": [],
            "safety": gated_safety()
        }));

        let outcome = run(&h, &wf, &comment_trigger("hello")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));
        let dms = h.messenger.dms.lock().unwrap();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].1.text, "dm me for free stuff");
    }

    #[tokio::test]
    async fn skip_delay_override_suppresses_pacing() {
        let h = harness();
        let wf = workflow(json!({
            "nodes": [
                { "id": "send-1", "type": "send", "config": {
                    "dmMessage": "Check your inbox",
                    "skipDelay": true
                } }
            ],
            "edges": [],
            "safety": {
                "enabled": true,
                "delays": { "enabled": true, "minDelayMs": 8000, "maxDelayMs": 9000 }
            }
        }));

        let started = Instant::now();
        let outcome = run(&h, &wf, &comment_trigger("hello")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));
        assert!(started.elapsed().as_secs() < 2);
        assert_eq!(h.messenger.dms.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provider_reply_failure_does_not_fail_the_run() {
        let h = harness_with(MockMessenger {
            fail_replies: true,
            ..Default::default()
        });
        let wf = workflow(price_funnel(json!({})));

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert!(matches!(
            outcome,
            RunOutcome::Completed { status: STATUS_SUCCESS, .. }
        ));

        // The reply was dropped but the DM still went out.
        assert!(h.messenger.replies.lock().unwrap().is_empty());
        assert_eq!(h.messenger.dms.lock().unwrap().len(), 1);

        let phases = h.repo.phases.lock().unwrap();
        let outputs = phases[1].outputs.as_ref().unwrap();
        assert_eq!(outputs["replied"], json!(false));
        assert_eq!(outputs["dmSent"], json!(true));
        assert!(h.repo.replied_comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_workflow_is_skipped() {
        let h = harness();
        let mut wf = workflow(price_funnel(json!({})));
        wf.is_active = false;

        let outcome = run(&h, &wf, &comment_trigger("price?")).await;
        assert_eq!(outcome, RunOutcome::Inactive);
        assert!(h.repo.executions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_definition_is_an_engine_error() {
        let h = harness();
        let wf = workflow(json!({ "nodes": "not-an-array" }));
        h.repo.insert_workflow(wf.clone());
        let integration = integration_for(&wf);

        let err = execute_trigger(&h.state, &wf, &integration, &comment_trigger("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition { .. }));
        assert!(h.repo.executions.lock().unwrap().is_empty());
    }
}
