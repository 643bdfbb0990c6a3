use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::safety::policy::SafetySettings;

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Workflow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub integration_id: Uuid,
    pub name: String,
    /// Serialized [`WorkflowDefinition`] as saved by the builder UI.
    pub data: Value,
    pub is_active: bool,
    pub run_count: i64,
    pub success_count: i64,
    pub last_run_status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Workflow {
    pub fn definition(&self) -> Result<WorkflowDefinition, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// The immutable graph a single run executes against. Snapshotted onto the
/// execution row at trigger time so later edits never affect a run in flight.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<EdgeDef>,
    pub safety: SafetySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub source: String,
    pub target: String,
}
