use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// The recorded execution of exactly one node within one run. Append-only
/// audit trail; the engine never deletes phases.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct ExecutionPhase {
    pub id: Uuid,
    pub execution_id: Uuid,
    /// Position in the scheduler's computed order.
    pub seq: i32,
    pub node_id: String,
    pub node_kind: String,
    pub status: String,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}
