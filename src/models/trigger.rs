use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized inbound platform event (comment or direct message) that
/// starts a workflow run. Produced by the webhook/ingestion layer, which is
/// outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: TriggerData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    /// Provider-side id of the comment that fired this trigger, when the
    /// event is comment-class.
    #[serde(default)]
    pub comment_id: Option<String>,
}

impl TriggerEvent {
    pub fn is_comment(&self) -> bool {
        self.kind == "comment"
    }

    /// Serialized form persisted on the execution row.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
