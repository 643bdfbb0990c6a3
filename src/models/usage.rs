use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Externally-visible action classes the quota machinery accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CommentReply,
    DirectMessage,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CommentReply => "comment_reply",
            ActionKind::DirectMessage => "direct_message",
        }
    }

    /// Short noun used in human-readable limit messages.
    pub fn noun(&self) -> &'static str {
        match self {
            ActionKind::CommentReply => "comment",
            ActionKind::DirectMessage => "DM",
        }
    }
}

/// Durable per-day aggregate, one row per (account, calendar day). Updated
/// via idempotent upsert-with-increment; authoritative for history and
/// health scoring, never for "is this allowed right now".
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct DailyUsage {
    pub account_id: Uuid,
    pub day: Date,
    pub comment_count: i64,
    pub dm_count: i64,
    pub total_count: i64,
    pub workflow_runs: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Today's counts as seen by the ephemeral store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub comments: u32,
    pub dms: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyStats {
    pub days: Vec<DailyUsage>,
    pub comments: i64,
    pub dms: i64,
    pub total: i64,
    pub workflow_runs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// 0-100 summary of how close an account sits to its daily ceilings.
#[derive(Debug, Clone, Serialize)]
pub struct AccountHealth {
    pub score: u8,
    pub status: HealthStatus,
    pub recommendations: Vec<String>,
}

/// Outcome of a platform-ceiling check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Permit {
    pub fn allowed() -> Self {
        Permit {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied<R: Into<String>>(reason: R) -> Self {
        Permit {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}
