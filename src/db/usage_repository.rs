use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::models::usage::{ActionKind, DailyUsage};

/// Durable daily aggregate store. All writes are idempotent upserts keyed by
/// (account, day) so concurrent writers stay correct without locking.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn increment_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
        action: ActionKind,
    ) -> Result<(), sqlx::Error>;

    async fn increment_workflow_runs(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<(), sqlx::Error>;

    async fn get_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<Option<DailyUsage>, sqlx::Error>;

    /// Rows for `day >= since`, oldest first.
    async fn list_usage_since(
        &self,
        account_id: Uuid,
        since: Date,
    ) -> Result<Vec<DailyUsage>, sqlx::Error>;
}
