use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::db::usage_repository::UsageRepository;
use crate::models::usage::{ActionKind, DailyUsage};

pub struct PostgresUsageRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn increment_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
        action: ActionKind,
    ) -> Result<(), sqlx::Error> {
        let (comments, dms): (i64, i64) = match action {
            ActionKind::CommentReply => (1, 0),
            ActionKind::DirectMessage => (0, 1),
        };

        sqlx::query(
            r#"
            INSERT INTO daily_usage (account_id, day, comment_count, dm_count, total_count, workflow_runs, updated_at)
            VALUES ($1, $2, $3, $4, $3 + $4, 0, now())
            ON CONFLICT (account_id, day)
            DO UPDATE SET comment_count = daily_usage.comment_count + $3,
                          dm_count = daily_usage.dm_count + $4,
                          total_count = daily_usage.total_count + $3 + $4,
                          updated_at = now()
            "#,
        )
        .bind(account_id)
        .bind(day)
        .bind(comments)
        .bind(dms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_workflow_runs(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO daily_usage (account_id, day, comment_count, dm_count, total_count, workflow_runs, updated_at)
            VALUES ($1, $2, 0, 0, 0, 1, now())
            ON CONFLICT (account_id, day)
            DO UPDATE SET workflow_runs = daily_usage.workflow_runs + 1,
                          updated_at = now()
            "#,
        )
        .bind(account_id)
        .bind(day)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_daily_usage(
        &self,
        account_id: Uuid,
        day: Date,
    ) -> Result<Option<DailyUsage>, sqlx::Error> {
        let result = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT account_id, day, comment_count, dm_count, total_count, workflow_runs, updated_at
            FROM daily_usage
            WHERE account_id = $1 AND day = $2
            "#,
        )
        .bind(account_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_usage_since(
        &self,
        account_id: Uuid,
        since: Date,
    ) -> Result<Vec<DailyUsage>, sqlx::Error> {
        let results = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT account_id, day, comment_count, dm_count, total_count, workflow_runs, updated_at
            FROM daily_usage
            WHERE account_id = $1 AND day >= $2
            ORDER BY day ASC
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }
}
