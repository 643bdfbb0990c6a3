use std::sync::Arc;

use dashmap::DashMap;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::db::usage_repository::UsageRepository;
use crate::models::usage::{
    AccountHealth, ActionKind, DailyStats, HealthStatus, Permit, WeeklyStats,
};

/// Platform-wide daily ceilings, distinct from (and looser than) whatever a
/// workflow configures for itself.
pub const DAILY_COMMENT_CEILING: u32 = 200;
pub const DAILY_DM_CEILING: u32 = 100;
pub const HOURLY_COMMENT_CEILING: u32 = 25;
pub const HOURLY_DM_CEILING: u32 = 20;

/// Ephemeral counters expire after this long; the durable aggregate is the
/// sole source of truth beyond it.
const EPHEMERAL_TTL: Duration = Duration::hours(48);

const HEALTH_WARNING_PCT: u32 = 60;
const HEALTH_CRITICAL_PCT: u32 = 80;

#[derive(Debug, Clone, Copy)]
struct DayCounter {
    comments: u32,
    dms: u32,
    total: u32,
    touched_at: OffsetDateTime,
}

impl DayCounter {
    fn new(now: OffsetDateTime) -> Self {
        DayCounter {
            comments: 0,
            dms: 0,
            total: 0,
            touched_at: now,
        }
    }
}

/// Usage accounting across two tiers: fast in-process window counters for
/// "is this allowed right now", and a durable per-day aggregate for history
/// and health scoring. The two writes are best-effort eventually consistent;
/// there is no transaction spanning both.
pub struct ActionTracker {
    usage: Arc<dyn UsageRepository>,
    day_counters: DashMap<(Uuid, Date), DayCounter>,
    recent: DashMap<(Uuid, ActionKind), Vec<OffsetDateTime>>,
}

impl ActionTracker {
    pub fn new(usage: Arc<dyn UsageRepository>) -> Self {
        ActionTracker {
            usage,
            day_counters: DashMap::new(),
            recent: DashMap::new(),
        }
    }

    /// Records one performed action in both tiers. A durable write failure
    /// is returned to the caller; the ephemeral side has already been
    /// updated at that point.
    pub async fn track_action(
        &self,
        account_id: Uuid,
        action: ActionKind,
    ) -> Result<(), sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let day = now.date();

        {
            let mut counter = self
                .day_counters
                .entry((account_id, day))
                .or_insert_with(|| DayCounter::new(now));
            match action {
                ActionKind::CommentReply => counter.comments += 1,
                ActionKind::DirectMessage => counter.dms += 1,
            }
            counter.total += 1;
            counter.touched_at = now;
        }
        self.recent
            .entry((account_id, action))
            .or_default()
            .push(now);
        self.evict_expired(now);

        self.usage
            .increment_daily_usage(account_id, day, action)
            .await
    }

    /// Bumps the durable workflow-run total for today.
    pub async fn track_run(&self, account_id: Uuid) -> Result<(), sqlx::Error> {
        let day = OffsetDateTime::now_utc().date();
        self.usage.increment_workflow_runs(account_id, day).await
    }

    /// Today's counts from the ephemeral tier; missing fields default to
    /// zero. Authoritative only for admission decisions, never for history.
    pub fn get_daily_stats(&self, account_id: Uuid) -> DailyStats {
        let day = OffsetDateTime::now_utc().date();
        self.day_counters
            .get(&(account_id, day))
            .map(|c| DailyStats {
                comments: c.comments,
                dms: c.dms,
                total: c.total,
            })
            .unwrap_or_default()
    }

    /// Burst signal: actions of any kind within the trailing window,
    /// independent of the hard hourly/daily ceilings.
    pub fn get_recent_action_count(&self, account_id: Uuid, window_minutes: u64) -> u32 {
        let cutoff = OffsetDateTime::now_utc() - Duration::minutes(window_minutes as i64);
        [ActionKind::CommentReply, ActionKind::DirectMessage]
            .into_iter()
            .map(|action| self.count_recent(account_id, action, cutoff))
            .sum()
    }

    fn count_recent(&self, account_id: Uuid, action: ActionKind, cutoff: OffsetDateTime) -> u32 {
        match self.recent.get_mut(&(account_id, action)) {
            Some(mut entry) => {
                entry.retain(|&ts| ts > cutoff);
                entry.len() as u32
            }
            None => 0,
        }
    }

    /// Checks the platform-wide ceilings for one action class; the first
    /// violated ceiling wins.
    pub fn can_perform_action(&self, account_id: Uuid, action: ActionKind) -> Permit {
        let stats = self.get_daily_stats(account_id);
        let (daily_used, daily_ceiling, hourly_ceiling) = match action {
            ActionKind::CommentReply => {
                (stats.comments, DAILY_COMMENT_CEILING, HOURLY_COMMENT_CEILING)
            }
            ActionKind::DirectMessage => (stats.dms, DAILY_DM_CEILING, HOURLY_DM_CEILING),
        };

        if daily_used >= daily_ceiling {
            return Permit::denied(format!(
                "Daily {} limit reached ({daily_ceiling}/day)",
                action.noun()
            ));
        }

        let hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
        let hourly_used = self.count_recent(account_id, action, hour_ago);
        if hourly_used >= hourly_ceiling {
            return Permit::denied(format!(
                "Hourly {} limit reached ({hourly_ceiling}/hour)",
                action.noun()
            ));
        }

        Permit::allowed()
    }

    /// Trailing 7-day totals from the durable aggregate.
    pub async fn get_weekly_stats(&self, account_id: Uuid) -> Result<WeeklyStats, sqlx::Error> {
        let since = OffsetDateTime::now_utc().date() - Duration::days(6);
        let days = self.usage.list_usage_since(account_id, since).await?;
        let mut stats = WeeklyStats {
            comments: 0,
            dms: 0,
            total: 0,
            workflow_runs: 0,
            days: Vec::new(),
        };
        for day in &days {
            stats.comments += day.comment_count;
            stats.dms += day.dm_count;
            stats.total += day.total_count;
            stats.workflow_runs += day.workflow_runs;
        }
        stats.days = days;
        Ok(stats)
    }

    /// Health score over the durable aggregate:
    /// `100 - max(commentUsagePct, dmUsagePct)` for today, bucketed at the
    /// 60%/80% marks, with accumulated textual recommendations.
    pub async fn get_account_health(&self, account_id: Uuid) -> Result<AccountHealth, sqlx::Error> {
        let today = OffsetDateTime::now_utc().date();
        let usage = self.usage.get_daily_usage(account_id, today).await?;

        let (comments, dms) = usage
            .map(|row| (row.comment_count.max(0) as u32, row.dm_count.max(0) as u32))
            .unwrap_or((0, 0));
        let comment_pct = comments * 100 / DAILY_COMMENT_CEILING;
        let dm_pct = dms * 100 / DAILY_DM_CEILING;
        let max_pct = comment_pct.max(dm_pct).min(100);

        let status = if max_pct > HEALTH_CRITICAL_PCT {
            HealthStatus::Critical
        } else if max_pct >= HEALTH_WARNING_PCT {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let mut recommendations = Vec::new();
        if comment_pct > HEALTH_CRITICAL_PCT {
            recommendations
                .push("Approaching the daily comment ceiling; pause comment automations.".into());
        } else if comment_pct >= HEALTH_WARNING_PCT {
            recommendations.push("Comment volume is elevated; consider longer delays.".into());
        }
        if dm_pct > HEALTH_CRITICAL_PCT {
            recommendations.push("Approaching the daily DM ceiling; pause DM follow-ups.".into());
        } else if dm_pct >= HEALTH_WARNING_PCT {
            recommendations.push("DM volume is elevated; consider longer delays.".into());
        }
        if self.get_recent_action_count(account_id, 15) > 30 {
            recommendations
                .push("High burst of actions in the last 15 minutes; spread workflows out.".into());
        }
        if recommendations.is_empty() {
            recommendations.push("Account usage is well within daily ceilings.".into());
        }

        Ok(AccountHealth {
            score: (100 - max_pct) as u8,
            status,
            recommendations,
        })
    }

    /// Drops counters past the 48-hour TTL so the map stays bounded.
    fn evict_expired(&self, now: OffsetDateTime) {
        let cutoff = now - EPHEMERAL_TTL;
        self.day_counters.retain(|_, c| c.touched_at > cutoff);
        self.recent.retain(|_, window| {
            window.retain(|&ts| ts > cutoff);
            !window.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryUsageRepository;
    use crate::models::usage::DailyUsage;

    fn tracker() -> (ActionTracker, Arc<InMemoryUsageRepository>) {
        let usage = Arc::new(InMemoryUsageRepository::default());
        (ActionTracker::new(usage.clone()), usage)
    }

    #[tokio::test]
    async fn daily_stats_count_per_action_type() {
        let (tracker, _) = tracker();
        let account = Uuid::new_v4();

        for _ in 0..5 {
            tracker
                .track_action(account, ActionKind::CommentReply)
                .await
                .expect("in-memory repo cannot fail");
        }

        let stats = tracker.get_daily_stats(account);
        assert_eq!(
            stats,
            DailyStats {
                comments: 5,
                dms: 0,
                total: 5
            }
        );
        // Another account stays at zero.
        assert_eq!(tracker.get_daily_stats(Uuid::new_v4()), DailyStats::default());
    }

    #[tokio::test]
    async fn track_action_updates_the_durable_aggregate() {
        let (tracker, usage) = tracker();
        let account = Uuid::new_v4();

        tracker
            .track_action(account, ActionKind::CommentReply)
            .await
            .expect("in-memory repo cannot fail");
        tracker
            .track_action(account, ActionKind::DirectMessage)
            .await
            .expect("in-memory repo cannot fail");
        tracker.track_run(account).await.expect("in-memory repo cannot fail");

        let today = OffsetDateTime::now_utc().date();
        let row = usage
            .get_daily_usage(account, today)
            .await
            .expect("in-memory repo cannot fail")
            .expect("row upserted");
        assert_eq!(row.comment_count, 1);
        assert_eq!(row.dm_count, 1);
        assert_eq!(row.total_count, 2);
        assert_eq!(row.workflow_runs, 1);
    }

    #[tokio::test]
    async fn daily_ceiling_denies_with_reason() {
        let (tracker, _) = tracker();
        let account = Uuid::new_v4();

        for _ in 0..DAILY_COMMENT_CEILING {
            tracker
                .track_action(account, ActionKind::CommentReply)
                .await
                .expect("in-memory repo cannot fail");
        }

        let permit = tracker.can_perform_action(account, ActionKind::CommentReply);
        assert!(!permit.allowed);
        let reason = permit.reason.expect("denied permits carry a reason");
        assert!(
            reason.contains("Daily comment limit"),
            "unexpected reason: {reason}"
        );
        // DMs are accounted independently.
        assert!(tracker.can_perform_action(account, ActionKind::DirectMessage).allowed);
    }

    #[tokio::test]
    async fn hourly_ceiling_denies_even_when_daily_is_low() {
        let (tracker, _) = tracker();
        let account = Uuid::new_v4();

        for _ in 0..HOURLY_COMMENT_CEILING {
            tracker
                .track_action(account, ActionKind::CommentReply)
                .await
                .expect("in-memory repo cannot fail");
        }

        let stats = tracker.get_daily_stats(account);
        assert!(stats.comments < DAILY_COMMENT_CEILING);

        let permit = tracker.can_perform_action(account, ActionKind::CommentReply);
        assert!(!permit.allowed);
        let reason = permit.reason.expect("denied permits carry a reason");
        assert!(
            reason.contains("Hourly comment limit"),
            "unexpected reason: {reason}"
        );
    }

    #[tokio::test]
    async fn recent_action_count_spans_action_types() {
        let (tracker, _) = tracker();
        let account = Uuid::new_v4();

        tracker
            .track_action(account, ActionKind::CommentReply)
            .await
            .expect("in-memory repo cannot fail");
        tracker
            .track_action(account, ActionKind::DirectMessage)
            .await
            .expect("in-memory repo cannot fail");
        tracker
            .track_action(account, ActionKind::DirectMessage)
            .await
            .expect("in-memory repo cannot fail");

        assert_eq!(tracker.get_recent_action_count(account, 5), 3);
        assert_eq!(tracker.get_recent_action_count(Uuid::new_v4(), 5), 0);
    }

    #[tokio::test]
    async fn weekly_stats_sum_the_trailing_window() {
        let (tracker, usage) = tracker();
        let account = Uuid::new_v4();
        let today = OffsetDateTime::now_utc().date();

        usage.seed(DailyUsage {
            account_id: account,
            day: today,
            comment_count: 10,
            dm_count: 4,
            total_count: 14,
            workflow_runs: 6,
            updated_at: OffsetDateTime::now_utc(),
        });
        usage.seed(DailyUsage {
            account_id: account,
            day: today - Duration::days(2),
            comment_count: 7,
            dm_count: 1,
            total_count: 8,
            workflow_runs: 3,
            updated_at: OffsetDateTime::now_utc(),
        });
        // Outside the 7-day window: ignored.
        usage.seed(DailyUsage {
            account_id: account,
            day: today - Duration::days(10),
            comment_count: 99,
            dm_count: 99,
            total_count: 198,
            workflow_runs: 99,
            updated_at: OffsetDateTime::now_utc(),
        });

        let weekly = tracker
            .get_weekly_stats(account)
            .await
            .expect("in-memory repo cannot fail");
        assert_eq!(weekly.comments, 17);
        assert_eq!(weekly.dms, 5);
        assert_eq!(weekly.total, 22);
        assert_eq!(weekly.workflow_runs, 9);
        assert_eq!(weekly.days.len(), 2);
    }

    #[tokio::test]
    async fn health_score_tracks_the_busier_action_class() {
        let (tracker, usage) = tracker();
        let account = Uuid::new_v4();
        let today = OffsetDateTime::now_utc().date();

        usage.seed(DailyUsage {
            account_id: account,
            day: today,
            comment_count: 170, // 85% of 200
            dm_count: 10,       // 10% of 100
            total_count: 180,
            workflow_runs: 12,
            updated_at: OffsetDateTime::now_utc(),
        });

        let health = tracker
            .get_account_health(account)
            .await
            .expect("in-memory repo cannot fail");
        assert_eq!(health.score, 15);
        assert_eq!(health.status, HealthStatus::Critical);
        assert!(!health.recommendations.is_empty());
    }

    #[tokio::test]
    async fn idle_account_is_healthy() {
        let (tracker, _) = tracker();
        let health = tracker
            .get_account_health(Uuid::new_v4())
            .await
            .expect("in-memory repo cannot fail");
        assert_eq!(health.score, 100);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.recommendations.len(), 1);
    }
}
