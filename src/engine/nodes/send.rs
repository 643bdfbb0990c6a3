use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::engine::nodes::{NodeError, NodeHandler, NodeOutcome, RunContext};
use crate::models::usage::ActionKind;
use crate::models::workflow::NodeDef;
use crate::safety::policy::{self, DelaySettings};
use crate::safety::rate_limiter::RateLimitConfig;
use crate::services::messenger::{DirectMessage, MessageButton};

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SendConfig {
    /// Candidate comment replies; one is picked at random per run.
    public_replies: Vec<String>,
    dm_message: Option<String>,
    buttons: Vec<MessageButton>,
    skip_delay: bool,
    skip_content_check: bool,
}

/// Performs the outbound actions of a run: an optional public comment reply
/// followed by an optional DM to the commenter. Every send passes the quota,
/// content and pacing gates first; provider failures are logged and the run
/// carries on.
///
/// Gates run in the order admission, content check, pacing delay: a send that
/// is going to be rejected must be rejected before the delay, never after it.
pub struct SendNode;

impl SendNode {
    /// Quota admission for one action class. Workflow-level pacing rides on
    /// the sliding window; platform ceilings come from the tracker. A broken
    /// limiter fails open.
    async fn admit(&self, ctx: &RunContext<'_>, action: ActionKind) -> Result<(), NodeError> {
        let Some(limits) = ctx.limits else {
            return Ok(());
        };

        let permit = ctx.state.tracker.can_perform_action(ctx.account_id, action);
        if !permit.allowed {
            warn!(
                account_id = %ctx.account_id,
                reason = permit.reason.as_deref().unwrap_or("unknown"),
                "platform ceiling reached"
            );
            return Err(NodeError::RateLimited { action });
        }

        let per_hour = match action {
            ActionKind::CommentReply => limits.comments_per_hour,
            ActionKind::DirectMessage => limits.dms_per_hour,
        };
        let admitted = match ctx
            .state
            .limiter
            .check_limit(
                &ctx.account_id.to_string(),
                action,
                RateLimitConfig::per_hour(per_hour),
            )
            .await
        {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(%err, "rate limiter unavailable, failing open");
                true
            }
        };
        if !admitted {
            return Err(NodeError::RateLimited { action });
        }
        Ok(())
    }

    fn vet_content(
        &self,
        ctx: &RunContext<'_>,
        config: &SendConfig,
        message: &str,
    ) -> Result<(), NodeError> {
        if ctx.limits.is_none() || config.skip_content_check {
            return Ok(());
        }
        let rules = ctx.settings.content_safety.clone().unwrap_or_default();
        let verdict = policy::check_content(message, &rules);
        if !verdict.safe {
            return Err(NodeError::ContentRejected {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "content check failed".to_string()),
            });
        }
        Ok(())
    }

    fn delays(&self, ctx: &RunContext<'_>, config: &SendConfig) -> Option<DelaySettings> {
        if ctx.limits.is_none() || config.skip_delay {
            return None;
        }
        let delays = ctx.settings.delays.clone().unwrap_or_default();
        if delays.enabled {
            Some(delays)
        } else {
            None
        }
    }

    /// Random human-pacing pause before a send.
    async fn pace(&self, delays: &DelaySettings) {
        let lo = delays.min_delay_ms.min(delays.max_delay_ms);
        let hi = delays.min_delay_ms.max(delays.max_delay_ms);
        let millis = rand::rng().random_range(lo..=hi);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn pick_reply(&self, replies: &[String]) -> String {
        if replies.len() == 1 {
            return replies[0].clone();
        }
        let index = rand::rng().random_range(0..replies.len());
        replies[index].clone()
    }

    async fn track(&self, ctx: &RunContext<'_>, action: ActionKind) {
        if let Err(err) = ctx.state.tracker.track_action(ctx.account_id, action).await {
            warn!(%err, account_id = %ctx.account_id, "usage write failed");
        }
    }
}

#[async_trait]
impl NodeHandler for SendNode {
    fn kind(&self) -> &'static str {
        "send"
    }

    async fn execute(
        &self,
        node: &NodeDef,
        ctx: &RunContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let config: SendConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        if !ctx.integration.has_valid_token() {
            return Err(NodeError::Credential);
        }

        let comment_id = ctx
            .trigger
            .data
            .comment_id
            .as_deref()
            .filter(|_| ctx.trigger.is_comment());
        let delays = self.delays(ctx, &config);

        let mut replied = false;
        let mut reply_text = None;

        if let (Some(comment_id), false) = (comment_id, config.public_replies.is_empty()) {
            self.admit(ctx, ActionKind::CommentReply).await?;
            let text = self.pick_reply(&config.public_replies);
            self.vet_content(ctx, &config, &text)?;
            if let Some(delays) = &delays {
                self.pace(delays).await;
            }

            match ctx
                .state
                .messenger
                .reply_to_comment(ctx.integration, comment_id, &text)
                .await
            {
                Ok(()) => {
                    replied = true;
                    reply_text = Some(text);
                    self.track(ctx, ActionKind::CommentReply).await;
                    if let Err(err) = ctx.state.executions.mark_comment_replied(comment_id).await {
                        warn!(%err, comment_id, "failed to mark comment replied");
                    }
                }
                Err(err) => {
                    warn!(%err, comment_id, "comment reply failed, continuing run");
                }
            }
        }

        let mut dm_sent = false;

        if let Some(dm_text) = config.dm_message.as_deref().filter(|t| !t.trim().is_empty()) {
            self.admit(ctx, ActionKind::DirectMessage).await?;
            self.vet_content(ctx, &config, dm_text)?;
            if let Some(delays) = &delays {
                if replied {
                    tokio::time::sleep(Duration::from_millis(delays.dm_delay_ms)).await;
                } else {
                    self.pace(delays).await;
                }
            }

            let message = DirectMessage {
                text: dm_text.to_string(),
                buttons: config.buttons.clone(),
            };
            match ctx
                .state
                .messenger
                .send_direct_message(ctx.integration, &ctx.trigger.data.user_id, &message)
                .await
            {
                Ok(()) => {
                    dm_sent = true;
                    self.track(ctx, ActionKind::DirectMessage).await;
                    if let Some(comment_id) = comment_id {
                        if let Err(err) =
                            ctx.state.executions.mark_comment_dm_sent(comment_id).await
                        {
                            warn!(%err, comment_id, "failed to mark comment dm_sent");
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, recipient = %ctx.trigger.data.user_id, "dm send failed, continuing run");
                }
            }
        }

        Ok(NodeOutcome::Continue(json!({
            "replied": replied,
            "replyText": reply_text,
            "dmSent": dm_sent,
        })))
    }
}
