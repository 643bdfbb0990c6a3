use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::engine::nodes::{NodeError, NodeHandler, NodeOutcome, RunContext};
use crate::models::workflow::NodeDef;

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct FilterConfig {
    /// Trigger text must contain at least one of these (when non-empty).
    include_keywords: Vec<String>,
    /// Trigger text must contain none of these.
    exclude_keywords: Vec<String>,
}

/// Keyword gate over the trigger text. A non-match is a normal early stop
/// for the run, not an error.
pub struct FilterNode;

#[async_trait]
impl NodeHandler for FilterNode {
    fn kind(&self) -> &'static str {
        "filter"
    }

    async fn execute(
        &self,
        node: &NodeDef,
        ctx: &RunContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let config: FilterConfig = serde_json::from_value(node.config.clone())
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        let text = ctx.trigger.data.text.to_lowercase();

        if let Some(excluded) = config
            .exclude_keywords
            .iter()
            .find(|kw| text.contains(&kw.to_lowercase()))
        {
            return Ok(NodeOutcome::Halt {
                outputs: json!({ "matched": false }),
                reason: format!("trigger text contains excluded keyword \"{excluded}\""),
            });
        }

        if !config.include_keywords.is_empty()
            && !config
                .include_keywords
                .iter()
                .any(|kw| text.contains(&kw.to_lowercase()))
        {
            return Ok(NodeOutcome::Halt {
                outputs: json!({ "matched": false }),
                reason: "trigger text matches no include keyword".to_string(),
            });
        }

        Ok(NodeOutcome::Continue(json!({ "matched": true })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_accepts_camel_case_and_defaults() {
        let config: FilterConfig = serde_json::from_value(serde_json::json!({
            "includeKeywords": ["price"]
        }))
        .unwrap();
        assert_eq!(config.include_keywords, vec!["price"]);
        assert!(config.exclude_keywords.is_empty());

        let empty: FilterConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.include_keywords.is_empty());
    }
}
