use serde::{Deserialize, Serialize};

/// Per-workflow safety configuration as declared in the builder. When
/// `enabled` is false every other sub-policy is ignored and no action is
/// gated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SafetySettings {
    pub enabled: bool,
    pub use_recommended_limits: bool,
    pub custom_limits: Option<CustomLimits>,
    pub active_hours: Option<ActiveHours>,
    pub delays: Option<DelaySettings>,
    pub content_safety: Option<ContentRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomLimits {
    pub comments_per_hour: Option<u32>,
    pub comments_per_day: Option<u32>,
    pub dms_per_hour: Option<u32>,
    pub dms_per_day: Option<u32>,
}

/// Hours of the account-local day the workflow may act in, `[start, end)`.
/// `start > end` describes an overnight window, e.g. 22..6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActiveHours {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for ActiveHours {
    fn default() -> Self {
        ActiveHours {
            enabled: false,
            start_hour: 0,
            end_hour: 24,
        }
    }
}

/// Human-pacing delays between send-class actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelaySettings {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Extra gap between a comment reply and its follow-up DM.
    pub dm_delay_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        DelaySettings {
            enabled: true,
            min_delay_ms: 3_000,
            max_delay_ms: 15_000,
            dm_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentRules {
    pub enabled: bool,
    pub check_banned_phrases: bool,
    /// Extra phrases on top of the built-in list.
    pub banned_phrases: Vec<String>,
    pub max_mentions: u32,
    pub max_hashtags: u32,
    pub max_urls: u32,
}

impl Default for ContentRules {
    fn default() -> Self {
        ContentRules {
            enabled: true,
            check_banned_phrases: true,
            banned_phrases: Vec::new(),
            max_mentions: 5,
            max_hashtags: 10,
            max_urls: 2,
        }
    }
}

/// Concrete numeric limits a run is gated against once safety is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimits {
    pub comments_per_hour: u32,
    pub comments_per_day: u32,
    pub dms_per_hour: u32,
    pub dms_per_day: u32,
}

/// Version-controlled recommended limit set. Deliberately tighter than the
/// platform-wide ceilings enforced by the action tracker.
pub const RECOMMENDED_LIMITS: EffectiveLimits = EffectiveLimits {
    comments_per_hour: 20,
    comments_per_day: 150,
    dms_per_hour: 15,
    dms_per_day: 100,
};

const BUILTIN_BANNED_PHRASES: &[&str] = &[
    "follow for follow",
    "f4f",
    "click my link",
    "dm me for free",
    "guaranteed earnings",
    "100% free money",
];

/// `None` means safety is disabled and the coordinator takes the ungated
/// fast path. Custom limits default any missing field to the recommended
/// value.
pub fn resolve(settings: &SafetySettings) -> Option<EffectiveLimits> {
    if !settings.enabled {
        return None;
    }
    if settings.use_recommended_limits {
        return Some(RECOMMENDED_LIMITS);
    }
    let custom = settings.custom_limits.clone().unwrap_or_default();
    Some(EffectiveLimits {
        comments_per_hour: custom
            .comments_per_hour
            .unwrap_or(RECOMMENDED_LIMITS.comments_per_hour),
        comments_per_day: custom
            .comments_per_day
            .unwrap_or(RECOMMENDED_LIMITS.comments_per_day),
        dms_per_hour: custom
            .dms_per_hour
            .unwrap_or(RECOMMENDED_LIMITS.dms_per_hour),
        dms_per_day: custom
            .dms_per_day
            .unwrap_or(RECOMMENDED_LIMITS.dms_per_day),
    })
}

pub fn is_within_active_hours(settings: &SafetySettings, local_hour: u32) -> bool {
    let Some(hours) = settings.active_hours.as_ref() else {
        return true;
    };
    if !hours.enabled || hours.start_hour == hours.end_hour {
        return true;
    }
    if hours.start_hour < hours.end_hour {
        local_hour >= hours.start_hour && local_hour < hours.end_hour
    } else {
        local_hour >= hours.start_hour || local_hour < hours.end_hour
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVerdict {
    pub safe: bool,
    pub reason: Option<String>,
}

impl ContentVerdict {
    fn pass() -> Self {
        ContentVerdict {
            safe: true,
            reason: None,
        }
    }

    fn reject<R: Into<String>>(reason: R) -> Self {
        ContentVerdict {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluates banned phrases, mention count, hashtag count and URL count in
/// that order; the first violated rule short-circuits.
pub fn check_content(message: &str, rules: &ContentRules) -> ContentVerdict {
    if !rules.enabled {
        return ContentVerdict::pass();
    }

    let lowered = message.to_lowercase();
    if rules.check_banned_phrases {
        for phrase in BUILTIN_BANNED_PHRASES {
            if lowered.contains(phrase) {
                return ContentVerdict::reject(format!(
                    "message contains banned phrase \"{phrase}\""
                ));
            }
        }
    }
    for phrase in &rules.banned_phrases {
        if lowered.contains(&phrase.to_lowercase()) {
            return ContentVerdict::reject(format!("message contains banned phrase \"{phrase}\""));
        }
    }

    let mentions = count_marked_tokens(message, '@');
    if mentions > rules.max_mentions {
        return ContentVerdict::reject(format!(
            "too many mentions ({mentions}, limit {})",
            rules.max_mentions
        ));
    }

    let hashtags = count_marked_tokens(message, '#');
    if hashtags > rules.max_hashtags {
        return ContentVerdict::reject(format!(
            "too many hashtags ({hashtags}, limit {})",
            rules.max_hashtags
        ));
    }

    let urls = count_urls(message);
    if urls > rules.max_urls {
        return ContentVerdict::reject(format!(
            "too many URLs ({urls}, limit {})",
            rules.max_urls
        ));
    }

    ContentVerdict::pass()
}

/// Counts `marker` occurrences followed by a word character, i.e. `@name`
/// or `#tag` tokens.
fn count_marked_tokens(text: &str, marker: char) -> u32 {
    let mut count = 0;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == marker {
            if let Some(next) = chars.peek() {
                if next.is_alphanumeric() || *next == '_' {
                    count += 1;
                }
            }
        }
    }
    count
}

fn count_urls(text: &str) -> u32 {
    text.split_whitespace()
        .filter(|token| {
            let token = token.to_lowercase();
            token.contains("http://") || token.contains("https://") || token.starts_with("www.")
        })
        .count() as u32
}
