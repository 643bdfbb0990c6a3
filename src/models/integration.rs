use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Connection to the external messaging provider. The engine treats the
/// token as opaque; refresh and OAuth live elsewhere.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Integration {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub external_user_id: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Integration {
    pub fn has_valid_token(&self) -> bool {
        self.is_active
            && self
                .access_token
                .as_deref()
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false)
    }
}
