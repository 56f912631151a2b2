use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::token_digest;

/// Refresh token record. Only the SHA-256 digest of the opaque value is
/// stored; the raw value is handed to the client once.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,

    pub principal_id: Uuid,

    /// SHA-256 hex digest of the opaque token value
    pub token_hash: String,

    pub expires_utc: DateTime<Utc>,

    pub revoked: bool,

    pub revoked_utc: Option<DateTime<Utc>>,

    /// Successor issued when this token was rotated
    pub replaced_by: Option<Uuid>,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(
        principal_id: Uuid,
        token: &str,
        expires_in_days: i64,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            principal_id,
            token_hash: token_digest(token),
            expires_utc: now + Duration::days(expires_in_days),
            revoked: false,
            revoked_utc: None,
            replaced_by: None,
            ip_address,
            user_agent,
            created_utc: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_utc
    }

    /// Not revoked and not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }
}
