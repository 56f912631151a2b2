use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::token_digest;

/// Single-use reset token bound to one principal. Stored as a digest.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub token_id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub expires_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn new(principal_id: Uuid, token: &str, expires_in_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            principal_id,
            token_hash: token_digest(token),
            expires_utc: now + Duration::minutes(expires_in_minutes),
            used_utc: None,
            created_utc: now,
        }
    }

    /// Unused and unexpired at `now`.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_utc.is_none() && now < self.expires_utc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_or_expired_tokens_are_not_redeemable() {
        let now = Utc::now();
        let mut token = PasswordResetToken::new(Uuid::new_v4(), "reset", 60);
        assert!(token.is_redeemable(now));

        token.used_utc = Some(now);
        assert!(!token.is_redeemable(now));

        token.used_utc = None;
        token.expires_utc = now - Duration::seconds(1);
        assert!(!token.is_redeemable(now));
    }
}
