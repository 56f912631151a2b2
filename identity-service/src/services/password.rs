use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::PasswordResetToken;
use crate::services::notifier::{Notification, Notifier, PASSWORD_RESET_TEMPLATE};
use crate::services::{IdentityStore, ServiceError};
use crate::utils::{generate_opaque_token, token_digest, Password, PasswordHashString, PasswordHasher, PasswordPolicy};

/// Returned by `request_reset` whether or not the address is known.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that address, a password reset code has been sent.";

/// Reset-token issuance and redemption, and in-session password change.
#[derive(Clone)]
pub struct PasswordLifecycle {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    notifier: Arc<dyn Notifier>,
    policy: PasswordPolicy,
    reset_token_ttl: Duration,
}

impl PasswordLifecycle {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: PasswordHasher,
        notifier: Arc<dyn Notifier>,
        reset_token_expiry_minutes: i64,
    ) -> Self {
        Self {
            store,
            hasher,
            notifier,
            policy: PasswordPolicy,
            reset_token_ttl: Duration::minutes(reset_token_expiry_minutes),
        }
    }

    pub async fn request_reset(&self, email: &str) -> Result<&'static str, ServiceError> {
        let principal = match self.store.find_principal_by_email(email).await? {
            Some(p) if p.is_active => p,
            _ => return Ok(RESET_REQUESTED_MESSAGE),
        };

        let token = generate_opaque_token();
        let record = PasswordResetToken::new(
            principal.principal_id,
            &token,
            self.reset_token_ttl.num_minutes(),
        );
        self.store.insert_reset_token(&record).await?;

        tracing::warn!(principal_id = %principal.principal_id, "Password reset requested");

        let notification = Notification {
            recipient: principal.email.clone(),
            template: PASSWORD_RESET_TEMPLATE.to_string(),
            data: serde_json::json!({
                "token": token,
                "expires_at": record.expires_utc.to_rfc3339(),
            }),
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::error!(
                principal_id = %principal.principal_id,
                error = %e,
                "Failed to send password reset notification"
            );
        }

        Ok(RESET_REQUESTED_MESSAGE)
    }

    /// Redeem a reset token. Also clears lockout and revokes every refresh
    /// token of the principal.
    pub async fn reset(&self, token: &str, new_password: Password) -> Result<(), ServiceError> {
        self.policy
            .validate(new_password.as_str())
            .map_err(ServiceError::ValidationFailed)?;

        let new_hash = self
            .hasher
            .hash_blocking(new_password)
            .await
            .map_err(ServiceError::Internal)?;

        let principal = self
            .store
            .redeem_reset_token(&token_digest(token), new_hash.as_str(), Utc::now())
            .await?
            .ok_or(ServiceError::InvalidOrExpiredToken)?;

        tracing::warn!(principal_id = %principal.principal_id, "Password reset completed");
        Ok(())
    }

    /// Change the password of a signed-in principal. The current password
    /// and the last hashes in its history may not be reused.
    pub async fn change_password(
        &self,
        principal_id: Uuid,
        current_password: Password,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        let principal = self
            .store
            .find_principal_by_id(principal_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let current_hash = principal.password_hash.clone();
        let verified = self
            .hasher
            .verify_blocking(current_password, PasswordHashString::new(current_hash.clone()))
            .await
            .map_err(ServiceError::Internal)?;
        if !verified {
            return Err(ServiceError::InvalidCredentials);
        }

        self.policy
            .validate(new_password.as_str())
            .map_err(ServiceError::ValidationFailed)?;

        let mut previous = principal.password_history.to_vec();
        previous.push(current_hash.clone());
        if self
            .hasher
            .matches_any(new_password.clone(), previous)
            .await
            .map_err(ServiceError::Internal)?
        {
            return Err(ServiceError::PasswordReused);
        }

        let new_hash = self
            .hasher
            .hash_blocking(new_password)
            .await
            .map_err(ServiceError::Internal)?;

        let mut history = principal.password_history.clone();
        history.push(current_hash.clone());

        let updated = self
            .store
            .update_password(principal_id, &current_hash, new_hash.as_str(), &history)
            .await?;
        if !updated {
            // Another change landed between verification and update.
            return Err(ServiceError::InvalidCredentials);
        }

        tracing::info!(principal_id = %principal_id, "Password changed");
        Ok(())
    }
}
