use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::config::LockoutConfig;
use crate::services::{ClientInfo, IdentityStore, ServiceError, Session, SessionIssuer};
use crate::utils::{Password, PasswordHashString, PasswordHasher};

/// A sign-in attempt.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub email: String,
    pub password: Password,
    pub remember_me: bool,
    pub client: ClientInfo,
}

/// Checks credentials and applies the lockout policy.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    sessions: SessionIssuer,
    lockout: LockoutConfig,
}

impl CredentialVerifier {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: PasswordHasher,
        sessions: SessionIssuer,
        lockout: LockoutConfig,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
            lockout,
        }
    }

    /// Unknown email and wrong password both yield `InvalidCredentials`.
    /// Lockout bookkeeping is persisted before this returns.
    pub async fn authenticate(&self, request: SignIn) -> Result<Session, ServiceError> {
        let now = Utc::now();

        let principal = self
            .store
            .find_principal_by_email(&request.email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if let Some(until) = principal.lockout_until.filter(|until| *until > now) {
            tracing::warn!(
                principal_id = %principal.principal_id,
                lockout_until = %until,
                "Sign-in attempted while locked out"
            );
            return Err(ServiceError::AccountLocked(until));
        }

        if !principal.is_active {
            return Err(ServiceError::AccountInactive);
        }

        let matches = self
            .hasher
            .verify_blocking(
                request.password,
                PasswordHashString::new(principal.password_hash.clone()),
            )
            .await
            .map_err(ServiceError::Internal)?;

        if !matches {
            let lockout_until = now + Duration::minutes(self.lockout.lockout_minutes);
            let applied = self
                .store
                .record_failed_login(principal.principal_id, self.lockout.threshold, lockout_until)
                .await?;

            match applied {
                Some(until) => tracing::warn!(
                    principal_id = %principal.principal_id,
                    lockout_until = %until,
                    "Account locked after repeated failed sign-ins"
                ),
                None => tracing::info!(
                    principal_id = %principal.principal_id,
                    "Failed sign-in"
                ),
            }
            return Err(ServiceError::InvalidCredentials);
        }

        self.store
            .record_successful_login(principal.principal_id, now)
            .await?;

        self.sessions
            .issue(&principal, request.remember_me, &request.client)
            .await
    }
}
