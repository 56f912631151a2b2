use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::models::{Principal, RefreshToken};
use crate::services::{IdentityStore, JwtService, ServiceError};
use crate::utils::{generate_opaque_token, token_digest};

/// Where a request came from, recorded on issued refresh tokens.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Access/refresh pair handed to the client.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token expiry
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub access_token_ttl: Duration,
    pub remember_me_ttl: Duration,
    pub refresh_token_days: i64,
}

impl From<&JwtConfig> for SessionSettings {
    fn from(config: &JwtConfig) -> Self {
        Self {
            access_token_ttl: Duration::minutes(config.access_token_expiry_minutes),
            remember_me_ttl: Duration::days(config.remember_me_expiry_days),
            refresh_token_days: config.refresh_token_expiry_days,
        }
    }
}

/// Mints session pairs, rotates refresh tokens and revokes them at sign-out.
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn IdentityStore>,
    jwt: JwtService,
    settings: SessionSettings,
}

impl SessionIssuer {
    pub fn new(store: Arc<dyn IdentityStore>, jwt: JwtService, settings: SessionSettings) -> Self {
        Self {
            store,
            jwt,
            settings,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    fn mint(
        &self,
        principal: &Principal,
        remember_me: bool,
        client: &ClientInfo,
    ) -> Result<(Session, RefreshToken), ServiceError> {
        let now = Utc::now();
        let ttl = if remember_me {
            self.settings.remember_me_ttl
        } else {
            self.settings.access_token_ttl
        };
        let expires_at = now + ttl;

        let access_token = self
            .jwt
            .generate_access_token(principal, now, expires_at)
            .map_err(ServiceError::Internal)?;

        let refresh_value = generate_opaque_token();
        let record = RefreshToken::new(
            principal.principal_id,
            &refresh_value,
            self.settings.refresh_token_days,
            client.ip_address.clone(),
            client.user_agent.clone(),
        );

        Ok((
            Session {
                access_token,
                refresh_token: refresh_value,
                token_type: "Bearer".to_string(),
                expires_at,
            },
            record,
        ))
    }

    /// Mint and persist a new pair for an authenticated principal.
    pub async fn issue(
        &self,
        principal: &Principal,
        remember_me: bool,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let (session, record) = self.mint(principal, remember_me, client)?;
        self.store.insert_refresh_token(&record).await?;

        tracing::info!(
            principal_id = %principal.principal_id,
            remember_me,
            "Session issued"
        );
        Ok(session)
    }

    /// Exchange an active refresh token for a new pair. The presented token
    /// is revoked in the same unit of work that stores its successor; a
    /// token that was already exchanged, even concurrently, yields
    /// `InvalidToken`.
    pub async fn rotate(
        &self,
        presented: &str,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let presented_hash = token_digest(presented);

        let stored = self
            .store
            .find_refresh_token_by_hash(&presented_hash)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !stored.is_active(now) {
            if stored.revoked {
                tracing::warn!(
                    principal_id = %stored.principal_id,
                    token_id = %stored.token_id,
                    replaced_by = ?stored.replaced_by,
                    "Revoked refresh token presented"
                );
            }
            return Err(ServiceError::InvalidToken);
        }

        let principal = self
            .store
            .find_principal_by_id(stored.principal_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !principal.is_active {
            return Err(ServiceError::AccountInactive);
        }
        if let Some(until) = principal.lockout_until.filter(|until| *until > now) {
            return Err(ServiceError::AccountLocked(until));
        }

        let (session, successor) = self.mint(&principal, false, client)?;

        if !self
            .store
            .rotate_refresh_token(&presented_hash, &successor, now)
            .await?
        {
            tracing::warn!(
                principal_id = %principal.principal_id,
                token_id = %stored.token_id,
                "Concurrent refresh token exchange lost"
            );
            return Err(ServiceError::InvalidToken);
        }

        tracing::info!(
            principal_id = %principal.principal_id,
            token_id = %successor.token_id,
            "Refresh token rotated"
        );
        Ok(session)
    }

    /// Sign-out. Unknown or already inactive tokens are accepted silently.
    pub async fn revoke(&self, presented: &str) -> Result<(), ServiceError> {
        let revoked = self
            .store
            .revoke_refresh_token(&token_digest(presented), Utc::now())
            .await?;
        if revoked {
            tracing::info!("Refresh token revoked");
        }
        Ok(())
    }
}
