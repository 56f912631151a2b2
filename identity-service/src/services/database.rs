//! Persistence port for the identity core and its PostgreSQL adapter.
//!
//! Every state transition that must be race-safe (lockout bump, refresh
//! rotation, reset redemption, password change) is a single conditional
//! statement or a single transaction here, never a read-then-write in the
//! service layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AuditLog, PasswordHistory, PasswordResetToken, Principal, RefreshToken, RoleClaim, Tenant,
};
use crate::services::ServiceError;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // ==================== Principals ====================

    /// Case-insensitive lookup.
    async fn find_principal_by_email(&self, email: &str)
        -> Result<Option<Principal>, ServiceError>;

    async fn find_principal_by_id(&self, principal_id: Uuid)
        -> Result<Option<Principal>, ServiceError>;

    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError>;

    async fn set_principal_active(
        &self,
        principal_id: Uuid,
        is_active: bool,
    ) -> Result<bool, ServiceError>;

    /// Atomically bump the failed-attempt counter. When the bump reaches
    /// `threshold`, `lockout_until` is applied and the counter resets; the
    /// applied lockout is returned.
    async fn record_failed_login(
        &self,
        principal_id: Uuid,
        threshold: i32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ServiceError>;

    /// Reset the counter, clear lockout and stamp the last login.
    async fn record_successful_login(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// Replace the password hash only if it still equals `expected_hash`.
    async fn update_password(
        &self,
        principal_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        history: &PasswordHistory,
    ) -> Result<bool, ServiceError>;

    // ==================== Refresh Tokens ====================

    /// Persist a new token and drop the principal's revoked or expired rows.
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), ServiceError>;

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, ServiceError>;

    /// Revoke the presented token and persist its successor in one unit of
    /// work, dropping the principal's older revoked or expired rows. Returns
    /// `false` without writing anything when the presented token is no
    /// longer active.
    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    async fn revoke_all_refresh_tokens(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;

    // ==================== Password Reset ====================

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), ServiceError>;

    /// Consume a redeemable reset token and apply the new hash in one
    /// transaction. Every other outstanding reset token of the principal is
    /// consumed with it, lockout is cleared and refresh tokens are revoked.
    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ServiceError>;

    // ==================== Role Claims ====================

    async fn list_role_claims(&self, role_code: &str) -> Result<Vec<RoleClaim>, ServiceError>;

    async fn grant_role_claim(&self, role_code: &str, claim_code: &str)
        -> Result<bool, ServiceError>;

    async fn revoke_role_claim(
        &self,
        role_code: &str,
        claim_code: &str,
    ) -> Result<bool, ServiceError>;

    // ==================== Tenants ====================

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError>;

    /// Write the tenant only if it still carries `expected_updated_utc`.
    /// Returns `false` when the row is gone or was changed by another writer.
    async fn update_tenant(
        &self,
        tenant: &Tenant,
        expected_updated_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Fails with `Conflict` while principals still belong to the tenant.
    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, ServiceError>;

    // ==================== Audit ====================

    async fn append_audit_logs(&self, logs: &[AuditLog]) -> Result<(), ServiceError>;

    async fn list_audit_logs(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLog>, ServiceError>;
}

/// PostgreSQL-backed identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        crate::db::health_check(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::Database(e)
        })
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Principal>(
                "SELECT * FROM principals WHERE LOWER(email) = LOWER($1)",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn find_principal_by_id(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<Principal>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE principal_id = $1")
                .bind(principal_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO principals (
                principal_id, tenant_id, email, display_name, password_hash, role_code,
                is_active, failed_login_attempts, lockout_until, last_login_utc,
                password_history, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(principal.principal_id)
        .bind(principal.tenant_id)
        .bind(&principal.email)
        .bind(&principal.display_name)
        .bind(&principal.password_hash)
        .bind(&principal.role_code)
        .bind(principal.is_active)
        .bind(principal.failed_login_attempts)
        .bind(principal.lockout_until)
        .bind(principal.last_login_utc)
        .bind(principal.password_history.to_vec())
        .bind(principal.created_utc)
        .bind(principal.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_principal_active(
        &self,
        principal_id: Uuid,
        is_active: bool,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE principals SET is_active = $2, updated_utc = NOW() WHERE principal_id = $1",
        )
        .bind(principal_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_login(
        &self,
        principal_id: Uuid,
        threshold: i32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ServiceError> {
        // SET expressions read the pre-update row, so both columns agree on
        // whether this attempt reached the threshold.
        let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
            r#"
            UPDATE principals SET
                failed_login_attempts = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN 0
                    ELSE failed_login_attempts + 1
                END,
                lockout_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE lockout_until
                END,
                updated_utc = NOW()
            WHERE principal_id = $1
            RETURNING CASE WHEN failed_login_attempts = 0 THEN lockout_until END
            "#,
        )
        .bind(principal_id)
        .bind(threshold)
        .bind(lockout_until)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(until,)| until))
    }

    async fn record_successful_login(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE principals
            SET failed_login_attempts = 0, lockout_until = NULL, last_login_utc = $2, updated_utc = $2
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        principal_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        history: &PasswordHistory,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE principals
            SET password_hash = $3, password_history = $4, updated_utc = NOW()
            WHERE principal_id = $1 AND password_hash = $2
            "#,
        )
        .bind(principal_id)
        .bind(expected_hash)
        .bind(new_hash)
        .bind(history.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE principal_id = $1 AND (revoked = TRUE OR expires_utc <= NOW())
            "#,
        )
        .bind(token.principal_id)
        .execute(&mut *tx)
        .await?;

        insert_refresh_token_row(&mut tx, token).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(
            sqlx::query_as::<_, RefreshToken>(
                "SELECT * FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_utc = $2, replaced_by = $3
            WHERE token_hash = $1 AND revoked = FALSE AND expires_utc > $2
            "#,
        )
        .bind(presented_hash)
        .bind(now)
        .bind(successor.token_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_refresh_token_row(&mut tx, successor).await?;

        // The row just revoked stays for one hop so a replay is still recognised.
        sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE principal_id = $1 AND token_hash <> $2
              AND (revoked = TRUE OR expires_utc <= $3)
            "#,
        )
        .bind(successor.principal_id)
        .bind(presented_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_utc = $2
            WHERE token_hash = $1 AND revoked = FALSE
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_refresh_tokens(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_utc = $2
            WHERE principal_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(principal_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens
                (token_id, principal_id, token_hash, expires_utc, used_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.token_id)
        .bind(token.principal_id)
        .bind(&token.token_hash)
        .bind(token.expires_utc)
        .bind(token.used_utc)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let consumed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE password_reset_tokens SET used_utc = $2
            WHERE token_hash = $1 AND used_utc IS NULL AND expires_utc > $2
            RETURNING principal_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((principal_id,)) = consumed else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE password_reset_tokens SET used_utc = $2
            WHERE principal_id = $1 AND used_utc IS NULL
            "#,
        )
        .bind(principal_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let Some(principal) = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE principal_id = $1 FOR UPDATE",
        )
        .bind(principal_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut history = principal.password_history.clone();
        history.push(principal.password_hash.clone());

        let updated = sqlx::query_as::<_, Principal>(
            r#"
            UPDATE principals
            SET password_hash = $2, password_history = $3,
                failed_login_attempts = 0, lockout_until = NULL, updated_utc = $4
            WHERE principal_id = $1
            RETURNING *
            "#,
        )
        .bind(principal_id)
        .bind(new_hash)
        .bind(history.to_vec())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_utc = $2
            WHERE principal_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(principal_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn list_role_claims(&self, role_code: &str) -> Result<Vec<RoleClaim>, ServiceError> {
        Ok(sqlx::query_as::<_, RoleClaim>(
            "SELECT * FROM role_claims WHERE role_code = $1 ORDER BY claim_code",
        )
        .bind(role_code)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn grant_role_claim(
        &self,
        role_code: &str,
        claim_code: &str,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_claims (role_code, claim_code, created_utc)
            VALUES ($1, $2, NOW())
            ON CONFLICT (role_code, claim_code) DO NOTHING
            "#,
        )
        .bind(role_code)
        .bind(claim_code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_role_claim(
        &self,
        role_code: &str,
        claim_code: &str,
    ) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM role_claims WHERE role_code = $1 AND claim_code = $2")
                .bind(role_code)
                .bind(claim_code)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, tenant_name, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.tenant_name)
        .bind(tenant.is_active)
        .bind(tenant.created_utc)
        .bind(tenant.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tenant(
        &self,
        tenant: &Tenant,
        expected_updated_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE tenants SET tenant_name = $2, is_active = $3, updated_utc = $4
            WHERE tenant_id = $1 AND updated_utc = $5
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.tenant_name)
        .bind(tenant.is_active)
        .bind(tenant.updated_utc)
        .bind(expected_updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(result) => Ok(result.rows_affected() == 1),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Err(
                ServiceError::Conflict("tenant still has principals".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_audit_logs(&self, logs: &[AuditLog]) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        for log in logs {
            sqlx::query(
                r#"
                INSERT INTO audit_logs (
                    audit_id, principal_id, action, entity_type, entity_id,
                    old_values, new_values, ip_address, user_agent, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(log.audit_id)
            .bind(log.principal_id)
            .bind(&log.action)
            .bind(&log.entity_type)
            .bind(&log.entity_id)
            .bind(&log.old_values)
            .bind(&log.new_values)
            .bind(&log.ip_address)
            .bind(&log.user_agent)
            .bind(log.created_utc)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

async fn insert_refresh_token_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &RefreshToken,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (
            token_id, principal_id, token_hash, expires_utc, revoked, revoked_utc,
            replaced_by, ip_address, user_agent, created_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(token.token_id)
    .bind(token.principal_id)
    .bind(&token.token_hash)
    .bind(token.expires_utc)
    .bind(token.revoked)
    .bind(token.revoked_utc)
    .bind(token.replaced_by)
    .bind(&token.ip_address)
    .bind(&token.user_agent)
    .bind(token.created_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
