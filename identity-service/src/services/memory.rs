//! In-process identity store for tests and local runs.
//!
//! All state sits behind one mutex and no method awaits while holding it, so
//! each method is atomic in the same sense as the PostgreSQL statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AuditLog, PasswordHistory, PasswordResetToken, Principal, RefreshToken, RoleClaim, Tenant,
};
use crate::services::{IdentityStore, ServiceError};

#[derive(Default)]
struct MemoryState {
    principals: HashMap<Uuid, Principal>,
    refresh_tokens: Vec<RefreshToken>,
    reset_tokens: Vec<PasswordResetToken>,
    role_claims: Vec<RoleClaim>,
    tenants: HashMap<Uuid, Tenant>,
    audit_logs: Vec<AuditLog>,
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    state: Mutex<MemoryState>,
    fail_audit_writes: AtomicBool,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `append_audit_logs` fail, to exercise the best-effort audit commit.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Every audit row written so far.
    pub fn audit_logs(&self) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(self.lock()?.audit_logs.clone())
    }

    /// Every refresh token row for a principal, including revoked ones.
    pub fn refresh_tokens_for(&self, principal_id: Uuid) -> Result<Vec<RefreshToken>, ServiceError> {
        Ok(self
            .lock()?
            .refresh_tokens
            .iter()
            .filter(|t| t.principal_id == principal_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ServiceError> {
        self.state
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("Identity store lock poisoned")))
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let email = email.to_lowercase();
        Ok(self
            .lock()?
            .principals
            .values()
            .find(|p| p.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_principal_by_id(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<Principal>, ServiceError> {
        Ok(self.lock()?.principals.get(&principal_id).cloned())
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let email = principal.email.to_lowercase();
        if state
            .principals
            .values()
            .any(|p| p.email.to_lowercase() == email)
        {
            return Err(ServiceError::ValidationFailed(
                "email is already registered".to_string(),
            ));
        }
        state
            .principals
            .insert(principal.principal_id, principal.clone());
        Ok(())
    }

    async fn set_principal_active(
        &self,
        principal_id: Uuid,
        is_active: bool,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        let Some(principal) = state.principals.get_mut(&principal_id) else {
            return Ok(false);
        };
        principal.is_active = is_active;
        principal.updated_utc = Utc::now();
        Ok(true)
    }

    async fn record_failed_login(
        &self,
        principal_id: Uuid,
        threshold: i32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ServiceError> {
        let mut state = self.lock()?;
        let Some(principal) = state.principals.get_mut(&principal_id) else {
            return Ok(None);
        };

        principal.updated_utc = Utc::now();
        if principal.failed_login_attempts + 1 >= threshold {
            principal.failed_login_attempts = 0;
            principal.lockout_until = Some(lockout_until);
            Ok(Some(lockout_until))
        } else {
            principal.failed_login_attempts += 1;
            Ok(None)
        }
    }

    async fn record_successful_login(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if let Some(principal) = state.principals.get_mut(&principal_id) {
            principal.failed_login_attempts = 0;
            principal.lockout_until = None;
            principal.last_login_utc = Some(now);
            principal.updated_utc = now;
        }
        Ok(())
    }

    async fn update_password(
        &self,
        principal_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        history: &PasswordHistory,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.principals.get_mut(&principal_id) {
            Some(principal) if principal.password_hash == expected_hash => {
                principal.password_hash = new_hash.to_string();
                principal.password_history = history.clone();
                principal.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), ServiceError> {
        let now = Utc::now();
        let mut state = self.lock()?;
        state
            .refresh_tokens
            .retain(|t| t.principal_id != token.principal_id || t.is_active(now));
        state.refresh_tokens.push(token.clone());
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(self
            .lock()?
            .refresh_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        let Some(presented) = state
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == presented_hash && t.is_active(now))
        else {
            return Ok(false);
        };

        presented.revoked = true;
        presented.revoked_utc = Some(now);
        presented.replaced_by = Some(successor.token_id);

        state.refresh_tokens.retain(|t| {
            t.principal_id != successor.principal_id
                || t.token_hash == presented_hash
                || t.is_active(now)
        });
        state.refresh_tokens.push(successor.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && !t.revoked)
        {
            Some(token) => {
                token.revoked = true;
                token.revoked_utc = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let mut state = self.lock()?;
        Ok(revoke_all(&mut state, principal_id, now))
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), ServiceError> {
        self.lock()?.reset_tokens.push(token.clone());
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ServiceError> {
        let mut state = self.lock()?;

        let Some(index) = state
            .reset_tokens
            .iter()
            .position(|t| t.token_hash == token_hash && t.is_redeemable(now))
        else {
            return Ok(None);
        };
        let principal_id = state.reset_tokens[index].principal_id;

        if !state.principals.contains_key(&principal_id) {
            return Ok(None);
        }
        for token in state
            .reset_tokens
            .iter_mut()
            .filter(|t| t.principal_id == principal_id && t.used_utc.is_none())
        {
            token.used_utc = Some(now);
        }

        revoke_all(&mut state, principal_id, now);

        let Some(principal) = state.principals.get_mut(&principal_id) else {
            return Ok(None);
        };
        let outgoing = std::mem::replace(&mut principal.password_hash, new_hash.to_string());
        principal.password_history.push(outgoing);
        principal.failed_login_attempts = 0;
        principal.lockout_until = None;
        principal.updated_utc = now;
        Ok(Some(principal.clone()))
    }

    async fn list_role_claims(&self, role_code: &str) -> Result<Vec<RoleClaim>, ServiceError> {
        let mut claims: Vec<RoleClaim> = self
            .lock()?
            .role_claims
            .iter()
            .filter(|rc| rc.role_code == role_code)
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.claim_code.cmp(&b.claim_code));
        Ok(claims)
    }

    async fn grant_role_claim(
        &self,
        role_code: &str,
        claim_code: &str,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        if state
            .role_claims
            .iter()
            .any(|rc| rc.role_code == role_code && rc.claim_code == claim_code)
        {
            return Ok(false);
        }
        state.role_claims.push(RoleClaim {
            role_code: role_code.to_string(),
            claim_code: claim_code.to_string(),
            created_utc: Utc::now(),
        });
        Ok(true)
    }

    async fn revoke_role_claim(
        &self,
        role_code: &str,
        claim_code: &str,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        let before = state.role_claims.len();
        state
            .role_claims
            .retain(|rc| !(rc.role_code == role_code && rc.claim_code == claim_code));
        Ok(state.role_claims.len() != before)
    }

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        Ok(self.lock()?.tenants.get(&tenant_id).cloned())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        self.lock()?.tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn update_tenant(
        &self,
        tenant: &Tenant,
        expected_updated_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.tenants.get_mut(&tenant.tenant_id) {
            Some(existing) if existing.updated_utc == expected_updated_utc => {
                *existing = tenant.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        if state
            .principals
            .values()
            .any(|p| p.tenant_id == Some(tenant_id))
        {
            return Err(ServiceError::Conflict(
                "tenant still has principals".to_string(),
            ));
        }
        Ok(state.tenants.remove(&tenant_id).is_some())
    }

    async fn append_audit_logs(&self, logs: &[AuditLog]) -> Result<(), ServiceError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "audit log table unavailable"
            )));
        }
        self.lock()?.audit_logs.extend_from_slice(logs);
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(self
            .lock()?
            .audit_logs
            .iter()
            .filter(|log| log.entity_type == entity_type && log.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

fn revoke_all(state: &mut MemoryState, principal_id: Uuid, now: DateTime<Utc>) -> u64 {
    let mut revoked = 0;
    for token in state
        .refresh_tokens
        .iter_mut()
        .filter(|t| t.principal_id == principal_id && !t.revoked)
    {
        token.revoked = true;
        token.revoked_utc = Some(now);
        revoked += 1;
    }
    revoked
}
