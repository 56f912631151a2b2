use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Principal, PrincipalResponse, Role};
use crate::services::{IdentityStore, ServiceError};
use crate::utils::{Password, PasswordHasher, PasswordPolicy};

/// Provisioning input for a new principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub password: Password,
    pub role: Role,
}

/// Principal lookup and provisioning.
#[derive(Clone)]
pub struct PrincipalDirectory {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
}

impl PrincipalDirectory {
    pub fn new(store: Arc<dyn IdentityStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            policy: PasswordPolicy,
        }
    }

    pub async fn current(&self, principal_id: Uuid) -> Result<PrincipalResponse, ServiceError> {
        self.store
            .find_principal_by_id(principal_id)
            .await?
            .map(|p| p.sanitized())
            .ok_or_else(|| ServiceError::NotFound("principal".to_string()))
    }

    pub async fn provision(&self, request: NewPrincipal) -> Result<Principal, ServiceError> {
        let email = request.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::ValidationFailed(
                "email is not a valid address".to_string(),
            ));
        }
        self.policy
            .validate(request.password.as_str())
            .map_err(ServiceError::ValidationFailed)?;

        if self.store.find_principal_by_email(&email).await?.is_some() {
            return Err(ServiceError::ValidationFailed(
                "email is already registered".to_string(),
            ));
        }

        let hash = self
            .hasher
            .hash_blocking(request.password)
            .await
            .map_err(ServiceError::Internal)?;

        let principal = Principal::new(
            request.tenant_id,
            email,
            request.display_name,
            hash.into_string(),
            request.role,
        );
        self.store.insert_principal(&principal).await?;

        tracing::info!(
            principal_id = %principal.principal_id,
            role = %request.role,
            "Principal provisioned"
        );
        Ok(principal)
    }

    pub async fn set_active(&self, principal_id: Uuid, is_active: bool) -> Result<(), ServiceError> {
        if !self.store.set_principal_active(principal_id, is_active).await? {
            return Err(ServiceError::NotFound("principal".to_string()));
        }
        tracing::info!(principal_id = %principal_id, is_active, "Principal activation changed");
        Ok(())
    }
}
