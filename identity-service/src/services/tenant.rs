use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditLog, Permission, Tenant};
use crate::services::audit::{AuditRecorder, ChangeSet};
use crate::services::{AuthorizationGate, IdentityStore, PrincipalContext, RequestContext, ServiceError};

/// Tenant record management. Every operation is gated on the caller's role
/// claims and every mutation is audited.
#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn IdentityStore>,
    gate: AuthorizationGate,
    audit: AuditRecorder,
}

impl TenantService {
    pub fn new(store: Arc<dyn IdentityStore>, gate: AuthorizationGate, audit: AuditRecorder) -> Self {
        Self { store, gate, audit }
    }

    /// Gate the ambient caller; tenant-scoped callers only reach their own tenant.
    async fn authorize(
        &self,
        required: Permission,
        tenant_id: Option<Uuid>,
    ) -> Result<PrincipalContext, ServiceError> {
        let caller = RequestContext::current();
        self.gate.require(caller.as_ref(), required).await?;
        let caller = caller.ok_or(ServiceError::Unauthorized)?;

        if let (Some(scope), Some(target)) = (caller.tenant_id, tenant_id) {
            if scope != target {
                return Err(ServiceError::Forbidden(
                    "tenant is outside the caller's scope".to_string(),
                ));
            }
        }
        Ok(caller)
    }

    async fn load(&self, tenant_id: Uuid) -> Result<Tenant, ServiceError> {
        self.store
            .find_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("tenant".to_string()))
    }

    pub async fn create(&self, name: &str) -> Result<Tenant, ServiceError> {
        let caller = self.authorize(Permission::TenantCreate, None).await?;
        let tenant = Tenant::new(validate_name(name)?);

        let changes = ChangeSet::new().added(&tenant);
        self.audit
            .commit(changes, self.store.insert_tenant(&tenant))
            .await?;

        tracing::info!(tenant_id = %tenant.tenant_id, principal_id = %caller.principal_id, "Tenant created");
        Ok(tenant)
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<Tenant, ServiceError> {
        self.authorize(Permission::TenantRead, Some(tenant_id)).await?;
        self.load(tenant_id).await
    }

    pub async fn rename(&self, tenant_id: Uuid, name: &str) -> Result<Tenant, ServiceError> {
        self.authorize(Permission::TenantUpdate, Some(tenant_id)).await?;
        let name = validate_name(name)?;
        let before = self.load(tenant_id).await?;

        let mut after = before.clone();
        after.tenant_name = name;
        after.updated_utc = Utc::now();

        self.update(before, after).await
    }

    pub async fn set_active(&self, tenant_id: Uuid, is_active: bool) -> Result<Tenant, ServiceError> {
        self.authorize(Permission::TenantUpdate, Some(tenant_id)).await?;
        let before = self.load(tenant_id).await?;

        let mut after = before.clone();
        after.is_active = is_active;
        after.updated_utc = Utc::now();

        self.update(before, after).await
    }

    /// Write `after` only if the row still matches `before`, so the audited
    /// snapshot is exactly what was overwritten.
    async fn update(&self, before: Tenant, after: Tenant) -> Result<Tenant, ServiceError> {
        let changes = ChangeSet::new().modified(&before, &after);
        let store = self.store.clone();
        let updated = after.clone();
        self.audit
            .commit(changes, async move {
                if store.update_tenant(&updated, before.updated_utc).await? {
                    return Ok(());
                }
                match store.find_tenant_by_id(updated.tenant_id).await? {
                    Some(_) => {
                        tracing::warn!(tenant_id = %updated.tenant_id, "Concurrent tenant update rejected");
                        Err(ServiceError::Conflict(
                            "tenant was modified concurrently".to_string(),
                        ))
                    }
                    None => Err(ServiceError::NotFound("tenant".to_string())),
                }
            })
            .await?;
        Ok(after)
    }

    pub async fn delete(&self, tenant_id: Uuid) -> Result<(), ServiceError> {
        self.authorize(Permission::TenantDelete, Some(tenant_id)).await?;
        let tenant = self.load(tenant_id).await?;

        let changes = ChangeSet::new().deleted(&tenant);
        let store = self.store.clone();
        self.audit
            .commit(changes, async move {
                if store.delete_tenant(tenant_id).await? {
                    Ok(())
                } else {
                    Err(ServiceError::NotFound("tenant".to_string()))
                }
            })
            .await?;

        tracing::info!(tenant_id = %tenant_id, "Tenant deleted");
        Ok(())
    }

    /// Audit trail of one tenant.
    pub async fn history(&self, tenant_id: Uuid) -> Result<Vec<AuditLog>, ServiceError> {
        self.authorize(Permission::AuditRead, Some(tenant_id)).await?;
        self.store
            .list_audit_logs(Tenant::ENTITY_TYPE, &tenant_id.to_string())
            .await
    }
}

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(ServiceError::ValidationFailed(
            "tenant name must be 1 to 200 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ClaimsResolver, DisabledCache, MemoryIdentityStore};
    use chrono::Duration;

    fn service(store: Arc<MemoryIdentityStore>) -> TenantService {
        let store: Arc<dyn IdentityStore> = store;
        let claims = ClaimsResolver::new(store.clone(), Arc::new(DisabledCache), 3600);
        TenantService::new(
            store.clone(),
            AuthorizationGate::new(claims),
            AuditRecorder::new(store),
        )
    }

    #[tokio::test]
    async fn stale_update_is_rejected_and_keeps_concurrent_change() {
        let store = Arc::new(MemoryIdentityStore::new());
        let tenants = service(store.clone());
        let loaded = Tenant::new("A".to_string());
        store.insert_tenant(&loaded).await.unwrap();

        // Another writer deactivates the tenant after `loaded` was read.
        let mut deactivated = loaded.clone();
        deactivated.is_active = false;
        deactivated.updated_utc = loaded.updated_utc + Duration::seconds(1);
        assert!(store.update_tenant(&deactivated, loaded.updated_utc).await.unwrap());

        let mut renamed = loaded.clone();
        renamed.tenant_name = "B".to_string();
        renamed.updated_utc = loaded.updated_utc + Duration::seconds(2);

        assert!(matches!(
            tenants.update(loaded.clone(), renamed).await,
            Err(ServiceError::Conflict(_))
        ));

        let stored = store.find_tenant_by_id(loaded.tenant_id).await.unwrap().unwrap();
        assert_eq!(stored.tenant_name, "A");
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn update_of_missing_tenant_is_not_found() {
        let store = Arc::new(MemoryIdentityStore::new());
        let tenants = service(store);
        let ghost = Tenant::new("Ghost".to_string());
        let mut renamed = ghost.clone();
        renamed.tenant_name = "Still ghost".to_string();

        assert!(matches!(
            tenants.update(ghost, renamed).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
