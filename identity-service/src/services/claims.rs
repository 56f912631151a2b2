//! Role claims: cache-aside resolution and assignment administration.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::{Permission, Role};
use crate::services::{CacheStore, IdentityStore, ServiceError};

pub const CLAIMS_CACHE_PREFIX: &str = "identity:role_claims:";

pub fn cache_key(role: &str) -> String {
    format!("{}{}", CLAIMS_CACHE_PREFIX, role)
}

/// Resolves a role's permission set through the cache, falling back to the
/// role-claim assignments in storage.
#[derive(Clone)]
pub struct ClaimsResolver {
    store: Arc<dyn IdentityStore>,
    cache: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl ClaimsResolver {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: Arc<dyn CacheStore>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            cache,
            ttl_seconds,
        }
    }

    /// A cache read failure is returned as `ServiceError::Cache`; callers
    /// making an authorization decision must treat it as deny.
    pub async fn get_claims(&self, role: &str) -> Result<BTreeSet<Permission>, ServiceError> {
        let key = cache_key(role);

        if let Some(cached) = self.cache.get(&key).await.map_err(ServiceError::Cache)? {
            match serde_json::from_str::<Vec<String>>(&cached) {
                Ok(identifiers) => return Ok(parse_claims(role, identifiers)),
                Err(e) => {
                    tracing::warn!(role = %role, error = %e, "Discarding unreadable claims cache entry");
                }
            }
        }

        let identifiers: Vec<String> = self
            .store
            .list_role_claims(role)
            .await?
            .into_iter()
            .map(|rc| rc.claim_code)
            .collect();
        let claims = parse_claims(role, identifiers);

        let encoded = serde_json::to_string(
            &claims.iter().map(Permission::as_str).collect::<Vec<_>>(),
        )
        .map_err(|e| ServiceError::Internal(e.into()))?;

        if let Err(e) = self.cache.set(&key, &encoded, self.ttl_seconds).await {
            tracing::warn!(role = %role, error = %e, "Failed to populate claims cache");
        }

        Ok(claims)
    }

    pub async fn has_claim(&self, role: &str, claim: Permission) -> Result<bool, ServiceError> {
        Ok(self.get_claims(role).await?.contains(&claim))
    }

    /// Drop the cached entry. Failures are logged; the entry then expires by TTL.
    pub async fn invalidate(&self, role: &str) {
        if let Err(e) = self.cache.delete(&cache_key(role)).await {
            tracing::warn!(
                role = %role,
                error = %e,
                ttl_seconds = self.ttl_seconds,
                "Failed to invalidate claims cache; entry may be stale until expiry"
            );
        }
    }
}

fn parse_claims(role: &str, identifiers: Vec<String>) -> BTreeSet<Permission> {
    identifiers
        .into_iter()
        .filter_map(|id| match id.parse::<Permission>() {
            Ok(permission) => Some(permission),
            Err(_) => {
                tracing::warn!(role = %role, claim = %id, "Skipping unknown claim identifier");
                None
            }
        })
        .collect()
}

/// Grants and revokes role-claim assignments, invalidating the cache after each change.
#[derive(Clone)]
pub struct RoleClaimAdmin {
    store: Arc<dyn IdentityStore>,
    resolver: ClaimsResolver,
}

impl RoleClaimAdmin {
    pub fn new(store: Arc<dyn IdentityStore>, resolver: ClaimsResolver) -> Self {
        Self { store, resolver }
    }

    pub async fn grant(&self, role: Role, claim: Permission) -> Result<bool, ServiceError> {
        let granted = self
            .store
            .grant_role_claim(role.as_str(), claim.as_str())
            .await?;
        self.resolver.invalidate(role.as_str()).await;
        if granted {
            tracing::info!(role = %role, claim = %claim, "Role claim granted");
        }
        Ok(granted)
    }

    pub async fn revoke(&self, role: Role, claim: Permission) -> Result<bool, ServiceError> {
        let revoked = self
            .store
            .revoke_role_claim(role.as_str(), claim.as_str())
            .await?;
        self.resolver.invalidate(role.as_str()).await;
        if revoked {
            tracing::info!(role = %role, claim = %claim, "Role claim revoked");
        }
        Ok(revoked)
    }

    /// Seed every role that has no assignments with its default claims.
    pub async fn seed_defaults(&self) -> Result<usize, ServiceError> {
        let mut seeded = 0;
        for role in Role::ALL {
            if !self.store.list_role_claims(role.as_str()).await?.is_empty() {
                continue;
            }
            for claim in role.default_claims() {
                if self
                    .store
                    .grant_role_claim(role.as_str(), claim.as_str())
                    .await?
                {
                    seeded += 1;
                }
            }
            self.resolver.invalidate(role.as_str()).await;
        }
        if seeded > 0 {
            tracing::info!(assignments = seeded, "Seeded default role claims");
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryIdentityStore, MockCache};
    use std::sync::atomic::Ordering;

    fn setup() -> (Arc<MemoryIdentityStore>, Arc<MockCache>, ClaimsResolver) {
        let store = Arc::new(MemoryIdentityStore::new());
        let cache = Arc::new(MockCache::new());
        let resolver = ClaimsResolver::new(store.clone(), cache.clone(), 3600);
        (store, cache, resolver)
    }

    #[tokio::test]
    async fn populates_cache_with_ttl_on_miss() {
        let (store, cache, resolver) = setup();
        store.grant_role_claim("staff", "patient_read").await.unwrap();

        let claims = resolver.get_claims("staff").await.unwrap();
        assert_eq!(claims, BTreeSet::from([Permission::PatientRead]));
        assert_eq!(cache.expiry_of(&cache_key("staff")), Some(3600));
    }

    #[tokio::test]
    async fn serves_from_cache_until_invalidated() {
        let (store, _cache, resolver) = setup();
        store.grant_role_claim("staff", "patient_read").await.unwrap();
        let first = resolver.get_claims("staff").await.unwrap();

        // Storage changes without invalidation stay invisible.
        store.grant_role_claim("staff", "inventory_read").await.unwrap();
        assert_eq!(resolver.get_claims("staff").await.unwrap(), first);

        resolver.invalidate("staff").await;
        assert!(resolver
            .get_claims("staff")
            .await
            .unwrap()
            .contains(&Permission::InventoryRead));
    }

    #[tokio::test]
    async fn unknown_identifiers_are_skipped() {
        let (store, _cache, resolver) = setup();
        store.grant_role_claim("staff", "patient_read").await.unwrap();
        store.grant_role_claim("staff", "launch_missiles").await.unwrap();

        let claims = resolver.get_claims("staff").await.unwrap();
        assert_eq!(claims.len(), 1);
    }

    #[tokio::test]
    async fn cache_read_failure_is_an_error() {
        let (_store, cache, resolver) = setup();
        cache.set_fail_reads(true);

        assert!(matches!(
            resolver.has_claim("admin", Permission::TenantRead).await,
            Err(ServiceError::Cache(_))
        ));
    }

    #[tokio::test]
    async fn cache_write_failure_still_returns_claims() {
        let (store, cache, resolver) = setup();
        store.grant_role_claim("staff", "patient_read").await.unwrap();
        cache.set_fail_writes(true);

        assert!(resolver
            .has_claim("staff", Permission::PatientRead)
            .await
            .unwrap());
        assert!(!cache.contains(&cache_key("staff")));
    }

    #[tokio::test]
    async fn admin_mutations_invalidate_even_when_cache_delete_fails() {
        let (store, cache, resolver) = setup();
        let admin = RoleClaimAdmin::new(store.clone(), resolver.clone());

        admin.grant(Role::Staff, Permission::PatientRead).await.unwrap();
        resolver.get_claims("staff").await.unwrap();
        assert!(cache.contains(&cache_key("staff")));

        admin.grant(Role::Staff, Permission::AuditRead).await.unwrap();
        assert!(!cache.contains(&cache_key("staff")));

        cache.set_fail_deletes(true);
        assert!(admin.revoke(Role::Staff, Permission::AuditRead).await.unwrap());
        assert!(store
            .list_role_claims("staff")
            .await
            .unwrap()
            .iter()
            .all(|rc| rc.claim_code != "audit_read"));
    }

    #[tokio::test]
    async fn seeds_defaults_once() {
        let (store, cache, resolver) = setup();
        let admin = RoleClaimAdmin::new(store.clone(), resolver.clone());

        let seeded = admin.seed_defaults().await.unwrap();
        let expected: usize = Role::ALL.iter().map(|r| r.default_claims().len()).sum();
        assert_eq!(seeded, expected);
        assert_eq!(admin.seed_defaults().await.unwrap(), 0);

        let reads_before = cache.reads.load(Ordering::SeqCst);
        assert!(resolver
            .has_claim("super_admin", Permission::TenantCreate)
            .await
            .unwrap());
        assert_eq!(cache.reads.load(Ordering::SeqCst), reads_before + 1);
    }
}
