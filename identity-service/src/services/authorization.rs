use crate::models::Permission;
use crate::services::{ClaimsResolver, PrincipalContext, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No authenticated principal.
    Unauthenticated,
    /// Authenticated, but the role lacks the permission or it could not be
    /// established.
    Forbidden,
}

/// Request-time allow/deny over the caller's role claims.
#[derive(Clone)]
pub struct AuthorizationGate {
    resolver: ClaimsResolver,
}

impl AuthorizationGate {
    pub fn new(resolver: ClaimsResolver) -> Self {
        Self { resolver }
    }

    pub async fn check(&self, principal: Option<&PrincipalContext>, required: Permission) -> Decision {
        let Some(principal) = principal else {
            return Decision::Unauthenticated;
        };

        match self.resolver.has_claim(&principal.role, required).await {
            Ok(true) => Decision::Allow,
            Ok(false) => {
                tracing::info!(
                    principal_id = %principal.principal_id,
                    role = %principal.role,
                    required = %required,
                    "Authorization denied"
                );
                Decision::Forbidden
            }
            Err(e) => {
                tracing::error!(
                    principal_id = %principal.principal_id,
                    role = %principal.role,
                    required = %required,
                    error = %e,
                    "Claims lookup failed; denying"
                );
                Decision::Forbidden
            }
        }
    }

    /// `check` mapped onto the error taxonomy.
    pub async fn require(
        &self,
        principal: Option<&PrincipalContext>,
        required: Permission,
    ) -> Result<(), ServiceError> {
        match self.check(principal, required).await {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(ServiceError::Unauthorized),
            Decision::Forbidden => Err(ServiceError::Forbidden(format!(
                "missing permission {}",
                required
            ))),
        }
    }
}
