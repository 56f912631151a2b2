//! Principal model - an authenticated identity scoped to zero or one tenant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::{PasswordHistory, Role};

#[derive(Debug, Clone, FromRow)]
pub struct Principal {
    pub principal_id: Uuid,
    /// `None` for platform-level administrators.
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub role_code: String,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_login_utc: Option<DateTime<Utc>>,
    #[sqlx(try_from = "Vec<String>")]
    pub password_history: PasswordHistory,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Principal {
    pub fn new(
        tenant_id: Option<Uuid>,
        email: String,
        display_name: Option<String>,
        password_hash: String,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            principal_id: Uuid::new_v4(),
            tenant_id,
            email,
            display_name,
            password_hash,
            role_code: role.as_str().to_string(),
            is_active: true,
            failed_login_attempts: 0,
            lockout_until: None,
            last_login_utc: None,
            password_history: PasswordHistory::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Lockout in effect at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| until > now)
    }

    pub fn role(&self) -> Option<Role> {
        self.role_code.parse().ok()
    }

    pub fn sanitized(&self) -> PrincipalResponse {
        PrincipalResponse::from(self)
    }
}

/// Principal without credential material.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalResponse {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.principal_id,
            tenant_id: p.tenant_id,
            email: p.email.clone(),
            display_name: p.display_name.clone(),
            role: p.role_code.clone(),
            is_active: p.is_active,
            last_login_utc: p.last_login_utc,
        }
    }
}
