use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Global role to permission assignment, unique on (role, claim).
#[derive(Debug, Clone, FromRow)]
pub struct RoleClaim {
    pub role_code: String,
    pub claim_code: String,
    pub created_utc: DateTime<Utc>,
}
