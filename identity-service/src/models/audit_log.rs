use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// Append-only record of one tracked mutation.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub audit_id: Uuid,
    pub principal_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        principal_id: Uuid,
        action: AuditAction,
        entity_type: &str,
        entity_id: String,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            principal_id,
            action: action.as_str().to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            old_values,
            new_values,
            ip_address,
            user_agent,
            created_utc: Utc::now(),
        }
    }
}
