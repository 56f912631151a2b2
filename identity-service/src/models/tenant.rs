//! Tenant model - audited organisational record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::audit::Auditable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Tenant {
    pub const ENTITY_TYPE: &'static str = "Tenant";

    pub fn new(tenant_name: String) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: Uuid::new_v4(),
            tenant_name,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }
}

impl Auditable for Tenant {
    fn entity_type(&self) -> &'static str {
        Self::ENTITY_TYPE
    }

    fn entity_id(&self) -> String {
        self.tenant_id.to_string()
    }

    fn audited_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        fields.insert("name".to_string(), self.tenant_name.clone().into());
        fields.insert("is_active".to_string(), self.is_active.into());
        fields
    }
}
