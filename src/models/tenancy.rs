// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::audit::Auditable;

// ---
// 1. Tenant (a fronteira de isolamento)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Código usado no número do contrato (maiúsculo, "DEFAULT" se vazio).
    pub fn contract_code(&self) -> String {
        let code = self.code.trim();
        if code.is_empty() {
            "DEFAULT".to_string()
        } else {
            code.to_uppercase()
        }
    }
}

// ---
// 2. Shop (a unidade locável)
// ---
// Somente leitura para este núcleo: usada para checagem de tenant e exclusão lógica.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auditable for Shop {
    const OBJECT_TYPE: &'static str = "shop";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "code": self.code,
            "is_deleted": self.is_deleted,
        })
    }
}
