// src/models/auth.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Usuário lido do banco (a gestão de usuários é externa a este núcleo)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub username: String,
    // Papel usado no roteamento de aprovação (ex: OPERATION, MANAGEMENT)
    pub role_type: Option<String>,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Superusuários podem agir em qualquer tenant; os demais só no próprio.
    pub fn can_access_tenant(&self, tenant_id: Uuid) -> bool {
        self.is_superuser || self.tenant_id == Some(tenant_id)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role_type.as_deref() == Some(role)
    }
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário)
    pub exp: usize, // Expiration time
    pub iat: usize, // Issued At
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(tenant_id: Option<Uuid>, superuser: bool) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id,
            username: "op".into(),
            role_type: Some("OPERATION".into()),
            is_superuser: superuser,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn regular_user_only_reaches_own_tenant() {
        let tenant = Uuid::new_v4();
        let u = user(Some(tenant), false);
        assert!(u.can_access_tenant(tenant));
        assert!(!u.can_access_tenant(Uuid::new_v4()));
    }

    #[test]
    fn superuser_reaches_any_tenant() {
        assert!(user(None, true).can_access_tenant(Uuid::new_v4()));
    }

    #[test]
    fn role_match_is_exact() {
        let u = user(None, false);
        assert!(u.has_role("OPERATION"));
        assert!(!u.has_role("operation"));
    }
}
