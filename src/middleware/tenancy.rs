// src/middleware/tenancy.rs

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use uuid::Uuid;

use crate::{common::error::ApiError, models::auth::User};

// O nome do nosso cabeçalho HTTP customizado
const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Tenant em que a requisição age. Só é aceito quando o usuário autenticado
/// pertence a ele (superusuários agem em qualquer tenant).
#[derive(Debug, Clone, Copy)]
pub struct TenantContext(pub Uuid);

fn bad_request(message: &str) -> ApiError {
    ApiError { status: StatusCode::BAD_REQUEST, message: message.to_string() }
}

pub fn resolve_tenant(headers: &HeaderMap, user: Option<&User>) -> Result<Uuid, ApiError> {
    let value = headers
        .get(TENANT_ID_HEADER)
        .ok_or_else(|| bad_request("O cabeçalho X-Tenant-ID é obrigatório."))?;

    let value_str = value
        .to_str()
        .map_err(|_| bad_request("Cabeçalho X-Tenant-ID contém caracteres inválidos."))?;

    let tenant_id = Uuid::parse_str(value_str)
        .map_err(|_| bad_request("Cabeçalho X-Tenant-ID inválido (não é um UUID)."))?;

    let user = user.ok_or(ApiError {
        status: StatusCode::UNAUTHORIZED,
        message: "Usuário não autenticado.".to_string(),
    })?;

    if !user.can_access_tenant(tenant_id) {
        tracing::warn!(user_id = %user.id, %tenant_id, "Usuário tentou agir em tenant alheio");
        return Err(ApiError {
            status: StatusCode::FORBIDDEN,
            message: "Usuário não pertence ao tenant informado.".to_string(),
        });
    }

    Ok(tenant_id)
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<User>();
        resolve_tenant(&parts.headers, user).map(TenantContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn user(tenant_id: Option<Uuid>, is_superuser: bool) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id,
            username: "op".into(),
            role_type: None,
            is_superuser,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn headers(tenant: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_str(tenant).unwrap());
        headers
    }

    #[test]
    fn own_tenant_is_accepted() {
        let tenant = Uuid::new_v4();
        let u = user(Some(tenant), false);
        assert_eq!(resolve_tenant(&headers(&tenant.to_string()), Some(&u)).unwrap(), tenant);
    }

    #[test]
    fn foreign_tenant_is_forbidden() {
        let u = user(Some(Uuid::new_v4()), false);
        let err = resolve_tenant(&headers(&Uuid::new_v4().to_string()), Some(&u)).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn superuser_may_pick_any_tenant() {
        let tenant = Uuid::new_v4();
        let u = user(None, true);
        assert_eq!(resolve_tenant(&headers(&tenant.to_string()), Some(&u)).unwrap(), tenant);
    }

    #[test]
    fn missing_or_malformed_header_is_bad_request() {
        let u = user(None, true);
        assert_eq!(resolve_tenant(&HeaderMap::new(), Some(&u)).unwrap_err().status, StatusCode::BAD_REQUEST);
        assert_eq!(resolve_tenant(&headers("abc"), Some(&u)).unwrap_err().status, StatusCode::BAD_REQUEST);
    }
}
