// src/handlers/audit.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
    models::audit::ContractAuditReport,
};

// GET /api/audit/contracts/{id}/verify
#[utoipa::path(
    get,
    path = "/api/audit/contracts/{id}/verify",
    tag = "Auditoria",
    responses(
        (status = 200, description = "Integridade da cadeia de hashes e das ações exigidas", body = ContractAuditReport),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn verify_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state
        .contract_service
        .audit_report(contract_id, tenant.0, user.id)
        .await?;

    Ok(Json(report))
}
