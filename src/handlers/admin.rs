// src/handlers/admin.rs

use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    services::sequence_service::BackfillReport,
};

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillPayload {
    /// Restringe a um tenant; ausente numera todos
    #[schema(example = "WF")]
    pub tenant_code: Option<String>,
    /// Sem `false` explícito nada é gravado
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[validate(range(min = 1, max = 10000, message = "O limite deve estar entre 1 e 10000"))]
    pub limit: Option<i64>,
}

// POST /api/admin/contract-numbers/backfill
#[utoipa::path(
    post,
    path = "/api/admin/contract-numbers/backfill",
    tag = "Administração",
    request_body = BackfillPayload,
    responses(
        (status = 200, description = "Resultado da numeração", body = BackfillReport),
        (status = 403, description = "Somente superusuários"),
        (status = 404, description = "Tenant não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn backfill_contract_numbers(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<BackfillPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_superuser {
        return Err(AppError::Forbidden("somente superusuários podem numerar contratos legados".into()));
    }
    payload.validate()?;

    tracing::info!(user_id = %user.id, tenant_code = ?payload.tenant_code, dry_run = payload.dry_run, "Numeração de contratos legados solicitada");

    let report = app_state
        .sequence_service
        .backfill_missing(payload.tenant_code.as_deref(), payload.dry_run, payload.limit)
        .await?;

    Ok(Json(report))
}
