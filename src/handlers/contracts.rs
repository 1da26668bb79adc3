// src/handlers/contracts.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
    models::{
        approval::ApprovalTask,
        contract::{Contract, ContractItem, ContractTerms, PaymentCycle},
    },
};

// =============================================================================
//  PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractTermsPayload {
    #[schema(example = "2025-01-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-12-31")]
    pub end_date: NaiveDate,
    #[schema(example = "10000.00")]
    pub monthly_rent: Decimal,
    #[schema(example = "20000.00")]
    pub deposit: Decimal,
    #[schema(example = "MONTHLY")]
    pub payment_cycle: PaymentCycle,
}

impl From<&ContractTermsPayload> for ContractTerms {
    fn from(p: &ContractTermsPayload) -> Self {
        ContractTerms {
            start_date: p.start_date,
            end_date: p.end_date,
            monthly_rent: p.monthly_rent,
            deposit: p.deposit,
            payment_cycle: p.payment_cycle,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractPayload {
    pub shop_id: Uuid,
    #[serde(flatten)]
    pub terms: ContractTermsPayload,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovePayload {
    #[validate(length(max = 1000, message = "O comentário deve ter no máximo 1000 caracteres"))]
    pub comment: Option<String>,
}

// O motivo vazio é recusado pelo serviço, que registra a tentativa
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectPayload {
    #[serde(default)]
    #[validate(length(max = 1000, message = "O motivo deve ter no máximo 1000 caracteres"))]
    #[schema(example = "Aluguel abaixo da tabela")]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminatePayload {
    #[validate(length(max = 1000, message = "O motivo deve ter no máximo 1000 caracteres"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewPayload {
    #[schema(example = "2026-12-31")]
    pub new_end_date: NaiveDate,
}

// =============================================================================
//  RASCUNHO
// =============================================================================

// POST /api/contracts
#[utoipa::path(
    post,
    path = "/api/contracts",
    tag = "Contratos",
    request_body = CreateContractPayload,
    responses(
        (status = 201, description = "Rascunho criado", body = Contract),
        (status = 400, description = "Datas ou valores inválidos"),
        (status = 404, description = "Loja não encontrada no tenant")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<CreateContractPayload>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state
        .contract_service
        .create_draft(payload.shop_id, ContractTerms::from(&payload.terms), tenant.0, user.id)
        .await?;

    Ok((StatusCode::CREATED, Json(contract)))
}

// GET /api/contracts/{id}
#[utoipa::path(
    get,
    path = "/api/contracts/{id}",
    tag = "Contratos",
    responses(
        (status = 200, description = "Contrato", body = Contract),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contract_service.get(contract_id, tenant.0, user.id).await?;
    Ok(Json(contract))
}

// PUT /api/contracts/{id}
#[utoipa::path(
    put,
    path = "/api/contracts/{id}",
    tag = "Contratos",
    request_body = ContractTermsPayload,
    responses(
        (status = 200, description = "Rascunho atualizado", body = Contract),
        (status = 400, description = "Datas ou valores inválidos"),
        (status = 409, description = "Contrato não está em rascunho")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<ContractTermsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state
        .contract_service
        .update_draft(contract_id, ContractTerms::from(&payload), tenant.0, user.id)
        .await?;

    Ok(Json(contract))
}

// GET /api/contracts/{id}/items
#[utoipa::path(
    get,
    path = "/api/contracts/{id}/items",
    tag = "Contratos",
    responses(
        (status = 200, description = "Itens do contrato", body = Vec<ContractItem>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_items(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let items = app_state.contract_service.list_items(contract_id, tenant.0, user.id).await?;
    Ok(Json(items))
}

// =============================================================================
//  REVISÃO E APROVAÇÃO
// =============================================================================

// POST /api/contracts/{id}/submit
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/submit",
    tag = "Aprovação",
    responses(
        (status = 200, description = "Enviado para revisão, rodada aberta", body = Contract),
        (status = 400, description = "Contrato incompleto ou fluxo não configurado"),
        (status = 409, description = "Estado não permite envio")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn submit_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state
        .contract_service
        .submit_for_review(contract_id, tenant.0, user.id)
        .await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/approve
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/approve",
    tag = "Aprovação",
    request_body = ApprovePayload,
    responses(
        (status = 200, description = "Tarefa aprovada (contrato aprovado se era a última)", body = Contract),
        (status = 404, description = "Nenhuma tarefa pendente"),
        (status = 409, description = "Papel ou responsável não confere")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn approve_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<ApprovePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let contract = app_state
        .approval_service
        .approve(contract_id, user.id, payload.comment.as_deref(), tenant.0)
        .await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/reject
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/reject",
    tag = "Aprovação",
    request_body = RejectPayload,
    responses(
        (status = 200, description = "Contrato rejeitado", body = Contract),
        (status = 400, description = "Motivo vazio"),
        (status = 404, description = "Nenhuma tarefa pendente"),
        (status = 409, description = "Papel ou responsável não confere")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let contract = app_state
        .approval_service
        .reject(contract_id, user.id, &payload.reason, tenant.0)
        .await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/revise
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/revise",
    tag = "Aprovação",
    responses(
        (status = 200, description = "Contrato rejeitado volta a rascunho", body = Contract),
        (status = 409, description = "Contrato não está rejeitado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn revise_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contract_service.revise(contract_id, tenant.0, user.id).await?;
    Ok(Json(contract))
}

// GET /api/contracts/{id}/approval-tasks
#[utoipa::path(
    get,
    path = "/api/contracts/{id}/approval-tasks",
    tag = "Aprovação",
    responses(
        (status = 200, description = "Tarefas de todas as rodadas", body = Vec<ApprovalTask>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_approval_tasks(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tasks = app_state.approval_service.list_tasks(contract_id, tenant.0, user.id).await?;
    Ok(Json(tasks))
}

// =============================================================================
//  CICLO DE VIDA
// =============================================================================

// POST /api/contracts/{id}/activate
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/activate",
    tag = "Contratos",
    responses(
        (status = 200, description = "Contrato ativado", body = Contract),
        (status = 409, description = "Estado, vencimento ou sobreposição impedem a ativação")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn activate_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contract_service.activate(contract_id, tenant.0, user.id).await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/terminate
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/terminate",
    tag = "Contratos",
    request_body = TerminatePayload,
    responses(
        (status = 200, description = "Contrato encerrado", body = Contract),
        (status = 409, description = "Contrato não está ativo")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn terminate_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    payload: Option<Json<TerminatePayload>>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate()?;

    let contract = app_state
        .contract_service
        .terminate(contract_id, payload.reason.as_deref(), tenant.0, user.id)
        .await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/expire
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/expire",
    tag = "Contratos",
    responses(
        (status = 200, description = "Contrato marcado como vencido", body = Contract),
        (status = 409, description = "Contrato não está ativo ou ainda não venceu")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn expire_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contract_service.expire(contract_id, tenant.0, user.id).await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/archive
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/archive",
    tag = "Contratos",
    responses(
        (status = 200, description = "Contrato arquivado", body = Contract),
        (status = 409, description = "Contrato não finalizado ou já arquivado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn archive_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contract_service.archive(contract_id, tenant.0, user.id).await?;
    Ok(Json(contract))
}

// POST /api/contracts/{id}/renew
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/renew",
    tag = "Contratos",
    request_body = RenewPayload,
    responses(
        (status = 201, description = "Rascunho de renovação criado", body = Contract),
        (status = 400, description = "Nova data de término inválida"),
        (status = 409, description = "Contrato não está ativo")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn renew_contract(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<RenewPayload>,
) -> Result<impl IntoResponse, AppError> {
    let renewal = app_state
        .contract_service
        .renew(contract_id, payload.new_end_date, tenant.0, user.id)
        .await?;
    Ok((StatusCode::CREATED, Json(renewal)))
}
