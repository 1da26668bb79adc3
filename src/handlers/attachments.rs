// src/handlers/attachments.rs

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
    models::attachment::{AttachmentType, ContractAttachment, ContractSignature},
    services::attachment_service::{AttachmentUpload, SignatureRequest},
};

// Metadados do upload; o corpo da requisição é o próprio arquivo
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// CONTRACT_SCAN, SIGNED_COPY, SUPPLEMENT ou OTHER
    pub attachment_type: String,
    #[validate(length(max = 255, message = "O nome do arquivo deve ter no máximo 255 caracteres"))]
    pub file_name: String,
    #[validate(length(max = 512, message = "A chave de armazenamento deve ter no máximo 512 caracteres"))]
    pub storage_key: Option<String>,
    #[validate(length(max = 500, message = "A observação deve ter no máximo 500 caracteres"))]
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    #[schema(example = "LESSEE")]
    pub party_type: String,
    #[validate(length(max = 128, message = "O nome deve ter no máximo 128 caracteres"))]
    #[schema(example = "Maria Souza")]
    pub signer_name: String,
    #[validate(length(max = 64, message = "O documento deve ter no máximo 64 caracteres"))]
    pub signer_id_no: Option<String>,
    #[schema(example = "ELECTRONIC")]
    pub sign_method: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub attachment_id: Option<Uuid>,
    pub evidence_hash: Option<String>,
    #[validate(length(max = 500, message = "A observação deve ter no máximo 500 caracteres"))]
    pub remark: Option<String>,
}

impl From<SignaturePayload> for SignatureRequest {
    fn from(p: SignaturePayload) -> Self {
        SignatureRequest {
            party_type: p.party_type,
            signer_name: p.signer_name,
            signer_id_no: p.signer_id_no,
            sign_method: p.sign_method,
            signed_at: p.signed_at,
            attachment_id: p.attachment_id,
            evidence_hash: p.evidence_hash,
            remark: p.remark,
        }
    }
}

// POST /api/contracts/{id}/attachments
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/attachments",
    tag = "Anexos",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Nova versão do anexo registrada", body = ContractAttachment),
        (status = 400, description = "Tipo inválido, nome ausente ou arquivo vazio")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        UploadQuery,
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn upload_attachment(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;

    let upload = AttachmentUpload {
        attachment_type: query.attachment_type.parse::<AttachmentType>()?,
        file_name: query.file_name,
        storage_key: query.storage_key,
        remark: query.remark,
    };

    let attachment = app_state
        .attachment_service
        .add_attachment(contract_id, upload, body.into_data_stream(), tenant.0, user.id)
        .await?;

    Ok((StatusCode::CREATED, Json(attachment)))
}

// GET /api/contracts/{id}/attachments
#[utoipa::path(
    get,
    path = "/api/contracts/{id}/attachments",
    tag = "Anexos",
    responses(
        (status = 200, description = "Todas as versões dos anexos", body = Vec<ContractAttachment>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_attachments(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attachments = app_state
        .attachment_service
        .list_attachments(contract_id, tenant.0, user.id)
        .await?;
    Ok(Json(attachments))
}

// POST /api/contracts/{id}/signatures
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/signatures",
    tag = "Anexos",
    request_body = SignaturePayload,
    responses(
        (status = 201, description = "Assinatura registrada", body = ContractSignature),
        (status = 400, description = "Parte, método, hash ou anexo inválidos")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_signature(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<SignaturePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let signature = app_state
        .attachment_service
        .add_signature(contract_id, payload.into(), tenant.0, user.id)
        .await?;

    Ok((StatusCode::CREATED, Json(signature)))
}

// GET /api/contracts/{id}/signatures
#[utoipa::path(
    get,
    path = "/api/contracts/{id}/signatures",
    tag = "Anexos",
    responses(
        (status = 200, description = "Assinaturas do contrato", body = Vec<ContractSignature>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_signatures(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    tenant: TenantContext,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let signatures = app_state
        .attachment_service
        .list_signatures(contract_id, tenant.0, user.id)
        .await?;
    Ok(Json(signatures))
}
