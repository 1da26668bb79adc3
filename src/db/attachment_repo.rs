// src/db/attachment_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::attachment::{AttachmentType, ContractAttachment, ContractSignature, SignatureMethod, SignatureParty},
};

const ATTACHMENT_COLUMNS: &str = r#"
    id, tenant_id, contract_id, attachment_type, version_no, is_current,
    file_name, storage_key, file_size, content_hash, remark, uploaded_by, created_at
"#;

const SIGNATURE_COLUMNS: &str = r#"
    id, tenant_id, contract_id, attachment_id, party_type, signer_name,
    signer_id_no, sign_method, signed_at, evidence_hash, remark, created_by, created_at
"#;

// Dados de uma nova versão de anexo, já com o hash calculado
#[derive(Debug, Clone)]
pub struct NewAttachment<'a> {
    pub attachment_type: AttachmentType,
    pub version_no: i32,
    pub file_name: &'a str,
    pub storage_key: &'a str,
    pub file_size: i64,
    pub content_hash: &'a str,
    pub remark: Option<&'a str>,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewSignature<'a> {
    pub attachment_id: Option<Uuid>,
    pub party_type: SignatureParty,
    pub signer_name: &'a str,
    pub signer_id_no: Option<&'a str>,
    pub sign_method: SignatureMethod,
    pub signed_at: DateTime<Utc>,
    pub evidence_hash: Option<&'a str>,
    pub remark: Option<&'a str>,
    pub created_by: Uuid,
}

#[derive(Clone, Default)]
pub struct AttachmentRepository;

impl AttachmentRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  ANEXOS
    // =========================================================================

    /// Trava todas as versões de (contrato, tipo) e devolve a maior versão.
    pub async fn lock_versions<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        attachment_type: AttachmentType,
    ) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // FOR UPDATE não combina com agregação, então travamos as linhas e somamos no Rust
        let versions: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT version_no FROM contract_attachments
            WHERE contract_id = $1 AND attachment_type = $2
            FOR UPDATE
            "#,
        )
        .bind(contract_id)
        .bind(attachment_type)
        .fetch_all(executor)
        .await?;

        Ok(versions.into_iter().max())
    }

    pub async fn clear_current<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        attachment_type: AttachmentType,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE contract_attachments SET is_current = FALSE
            WHERE contract_id = $1 AND attachment_type = $2 AND is_current
            "#,
        )
        .bind(contract_id)
        .bind(attachment_type)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn insert_attachment<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        contract_id: Uuid,
        attachment: &NewAttachment<'_>,
    ) -> Result<ContractAttachment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO contract_attachments (
                tenant_id, contract_id, attachment_type, version_no, is_current,
                file_name, storage_key, file_size, content_hash, remark, uploaded_by
            )
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ContractAttachment>(&sql)
            .bind(tenant_id)
            .bind(contract_id)
            .bind(attachment.attachment_type)
            .bind(attachment.version_no)
            .bind(attachment.file_name)
            .bind(attachment.storage_key)
            .bind(attachment.file_size)
            .bind(attachment.content_hash)
            .bind(attachment.remark)
            .bind(attachment.uploaded_by)
            .fetch_one(executor)
            .await?;

        Ok(row)
    }

    pub async fn find_attachment<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<ContractAttachment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {} FROM contract_attachments WHERE id = $1", ATTACHMENT_COLUMNS);
        let row = sqlx::query_as::<_, ContractAttachment>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row)
    }

    pub async fn list_attachments<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ContractAttachment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {} FROM contract_attachments
            WHERE contract_id = $1
            ORDER BY attachment_type, version_no DESC
            "#,
            ATTACHMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ContractAttachment>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;

        Ok(rows)
    }

    // =========================================================================
    //  ASSINATURAS (somente inserção)
    // =========================================================================

    pub async fn insert_signature<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        contract_id: Uuid,
        signature: &NewSignature<'_>,
    ) -> Result<ContractSignature, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO contract_signatures (
                tenant_id, contract_id, attachment_id, party_type, signer_name,
                signer_id_no, sign_method, signed_at, evidence_hash, remark, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            SIGNATURE_COLUMNS
        );
        let row = sqlx::query_as::<_, ContractSignature>(&sql)
            .bind(tenant_id)
            .bind(contract_id)
            .bind(signature.attachment_id)
            .bind(signature.party_type)
            .bind(signature.signer_name)
            .bind(signature.signer_id_no)
            .bind(signature.sign_method)
            .bind(signature.signed_at)
            .bind(signature.evidence_hash)
            .bind(signature.remark)
            .bind(signature.created_by)
            .fetch_one(executor)
            .await?;

        Ok(row)
    }

    pub async fn list_signatures<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ContractSignature>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM contract_signatures WHERE contract_id = $1 ORDER BY signed_at, created_at",
            SIGNATURE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ContractSignature>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;

        Ok(rows)
    }
}
