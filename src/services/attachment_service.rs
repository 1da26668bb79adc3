// src/services/attachment_service.rs

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_transaction, error::AppError},
    db::{
        attachment_repo::{NewAttachment, NewSignature},
        AttachmentRepository,
    },
    models::{
        attachment::{
            is_sha256_hex, AttachmentType, ContractAttachment, ContractSignature, SignatureMethod, SignatureParty,
        },
        audit::AuditEntry,
    },
    services::{audit_service::{AuditService, CONTRACT_MODULE}, tenant_guard::TenantGuard},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDigest {
    pub content_hash: String,
    pub file_size: i64,
}

/// Consome o stream inteiro calculando o SHA-256. Stream vazio é rejeitado.
pub async fn hash_stream<S, B, E>(mut stream: S) -> Result<StreamDigest, AppError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut hasher = Sha256::new();
    let mut file_size: i64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            AppError::validation(
                "ATTACHMENT_READ_FAILED",
                "Falha ao ler o conteúdo do anexo",
                json!({ "reason": e.to_string() }),
            )
        })?;
        let bytes = chunk.as_ref();
        hasher.update(bytes);
        file_size += bytes.len() as i64;
    }

    if file_size == 0 {
        return Err(AppError::validation("EMPTY_ATTACHMENT", "O anexo está vazio", json!({})));
    }

    Ok(StreamDigest { content_hash: hex::encode(hasher.finalize()), file_size })
}

/// Chave de armazenamento padrão quando o chamador não informa uma.
pub fn default_storage_key(contract_id: Uuid, attachment_type: AttachmentType, content_hash: &str) -> String {
    let kind = serde_json::to_value(attachment_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_lowercase))
        .unwrap_or_else(|| "other".to_string());
    format!("contracts/{}/{}/{}", contract_id, kind, content_hash)
}

// Metadados do upload; o conteúdo chega à parte, como stream
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub attachment_type: AttachmentType,
    pub file_name: String,
    pub storage_key: Option<String>,
    pub remark: Option<String>,
}

// Pedido de assinatura como chega da borda: enums ainda em texto
#[derive(Debug, Clone, Default)]
pub struct SignatureRequest {
    pub party_type: String,
    pub signer_name: String,
    pub signer_id_no: Option<String>,
    pub sign_method: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub attachment_id: Option<Uuid>,
    pub evidence_hash: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidSignature {
    pub party_type: SignatureParty,
    pub sign_method: SignatureMethod,
    pub signer_name: String,
    pub evidence_hash: Option<String>,
}

pub fn validate_signature(request: &SignatureRequest) -> Result<ValidSignature, AppError> {
    let party_type: SignatureParty = request.party_type.parse()?;
    let sign_method: SignatureMethod = request.sign_method.parse()?;

    let signer_name = request.signer_name.trim();
    if signer_name.is_empty() {
        return Err(AppError::validation(
            "SIGNER_NAME_REQUIRED",
            "O nome do signatário é obrigatório",
            json!({ "field": "signer_name" }),
        ));
    }

    let evidence_hash = match request.evidence_hash.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(hash) if is_sha256_hex(hash) => Some(hash.to_lowercase()),
        Some(hash) => {
            return Err(AppError::validation(
                "SIGNATURE_HASH_INVALID",
                "O hash de evidência deve ter 64 caracteres hexadecimais",
                json!({ "field": "evidence_hash", "value": hash }),
            ));
        }
        None => None,
    };

    Ok(ValidSignature { party_type, sign_method, signer_name: signer_name.to_string(), evidence_hash })
}

/// O anexo referenciado precisa ser do mesmo contrato; sem hash explícito,
/// a evidência é o hash do próprio anexo.
pub fn resolve_evidence(
    contract_id: Uuid,
    explicit: Option<String>,
    attachment: Option<&ContractAttachment>,
) -> Result<Option<String>, AppError> {
    if let Some(attachment) = attachment {
        if attachment.contract_id != contract_id {
            return Err(AppError::validation(
                "SIGNATURE_ATTACHMENT_MISMATCH",
                "O anexo informado pertence a outro contrato",
                json!({
                    "contract_id": contract_id.to_string(),
                    "attachment_id": attachment.id.to_string(),
                }),
            ));
        }
    }
    Ok(explicit.or_else(|| attachment.map(|a| a.content_hash.clone())))
}

#[derive(Clone)]
pub struct AttachmentService {
    pool: PgPool,
    lock_timeout_ms: u64,
    attachment_repo: AttachmentRepository,
    audit: AuditService,
    guard: TenantGuard,
}

impl AttachmentService {
    pub fn new(
        pool: PgPool,
        lock_timeout_ms: u64,
        attachment_repo: AttachmentRepository,
        audit: AuditService,
        guard: TenantGuard,
    ) -> Self {
        Self { pool, lock_timeout_ms, attachment_repo, audit, guard }
    }

    /// Registra uma nova versão do anexo. O tenant é conferido antes de ler o
    /// corpo, e o hash é calculado fora da transação para não segurar locks
    /// durante o upload.
    pub async fn add_attachment<S, B, E>(
        &self,
        contract_id: Uuid,
        upload: AttachmentUpload,
        content: S,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ContractAttachment, AppError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        self.audit
            .settle(self.add_attachment_inner(contract_id, upload, content, tenant_id, actor_id))
            .await
    }

    async fn add_attachment_inner<S, B, E>(
        &self,
        contract_id: Uuid,
        upload: AttachmentUpload,
        content: S,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ContractAttachment, AppError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return Err(AppError::validation(
                "FILE_NAME_REQUIRED",
                "O nome do arquivo é obrigatório",
                json!({ "field": "file_name" }),
            ));
        }

        // Conferência sem lock antes de ler o corpo; a conexão volta ao pool em seguida
        {
            let mut conn = self.pool.acquire().await?;
            self.guard
                .load_contract(&mut conn, contract_id, tenant_id, actor_id, "upload_contract_attachment")
                .await?;
        }

        let digest = hash_stream(content).await?;

        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "upload_contract_attachment")
            .await?;

        let latest = self
            .attachment_repo
            .lock_versions(&mut *tx, contract.id, upload.attachment_type)
            .await?;
        self.attachment_repo
            .clear_current(&mut *tx, contract.id, upload.attachment_type)
            .await?;

        let storage_key = upload
            .storage_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| default_storage_key(contract.id, upload.attachment_type, &digest.content_hash));

        let attachment = self
            .attachment_repo
            .insert_attachment(
                &mut *tx,
                contract.tenant_id,
                contract.id,
                &NewAttachment {
                    attachment_type: upload.attachment_type,
                    version_no: latest.unwrap_or(0) + 1,
                    file_name,
                    storage_key: &storage_key,
                    file_size: digest.file_size,
                    content_hash: &digest.content_hash,
                    remark: upload.remark.as_deref(),
                    uploaded_by: actor_id,
                },
            )
            .await?;

        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("upload_contract_attachment", CONTRACT_MODULE, &attachment)
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            %contract_id,
            attachment_id = %attachment.id,
            version_no = attachment.version_no,
            size = attachment.file_size,
            "Anexo de contrato registrado"
        );
        Ok(attachment)
    }

    pub async fn add_signature(
        &self,
        contract_id: Uuid,
        request: SignatureRequest,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ContractSignature, AppError> {
        self.audit
            .settle(self.add_signature_inner(contract_id, request, tenant_id, actor_id))
            .await
    }

    async fn add_signature_inner(
        &self,
        contract_id: Uuid,
        request: SignatureRequest,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ContractSignature, AppError> {
        let valid = validate_signature(&request)?;

        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "create_contract_signature")
            .await?;

        let attachment = match request.attachment_id {
            Some(id) => Some(
                self.attachment_repo
                    .find_attachment(&mut *tx, id)
                    .await?
                    .ok_or_else(|| AppError::resource_not_found("contract_attachment", id))?,
            ),
            None => None,
        };
        let evidence_hash = resolve_evidence(contract.id, valid.evidence_hash, attachment.as_ref())?;

        let signature = self
            .attachment_repo
            .insert_signature(
                &mut *tx,
                contract.tenant_id,
                contract.id,
                &NewSignature {
                    attachment_id: attachment.as_ref().map(|a| a.id),
                    party_type: valid.party_type,
                    signer_name: &valid.signer_name,
                    signer_id_no: request.signer_id_no.as_deref(),
                    sign_method: valid.sign_method,
                    signed_at: request.signed_at.unwrap_or_else(Utc::now),
                    evidence_hash: evidence_hash.as_deref(),
                    remark: request.remark.as_deref(),
                    created_by: actor_id,
                },
            )
            .await?;

        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("create_contract_signature", CONTRACT_MODULE, &signature)
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, signature_id = %signature.id, party = ?signature.party_type, "Assinatura registrada");
        Ok(signature)
    }

    pub async fn list_attachments(
        &self,
        contract_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<ContractAttachment>, AppError> {
        self.audit
            .settle(async {
                let mut conn = self.pool.acquire().await?;
                self.guard
                    .load_contract(&mut conn, contract_id, tenant_id, actor_id, "list_contract_attachments")
                    .await?;
                self.attachment_repo.list_attachments(&mut *conn, contract_id).await
            })
            .await
    }

    pub async fn list_signatures(
        &self,
        contract_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<ContractSignature>, AppError> {
        self.audit
            .settle(async {
                let mut conn = self.pool.acquire().await?;
                self.guard
                    .load_contract(&mut conn, contract_id, tenant_id, actor_id, "list_contract_signatures")
                    .await?;
                self.attachment_repo.list_signatures(&mut *conn, contract_id).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn attachment(contract_id: Uuid) -> ContractAttachment {
        ContractAttachment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            contract_id,
            attachment_type: AttachmentType::SignedCopy,
            version_no: 2,
            is_current: true,
            file_name: "contrato.pdf".into(),
            storage_key: "k".into(),
            file_size: 3,
            content_hash: ABC_SHA256.into(),
            remark: None,
            uploaded_by: None,
            created_at: Utc::now(),
        }
    }

    fn request() -> SignatureRequest {
        SignatureRequest {
            party_type: "LESSEE".into(),
            signer_name: "  Maria Souza ".into(),
            sign_method: "ELECTRONIC".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn hashing_is_independent_of_chunking() {
        let chunks: Vec<Result<&[u8], std::io::Error>> = vec![Ok(&b"a"[..]), Ok(&b"bc"[..])];
        let digest = hash_stream(stream::iter(chunks)).await.unwrap();
        assert_eq!(digest.content_hash, ABC_SHA256);
        assert_eq!(digest.file_size, 3);
    }

    #[tokio::test]
    async fn empty_stream_is_rejected() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(Vec::new())];
        let err = hash_stream(stream::iter(chunks)).await.unwrap_err();
        assert_eq!(err.code(), "EMPTY_ATTACHMENT");
    }

    #[tokio::test]
    async fn broken_stream_surfaces_as_validation_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"abc".to_vec()), Err(std::io::Error::other("connection reset"))];
        let err = hash_stream(stream::iter(chunks)).await.unwrap_err();
        assert_eq!(err.code(), "ATTACHMENT_READ_FAILED");
    }

    #[test]
    fn signature_fields_are_validated() {
        let valid = validate_signature(&request()).unwrap();
        assert_eq!(valid.party_type, SignatureParty::Lessee);
        assert_eq!(valid.signer_name, "Maria Souza");
        assert_eq!(valid.evidence_hash, None);

        let mut bad = request();
        bad.sign_method = "FAX".into();
        assert_eq!(validate_signature(&bad).unwrap_err().code(), "INVALID_SIGNATURE_METHOD");

        let mut bad = request();
        bad.signer_name = "   ".into();
        assert_eq!(validate_signature(&bad).unwrap_err().code(), "SIGNER_NAME_REQUIRED");

        let mut bad = request();
        bad.evidence_hash = Some("abc".into());
        assert_eq!(validate_signature(&bad).unwrap_err().code(), "SIGNATURE_HASH_INVALID");

        let mut upper = request();
        upper.evidence_hash = Some(ABC_SHA256.to_uppercase());
        assert_eq!(validate_signature(&upper).unwrap().evidence_hash.as_deref(), Some(ABC_SHA256));
    }

    #[test]
    fn evidence_defaults_to_attachment_hash() {
        let contract_id = Uuid::new_v4();
        let att = attachment(contract_id);

        let resolved = resolve_evidence(contract_id, None, Some(&att)).unwrap();
        assert_eq!(resolved.as_deref(), Some(ABC_SHA256));

        let explicit = "f".repeat(64);
        let resolved = resolve_evidence(contract_id, Some(explicit.clone()), Some(&att)).unwrap();
        assert_eq!(resolved, Some(explicit));

        assert_eq!(resolve_evidence(contract_id, None, None).unwrap(), None);
    }

    #[test]
    fn attachment_from_other_contract_is_rejected() {
        let att = attachment(Uuid::new_v4());
        let err = resolve_evidence(Uuid::new_v4(), None, Some(&att)).unwrap_err();
        assert_eq!(err.code(), "SIGNATURE_ATTACHMENT_MISMATCH");
    }

    #[test]
    fn storage_key_is_derived_from_contract_type_and_hash() {
        let id = Uuid::nil();
        assert_eq!(
            default_storage_key(id, AttachmentType::SignedCopy, "ab"),
            format!("contracts/{}/signed_copy/ab", id)
        );
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::testing::{self, days_from_today};
    use futures::stream;

    fn upload() -> AttachmentUpload {
        AttachmentUpload {
            attachment_type: AttachmentType::SignedCopy,
            file_name: "contrato.pdf".into(),
            storage_key: None,
            remark: None,
        }
    }

    fn body(content: &'static [u8]) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> + Unpin {
        stream::iter(vec![Ok(content)])
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn foreign_tenant_upload_is_refused_before_the_body_is_read(pool: PgPool) {
        let owner = testing::tenancy(&pool, "wf").await;
        let other = testing::tenancy(&pool, "xx").await;
        let state = testing::app(pool.clone());

        let draft = state
            .contract_service
            .create_draft(owner.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), owner.tenant_id, owner.operator_id)
            .await
            .unwrap();

        // Um corpo que falharia se fosse lido
        let unreadable = stream::iter(vec![Err::<&[u8], _>("conexão interrompida")]);
        let err = state
            .attachment_service
            .add_attachment(draft.id, upload(), unreadable, other.tenant_id, other.operator_id)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        assert_eq!(testing::count_actions(&pool, "cross_tenant_access_blocked").await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn new_upload_becomes_the_only_current_version(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        let state = testing::app(pool.clone());
        let draft = state
            .contract_service
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        let service = &state.attachment_service;

        let first = service.add_attachment(draft.id, upload(), body(b"v1"), t.tenant_id, t.operator_id).await.unwrap();
        let second = service.add_attachment(draft.id, upload(), body(b"abc"), t.tenant_id, t.operator_id).await.unwrap();
        assert_eq!((first.version_no, second.version_no), (1, 2));
        assert_eq!(second.content_hash, ABC_SHA256);

        let listed = service.list_attachments(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        let current: Vec<i32> = listed.iter().filter(|a| a.is_current).map(|a| a.version_no).collect();
        assert_eq!(listed.len(), 2);
        assert_eq!(current, vec![2]);
    }

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
}
