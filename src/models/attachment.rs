// src/models/attachment.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::audit::{instant_value, Auditable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "attachment_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentType {
    ContractScan,
    SignedCopy,
    Supplement,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "signature_party", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureParty {
    Lessor,
    Lessee,
    Guarantor,
    Witness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "signature_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureMethod {
    Handwritten,
    Electronic,
    Seal,
}

// Os valores chegam como texto na fronteira e são validados aqui
impl FromStr for AttachmentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CONTRACT_SCAN" => Ok(AttachmentType::ContractScan),
            "SIGNED_COPY" => Ok(AttachmentType::SignedCopy),
            "SUPPLEMENT" => Ok(AttachmentType::Supplement),
            "OTHER" => Ok(AttachmentType::Other),
            other => Err(invalid_enum("INVALID_ATTACHMENT_TYPE", "attachment_type", other)),
        }
    }
}

impl FromStr for SignatureParty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LESSOR" => Ok(SignatureParty::Lessor),
            "LESSEE" => Ok(SignatureParty::Lessee),
            "GUARANTOR" => Ok(SignatureParty::Guarantor),
            "WITNESS" => Ok(SignatureParty::Witness),
            other => Err(invalid_enum("INVALID_SIGNATURE_PARTY", "party_type", other)),
        }
    }
}

impl FromStr for SignatureMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HANDWRITTEN" => Ok(SignatureMethod::Handwritten),
            "ELECTRONIC" => Ok(SignatureMethod::Electronic),
            "SEAL" => Ok(SignatureMethod::Seal),
            other => Err(invalid_enum("INVALID_SIGNATURE_METHOD", "sign_method", other)),
        }
    }
}

fn invalid_enum(code: &'static str, field: &str, value: &str) -> AppError {
    AppError::validation(
        code,
        format!("Valor inválido para {}: {}", field, value),
        json!({ "field": field, "value": value }),
    )
}

/// Hash SHA-256 em hexadecimal: exatamente 64 caracteres hex.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

// ---
// Anexo versionado por (contrato, tipo)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractAttachment {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub attachment_type: AttachmentType,
    pub version_no: i32,
    pub is_current: bool,
    pub file_name: String,
    pub storage_key: String,
    pub file_size: i64,
    pub content_hash: String,
    pub remark: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Auditable for ContractAttachment {
    const OBJECT_TYPE: &'static str = "contract_attachment";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "contract_id": self.contract_id.to_string(),
            "attachment_type": self.attachment_type,
            "version_no": self.version_no,
            "is_current": self.is_current,
            "file_name": self.file_name,
            "file_size": self.file_size,
            "content_hash": self.content_hash,
        })
    }
}

// ---
// Assinatura (somente inserção)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractSignature {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub attachment_id: Option<Uuid>,
    pub party_type: SignatureParty,
    pub signer_name: String,
    pub signer_id_no: Option<String>,
    pub sign_method: SignatureMethod,
    pub signed_at: DateTime<Utc>,
    pub evidence_hash: Option<String>,
    pub remark: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Auditable for ContractSignature {
    const OBJECT_TYPE: &'static str = "contract_signature";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "contract_id": self.contract_id.to_string(),
            "attachment_id": self.attachment_id.map(|id| id.to_string()),
            "party_type": self.party_type,
            "signer_name": self.signer_name,
            "sign_method": self.sign_method,
            "signed_at": instant_value(Some(self.signed_at)),
            "evidence_hash": self.evidence_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_values_parse_from_wire_strings() {
        assert_eq!("LESSEE".parse::<SignatureParty>().unwrap(), SignatureParty::Lessee);
        assert_eq!("SEAL".parse::<SignatureMethod>().unwrap(), SignatureMethod::Seal);
        assert_eq!("SIGNED_COPY".parse::<AttachmentType>().unwrap(), AttachmentType::SignedCopy);
    }

    #[test]
    fn unknown_enum_values_are_validation_errors() {
        let err = "NOTARY".parse::<SignatureParty>().unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE_PARTY");
        let err = "fax".parse::<SignatureMethod>().unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE_METHOD");
    }

    #[test]
    fn sha256_hex_format() {
        assert!(is_sha256_hex(&"a".repeat(64)));
        assert!(!is_sha256_hex(&"a".repeat(63)));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}
