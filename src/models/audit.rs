// src/models/audit.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Entidades que entram na trilha de auditoria.
///
/// O snapshot é uma lista explícita de campos permitidos, nunca um dump
/// completo do objeto.
pub trait Auditable {
    const OBJECT_TYPE: &'static str;

    fn audit_object_id(&self) -> String;

    fn audit_snapshot(&self) -> Value;
}

// Normalização dos valores do snapshot: decimais como texto, datas em ISO-8601
pub fn decimal_value(value: Decimal) -> Value {
    Value::String(value.to_string())
}

pub fn date_value(value: NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

pub fn instant_value(value: Option<DateTime<Utc>>) -> Value {
    match value {
        Some(v) => Value::String(v.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        None => Value::Null,
    }
}

// Linha gravada na tabela audit_logs (somente inserção)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub before_data: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub after_data: Option<Value>,
    pub prev_hash: Option<String>,
    pub current_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Uma ação a ser registrada. Montada com os métodos encadeados abaixo.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub action: &'static str,
    pub module: &'static str,
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub object_type: Option<&'static str>,
    pub object_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl AuditEntry {
    pub fn new(action: &'static str, module: &'static str) -> Self {
        Self { action, module, ..Default::default() }
    }

    /// Entrada já apontando para a instância, com o snapshot atual como "after".
    pub fn for_instance<T: Auditable>(action: &'static str, module: &'static str, instance: &T) -> Self {
        Self::new(action, module)
            .object(T::OBJECT_TYPE, instance.audit_object_id())
            .after(instance.audit_snapshot())
    }

    pub fn object(mut self, object_type: &'static str, object_id: impl ToString) -> Self {
        self.object_type = Some(object_type);
        self.object_id = Some(object_id.to_string());
        self
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }
}

// Resultado da verificação da cadeia de hashes de um objeto
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub ok: bool,
    pub checked: usize,
    pub error: Option<String>,
    pub log_id: Option<i64>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

// Resultado da verificação da sequência de ações exigidas de um contrato
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceVerification {
    pub ok: bool,
    pub missing_actions: Vec<String>,
    pub action_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractAuditReport {
    pub contract_id: Uuid,
    pub chain: ChainVerification,
    pub sequence: SequenceVerification,
}
