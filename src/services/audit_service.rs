// src/services/audit_service.rs

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_transaction, error::AppError},
    db::{audit_repo::NewAuditLog, AuditRepository},
    models::{
        audit::{AuditEntry, AuditLog, Auditable, ChainVerification, SequenceVerification},
        contract::{Contract, ContractStatus},
    },
};

pub const CONTRACT_MODULE: &str = "contract";

// Módulos cujos registros formam a cadeia de hashes por objeto
const CHAINED_MODULES: &[&str] = &[CONTRACT_MODULE];

/// Campos que entram no hash de um registro de auditoria.
#[derive(Debug, Clone)]
pub struct HashInput<'a> {
    pub actor_id: Option<Uuid>,
    pub action: &'a str,
    pub module: &'a str,
    pub object_type: Option<&'a str>,
    pub object_id: Option<&'a str>,
    pub before_data: Option<&'a Value>,
    pub after_data: Option<&'a Value>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: Option<&'a str>,
}

/// sha256 do JSON canônico (chaves ordenadas, sem espaços) do registro.
pub fn chain_hash(input: &HashInput<'_>) -> String {
    // serde_json::Map é um BTreeMap: a serialização já sai com as chaves ordenadas
    let payload = json!({
        "actor_id": input.actor_id.map(|id| id.to_string()),
        "action": input.action,
        "module": input.module,
        "object_type": input.object_type,
        "object_id": input.object_id,
        "before_data": input.before_data,
        "after_data": input.after_data,
        "created_at": input.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        "prev_hash": input.prev_hash,
    });

    let digest = Sha256::digest(payload.to_string().as_bytes());
    hex::encode(digest)
}

/// Instante de um novo registro: nunca anterior ao elo que ele encadeia,
/// para que a ordem (created_at, id) da verificação siga a da gravação.
/// O Postgres guarda microssegundos; truncar mantém o hash reproduzível.
pub fn link_instant(now: DateTime<Utc>, last_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match last_at {
        Some(last) if last > now => last,
        _ => now,
    }
}

/// Refaz a cadeia de um objeto a partir dos registros em ordem (created_at, id).
pub fn verify_logs(logs: &[AuditLog]) -> ChainVerification {
    let mut prev_hash: Option<String> = None;

    for (index, log) in logs.iter().enumerate() {
        let failure = |error: &str, expected: Option<String>, actual: Option<String>| ChainVerification {
            ok: false,
            checked: index + 1,
            error: Some(error.to_string()),
            log_id: Some(log.id),
            expected,
            actual,
        };

        if log.prev_hash != prev_hash {
            return failure("prev_hash_mismatch", prev_hash, log.prev_hash.clone());
        }

        let Some(current) = log.current_hash.as_deref() else {
            return failure("missing_current_hash", None, None);
        };

        let expected = chain_hash(&HashInput {
            actor_id: log.actor_id,
            action: &log.action,
            module: &log.module,
            object_type: log.object_type.as_deref(),
            object_id: log.object_id.as_deref(),
            before_data: log.before_data.as_ref(),
            after_data: log.after_data.as_ref(),
            created_at: log.created_at,
            prev_hash: prev_hash.as_deref(),
        });
        if current != expected {
            return failure("hash_mismatch", Some(expected), Some(current.to_string()));
        }

        prev_hash = Some(current.to_string());
    }

    ChainVerification { ok: true, checked: logs.len(), error: None, log_id: None, expected: None, actual: None }
}

/// Ações que precisam constar na trilha dado o estado atual do contrato.
pub fn required_actions(contract: &Contract) -> Vec<&'static str> {
    use ContractStatus::*;

    let mut required = Vec::new();
    if contract.status != Draft {
        required.extend(["submit_contract_review", "start_approval_round"]);
    }
    if matches!(contract.status, Approved | Active | Expired | Terminated) {
        required.push("approve_contract");
    }
    if contract.status == Rejected {
        required.push("reject_contract");
    }
    if matches!(contract.status, Active | Expired | Terminated) {
        required.push("activate_contract");
    }
    match contract.status {
        Terminated => required.push("terminate_contract"),
        Expired => required.push("expire_contract"),
        _ => {}
    }
    if contract.is_archived {
        required.push("archive_contract");
    }
    required
}

pub fn check_sequence(contract: &Contract, recorded: &[String]) -> SequenceVerification {
    let mut missing: Vec<String> = required_actions(contract)
        .into_iter()
        .filter(|action| !recorded.iter().any(|r| r == action))
        .map(str::to_string)
        .collect();
    missing.sort();
    missing.dedup();

    SequenceVerification { ok: missing.is_empty(), missing_actions: missing, action_count: recorded.len() }
}

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
    repo: AuditRepository,
    lock_timeout_ms: u64,
}

impl AuditService {
    pub fn new(pool: PgPool, repo: AuditRepository, lock_timeout_ms: u64) -> Self {
        Self { pool, repo, lock_timeout_ms }
    }

    /// Grava o registro na transação do chamador. Falha aqui desfaz a operação inteira.
    pub async fn record(&self, conn: &mut PgConnection, entry: AuditEntry) -> Result<i64, AppError> {
        let object_id = entry.object_id.as_deref();

        let chained = CHAINED_MODULES.contains(&entry.module);
        let (created_at, prev_hash, current_hash) = match (chained, entry.object_type, object_id) {
            (true, Some(object_type), Some(object_id)) => {
                // O instante só é tomado com a cadeia travada
                self.repo.lock_chain(&mut *conn, entry.module, object_type, object_id).await?;
                let last = self.repo.last_link(&mut *conn, entry.module, object_type, object_id).await?;
                let created_at = link_instant(Utc::now(), last.as_ref().map(|(_, at)| *at));
                let prev = last.and_then(|(hash, _)| hash);
                let current = chain_hash(&HashInput {
                    actor_id: entry.actor_id,
                    action: entry.action,
                    module: entry.module,
                    object_type: Some(object_type),
                    object_id: Some(object_id),
                    before_data: entry.before.as_ref(),
                    after_data: entry.after.as_ref(),
                    created_at,
                    prev_hash: prev.as_deref(),
                });
                (created_at, prev, Some(current))
            }
            _ => (link_instant(Utc::now(), None), None, None),
        };

        let id = self
            .repo
            .insert(
                &mut *conn,
                &NewAuditLog {
                    tenant_id: entry.tenant_id,
                    actor_id: entry.actor_id,
                    action: entry.action,
                    module: entry.module,
                    object_type: entry.object_type,
                    object_id,
                    before_data: entry.before.as_ref(),
                    after_data: entry.after.as_ref(),
                    prev_hash: prev_hash.as_deref(),
                    current_hash: current_hash.as_deref(),
                    created_at,
                },
            )
            .await?;

        Ok(id)
    }

    /// Grava numa transação própria, para sobreviver ao rollback da operação
    /// bloqueada. Uma falha aqui só é logada: o erro original prevalece.
    pub async fn record_detached(&self, entry: AuditEntry) {
        let action = entry.action;
        let result = async {
            let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
            self.record(&mut tx, entry).await?;
            tx.commit().await?;
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(action, error = %e, "Falha ao gravar auditoria de tentativa bloqueada");
        }
    }

    /// Conclui uma operação de serviço. Uma tentativa bloqueada é gravada só
    /// aqui, quando a operação já devolveu a conexão ao pool.
    pub async fn settle<T>(&self, operation: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        match operation.await {
            Err(AppError::Blocked { error, entry }) => {
                self.record_detached(*entry).await;
                Err(*error)
            }
            other => other,
        }
    }

    pub async fn verify_chain(&self, object_type: &str, object_id: &str) -> Result<ChainVerification, AppError> {
        let logs = self
            .repo
            .list_for_object(&self.pool, CONTRACT_MODULE, object_type, object_id)
            .await?;
        Ok(verify_logs(&logs))
    }

    pub async fn verify_contract_sequence(&self, contract: &Contract) -> Result<SequenceVerification, AppError> {
        let logs = self
            .repo
            .list_for_object(&self.pool, CONTRACT_MODULE, Contract::OBJECT_TYPE, &contract.id.to_string())
            .await?;
        let actions: Vec<String> = logs.into_iter().map(|log| log.action).collect();
        Ok(check_sequence(contract, &actions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contract::tests::sample_contract;
    use chrono::{NaiveDate, TimeZone};

    fn log(id: i64, action: &str, prev: Option<String>, at: DateTime<Utc>) -> AuditLog {
        let after = json!({ "status": action.to_uppercase(), "monthly_rent": "1000.00" });
        let current = chain_hash(&HashInput {
            actor_id: None,
            action,
            module: CONTRACT_MODULE,
            object_type: Some("contract"),
            object_id: Some("c-1"),
            before_data: None,
            after_data: Some(&after),
            created_at: at,
            prev_hash: prev.as_deref(),
        });
        AuditLog {
            id,
            tenant_id: None,
            actor_id: None,
            action: action.to_string(),
            module: CONTRACT_MODULE.to_string(),
            object_type: Some("contract".to_string()),
            object_id: Some("c-1".to_string()),
            before_data: None,
            after_data: Some(after),
            prev_hash: prev,
            current_hash: Some(current),
            created_at: at,
        }
    }

    fn chain() -> Vec<AuditLog> {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap();
        let first = log(1, "create_contract", None, t0);
        let second = log(2, "submit_contract_review", first.current_hash.clone(), t0 + chrono::Duration::seconds(5));
        vec![first, second]
    }

    #[test]
    fn hash_is_stable_and_hex_encoded() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let input = HashInput {
            actor_id: None,
            action: "create_contract",
            module: CONTRACT_MODULE,
            object_type: Some("contract"),
            object_id: Some("1"),
            before_data: None,
            after_data: None,
            created_at: at,
            prev_hash: None,
        };
        let a = chain_hash(&input);
        assert_eq!(a, chain_hash(&input));
        assert_eq!(a.len(), 64);
        assert_ne!(a, chain_hash(&HashInput { prev_hash: Some("x"), ..input }));
    }

    #[test]
    fn new_link_never_precedes_the_previous_one() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::nanoseconds(1_234_567);
        assert_eq!(link_instant(now, None).timestamp_subsec_nanos(), 1_234_000);

        let ahead = now + chrono::Duration::milliseconds(3);
        assert_eq!(link_instant(now, Some(ahead)), ahead);

        let behind = now - chrono::Duration::seconds(1);
        assert_eq!(link_instant(now, Some(behind)), now.trunc_subsecs(6));
    }

    #[test]
    fn intact_chain_verifies() {
        let result = verify_logs(&chain());
        assert!(result.ok);
        assert_eq!(result.checked, 2);
    }

    #[test]
    fn tampered_payload_is_a_hash_mismatch() {
        let mut logs = chain();
        logs[1].after_data = Some(json!({ "status": "ACTIVE" }));
        let result = verify_logs(&logs);
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("hash_mismatch"));
        assert_eq!(result.log_id, Some(2));
    }

    #[test]
    fn broken_link_is_a_prev_hash_mismatch() {
        let mut logs = chain();
        logs[1].prev_hash = Some("0".repeat(64));
        let result = verify_logs(&logs);
        assert_eq!(result.error.as_deref(), Some("prev_hash_mismatch"));
    }

    #[test]
    fn missing_hash_is_reported() {
        let mut logs = chain();
        logs[0].current_hash = None;
        assert_eq!(verify_logs(&logs).error.as_deref(), Some("missing_current_hash"));
    }

    #[test]
    fn terminated_archived_contract_requires_full_history() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let mut contract = sample_contract(start, end, ContractStatus::Terminated);
        contract.is_archived = true;

        let recorded: Vec<String> = ["submit_contract_review", "start_approval_round", "approve_contract"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = check_sequence(&contract, &recorded);

        assert!(!result.ok);
        assert_eq!(result.missing_actions, vec!["activate_contract", "archive_contract", "terminate_contract"]);
        assert_eq!(result.action_count, 3);
    }

    #[test]
    fn draft_requires_nothing() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let contract = sample_contract(start, end, ContractStatus::Draft);
        assert!(check_sequence(&contract, &[]).ok);
    }
}
