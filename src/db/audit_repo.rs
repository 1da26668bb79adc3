// src/db/audit_repo.rs

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{common::error::AppError, models::audit::AuditLog};

const AUDIT_COLUMNS: &str = r#"
    id, tenant_id, actor_id, action, module, object_type, object_id,
    before_data, after_data, prev_hash, current_hash, created_at
"#;

// Linha pronta para inserção; o hash já foi calculado pelo serviço
#[derive(Debug, Clone)]
pub struct NewAuditLog<'a> {
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: &'a str,
    pub module: &'a str,
    pub object_type: Option<&'a str>,
    pub object_id: Option<&'a str>,
    pub before_data: Option<&'a Value>,
    pub after_data: Option<&'a Value>,
    pub prev_hash: Option<&'a str>,
    pub current_hash: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub fn chain_key(module: &str, object_type: &str, object_id: &str) -> String {
    format!("{}:{}:{}", module, object_type, object_id)
}

#[derive(Clone, Default)]
pub struct AuditRepository;

impl AuditRepository {
    pub fn new() -> Self {
        Self
    }

    /// Serializa as gravações encadeadas de um objeto até o fim da transação.
    ///
    /// Vale também para o primeiro registro, quando ainda não há linha a travar.
    pub async fn lock_chain<'e, E>(
        &self,
        executor: E,
        module: &str,
        object_type: &str,
        object_id: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(chain_key(module, object_type, object_id))
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Hash e instante do último registro encadeado do objeto. Deve ser lido
    /// depois de `lock_chain`, para enxergar o que o detentor anterior gravou.
    pub async fn last_link<'e, E>(
        &self,
        executor: E,
        module: &str,
        object_type: &str,
        object_id: &str,
    ) -> Result<Option<(Option<String>, DateTime<Utc>)>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let link = sqlx::query_as::<_, (Option<String>, DateTime<Utc>)>(
            r#"
            SELECT current_hash, created_at FROM audit_logs
            WHERE module = $1 AND object_type = $2 AND object_id = $3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(module)
        .bind(object_type)
        .bind(object_id)
        .fetch_optional(executor)
        .await?;

        Ok(link)
    }

    pub async fn insert<'e, E>(&self, executor: E, log: &NewAuditLog<'_>) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (
                tenant_id, actor_id, action, module, object_type, object_id,
                before_data, after_data, prev_hash, current_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(log.tenant_id)
        .bind(log.actor_id)
        .bind(log.action)
        .bind(log.module)
        .bind(log.object_type)
        .bind(log.object_id)
        .bind(log.before_data)
        .bind(log.after_data)
        .bind(log.prev_hash)
        .bind(log.current_hash)
        .bind(log.created_at)
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    pub async fn list_for_object<'e, E>(
        &self,
        executor: E,
        module: &str,
        object_type: &str,
        object_id: &str,
    ) -> Result<Vec<AuditLog>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {} FROM audit_logs
            WHERE module = $1 AND object_type = $2 AND object_id = $3
            ORDER BY created_at, id
            "#,
            AUDIT_COLUMNS
        );
        let logs = sqlx::query_as::<_, AuditLog>(&sql)
            .bind(module)
            .bind(object_type)
            .bind(object_id)
            .fetch_all(executor)
            .await?;

        Ok(logs)
    }
}
