// src/db/sequence_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;

#[derive(Clone, Default)]
pub struct SequenceRepository;

impl SequenceRepository {
    pub fn new() -> Self {
        Self
    }

    /// Cria o contador (tenant, ano) se faltar e o devolve travado.
    ///
    /// O `DO UPDATE` sem efeito existe só para que o Postgres trave a linha
    /// também quando ela já existia; o lock dura até o fim da transação.
    pub async fn lock_or_create<'e, E>(&self, executor: E, tenant_id: Uuid, year: i32) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let last_seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO contract_number_sequences (tenant_id, year, last_seq)
            VALUES ($1, $2, 0)
            ON CONFLICT (tenant_id, year)
            DO UPDATE SET last_seq = contract_number_sequences.last_seq
            RETURNING last_seq
            "#,
        )
        .bind(tenant_id)
        .bind(year)
        .fetch_one(executor)
        .await?;

        Ok(last_seq)
    }

    pub async fn store<'e, E>(&self, executor: E, tenant_id: Uuid, year: i32, last_seq: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE contract_number_sequences
            SET last_seq = $1, updated_at = NOW()
            WHERE tenant_id = $2 AND year = $3
            "#,
        )
        .bind(last_seq)
        .bind(tenant_id)
        .bind(year)
        .execute(executor)
        .await?;

        Ok(())
    }
}
