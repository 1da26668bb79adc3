// src/common/db_utils.rs

use sqlx::{PgPool, Postgres, Transaction};

use crate::common::error::AppError;

// ---
// Helper de transação: toda operação de serviço começa por aqui
// ---
/// Abre uma transação e limita a espera por locks de linha.
/// Estourar o limite vira `AppError::LockTimeout` (55P03), que é retentável.
pub async fn begin_transaction(
    pool: &PgPool,
    lock_timeout_ms: u64,
) -> Result<Transaction<'static, Postgres>, AppError> {
    // 1. Abre a transação
    let mut tx = pool.begin().await?;

    // 2. Define o lock_timeout apenas para esta transação (is_local = true)
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout_ms))
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}
