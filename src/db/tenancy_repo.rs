// src/db/tenancy_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::tenancy::{Shop, Tenant};

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_tenant<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Tenant>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, code, is_active, created_at FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(tenant)
    }

    /// Busca o tenant pelo código (comparação sem distinção de maiúsculas).
    /// Usado fora de transação, pela rotina administrativa de numeração.
    pub async fn find_tenant_by_code(&self, code: &str) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, code, is_active, created_at FROM tenants WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    // Trava a loja pelo id. O tenant é conferido depois, pelo TenantGuard.
    // Segurar esta linha serializa as ativações concorrentes da mesma loja.
    pub async fn lock_shop<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Shop>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let shop = sqlx::query_as::<_, Shop>(
            r#"
            SELECT id, tenant_id, name, code, is_deleted, created_at, updated_at
            FROM shops
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(shop)
    }
}
