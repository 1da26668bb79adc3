// src/db/contract_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::contract::{Contract, ContractItem, ContractStatus, ContractTerms, NewContractItem},
};

const CONTRACT_COLUMNS: &str = r#"
    id, tenant_id, shop_id, contract_no, start_date, end_date,
    monthly_rent, deposit, payment_cycle, status,
    reviewed_by, reviewed_at, review_comment, renewed_from_id,
    terminated_at, termination_reason,
    is_archived, archived_at, archived_by,
    created_by, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, tenant_id, contract_id, sequence_no, item_type, calculation_type,
    amount, rate, period_start, period_end, payment_cycle, status, created_at
"#;

#[derive(Clone, Default)]
pub struct ContractRepository;

impl ContractRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  LEITURA E BLOQUEIO
    // =========================================================================

    // Sem filtro de tenant de propósito: quem chama passa pelo TenantGuard,
    // que transforma o acesso cruzado em "não encontrado" e audita.
    pub async fn lock_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {} FROM contracts WHERE id = $1 FOR UPDATE", CONTRACT_COLUMNS);
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(contract)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {} FROM contracts WHERE id = $1", CONTRACT_COLUMNS);
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(contract)
    }

    /// Contratos ATIVOS da mesma loja, exceto o informado. A sobreposição de
    /// datas é decidida por `Contract::overlaps`.
    pub async fn list_active_for_shop<'e, E>(
        &self,
        executor: E,
        shop_id: Uuid,
        exclude_id: Uuid,
    ) -> Result<Vec<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {} FROM contracts
            WHERE shop_id = $1
              AND status = $2
              AND id <> $3
            ORDER BY start_date
            "#,
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, Contract>(&sql)
            .bind(shop_id)
            .bind(ContractStatus::Active)
            .bind(exclude_id)
            .fetch_all(executor)
            .await?;

        Ok(contracts)
    }

    // =========================================================================
    //  ESCRITA
    // =========================================================================

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        shop_id: Uuid,
        contract_no: Option<&str>,
        terms: &ContractTerms,
        created_by: Uuid,
        renewed_from_id: Option<Uuid>,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO contracts (
                tenant_id, shop_id, contract_no, start_date, end_date,
                monthly_rent, deposit, payment_cycle, status,
                created_by, renewed_from_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(tenant_id)
            .bind(shop_id)
            .bind(contract_no)
            .bind(terms.start_date)
            .bind(terms.end_date)
            .bind(terms.monthly_rent)
            .bind(terms.deposit)
            .bind(terms.payment_cycle)
            .bind(ContractStatus::Draft)
            .bind(created_by)
            .bind(renewed_from_id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    pub async fn update_terms<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        terms: &ContractTerms,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE contracts
            SET start_date = $1, end_date = $2, monthly_rent = $3,
                deposit = $4, payment_cycle = $5, updated_at = NOW()
            WHERE id = $6
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(terms.start_date)
            .bind(terms.end_date)
            .bind(terms.monthly_rent)
            .bind(terms.deposit)
            .bind(terms.payment_cycle)
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: ContractStatus,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE contracts SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(status)
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    /// Atualiza status e os campos de revisão juntos (None limpa os campos).
    pub async fn update_review<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: ContractStatus,
        reviewed_by: Option<Uuid>,
        reviewed_at: Option<DateTime<Utc>>,
        review_comment: Option<&str>,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE contracts
            SET status = $1, reviewed_by = $2, reviewed_at = $3,
                review_comment = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(status)
            .bind(reviewed_by)
            .bind(reviewed_at)
            .bind(review_comment)
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    pub async fn terminate<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        reason: Option<&str>,
        terminated_at: DateTime<Utc>,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE contracts
            SET status = $1, terminated_at = $2, termination_reason = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(ContractStatus::Terminated)
            .bind(terminated_at)
            .bind(reason)
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    pub async fn archive<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        archived_by: Uuid,
        archived_at: DateTime<Utc>,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE contracts
            SET is_archived = TRUE, archived_at = $1, archived_by = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(archived_at)
            .bind(archived_by)
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(contract)
    }

    // =========================================================================
    //  NUMERAÇÃO
    // =========================================================================

    pub async fn contract_no_exists<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        contract_no: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contracts
                WHERE tenant_id = $1 AND contract_no = $2
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(tenant_id)
        .bind(contract_no)
        .bind(exclude_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Maior sufixo numérico já usado com o prefixo. Números fora do formato
    /// `{prefixo}{dígitos}` não contam.
    pub async fn max_sequence_with_prefix<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        prefix: &str,
    ) -> Result<Option<i64>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(substr(contract_no, char_length($2::text) + 1)::bigint)
            FROM contracts
            WHERE tenant_id = $1
              AND starts_with(contract_no, $2::text)
              AND substr(contract_no, char_length($2::text) + 1) ~ '^[0-9]{1,18}$'
            "#,
        )
        .bind(tenant_id)
        .bind(prefix)
        .fetch_one(executor)
        .await?;

        Ok(max)
    }

    /// Contratos legados sem número, travados na ordem (tenant, início, id).
    pub async fn lock_unnumbered<'e, E>(
        &self,
        executor: E,
        tenant_id: Option<Uuid>,
        limit: Option<i64>,
    ) -> Result<Vec<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {} FROM contracts
            WHERE (contract_no IS NULL OR contract_no = '')
              AND ($1::uuid IS NULL OR tenant_id = $1)
            ORDER BY tenant_id, start_date, id
            LIMIT $2
            FOR UPDATE
            "#,
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, Contract>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(executor)
            .await?;

        Ok(contracts)
    }

    pub async fn set_contract_no<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        contract_no: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE contracts SET contract_no = $1, updated_at = NOW() WHERE id = $2")
            .bind(contract_no)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    pub async fn insert_item<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        contract_id: Uuid,
        item: &NewContractItem,
    ) -> Result<ContractItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO contract_items (
                tenant_id, contract_id, sequence_no, item_type, calculation_type,
                amount, rate, period_start, period_end, payment_cycle
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, ContractItem>(&sql)
            .bind(tenant_id)
            .bind(contract_id)
            .bind(item.sequence_no)
            .bind(item.item_type)
            .bind(item.calculation_type)
            .bind(item.amount)
            .bind(item.rate)
            .bind(item.period_start)
            .bind(item.period_end)
            .bind(item.payment_cycle)
            .fetch_one(executor)
            .await?;

        Ok(item)
    }

    pub async fn list_items<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ContractItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM contract_items WHERE contract_id = $1 ORDER BY sequence_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, ContractItem>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;

        Ok(items)
    }

    // Itens nunca são apagados: apenas desativados
    pub async fn deactivate_items<'e, E>(&self, executor: E, contract_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE contract_items SET status = 'INACTIVE' WHERE contract_id = $1 AND status = 'ACTIVE'",
        )
        .bind(contract_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}
