// src/services/sequence_service.rs

use std::collections::HashMap;

use chrono::Datelike;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_transaction, error::AppError},
    db::{ContractRepository, SequenceRepository, TenantRepository},
    models::tenancy::Tenant,
};

/// Prefixo comum de todos os números de um (tenant, ano): `CT-{CODE}-{YEAR}-`.
pub fn number_prefix(tenant_code: &str, year: i32) -> String {
    format!("CT-{}-{}-", tenant_code, year)
}

pub fn format_number(tenant_code: &str, year: i32, seq: i64) -> String {
    format!("{}{:06}", number_prefix(tenant_code, year), seq)
}

/// Ponto de partida do contador: o maior entre o valor gravado e o maior
/// sufixo já usado com o mesmo prefixo (legados, importações manuais).
pub fn seed_sequence(last_seq: i64, existing_max: Option<i64>) -> i64 {
    existing_max.map_or(last_seq, |max| max.max(last_seq))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillPreview {
    pub contract_id: Uuid,
    pub contract_no: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub dry_run: bool,
    pub preview: Vec<BackfillPreview>,
}

#[derive(Clone)]
pub struct SequenceService {
    pool: PgPool,
    lock_timeout_ms: u64,
    sequence_repo: SequenceRepository,
    contract_repo: ContractRepository,
    tenant_repo: TenantRepository,
}

impl SequenceService {
    pub fn new(
        pool: PgPool,
        lock_timeout_ms: u64,
        sequence_repo: SequenceRepository,
        contract_repo: ContractRepository,
        tenant_repo: TenantRepository,
    ) -> Self {
        Self { pool, lock_timeout_ms, sequence_repo, contract_repo, tenant_repo }
    }

    /// Aloca o próximo número do (tenant, ano) dentro da transação do chamador.
    ///
    /// O contador fica travado até o commit; um rollback pode deixar lacunas,
    /// mas nunca números repetidos.
    pub async fn next_number(&self, conn: &mut PgConnection, tenant: &Tenant, year: i32) -> Result<String, AppError> {
        let code = tenant.contract_code();
        let prefix = number_prefix(&code, year);

        let last_seq = self.sequence_repo.lock_or_create(&mut *conn, tenant.id, year).await?;
        let existing_max = self
            .contract_repo
            .max_sequence_with_prefix(&mut *conn, tenant.id, &prefix)
            .await?;

        let mut seq = seed_sequence(last_seq, existing_max) + 1;
        let mut contract_no = format_number(&code, year, seq);
        while self
            .contract_repo
            .contract_no_exists(&mut *conn, tenant.id, &contract_no, None)
            .await?
        {
            seq += 1;
            contract_no = format_number(&code, year, seq);
        }

        self.sequence_repo.store(&mut *conn, tenant.id, year, seq).await?;
        Ok(contract_no)
    }

    /// Numera contratos legados sem número, em ordem (tenant, início, id).
    /// Em `dry_run` o trabalho é feito e a transação é descartada.
    pub async fn backfill_missing(
        &self,
        tenant_code: Option<&str>,
        dry_run: bool,
        limit: Option<i64>,
    ) -> Result<BackfillReport, AppError> {
        let tenant_filter = match tenant_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => match self.tenant_repo.find_tenant_by_code(code).await? {
                Some(tenant) => Some(tenant.id),
                None => return Err(AppError::resource_not_found("tenant", code)),
            },
            None => None,
        };

        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let targets = self
            .contract_repo
            .lock_unnumbered(&mut *tx, tenant_filter, limit.filter(|l| *l > 0))
            .await?;

        let mut tenants: HashMap<Uuid, Option<Tenant>> = HashMap::new();
        let mut preview = Vec::with_capacity(targets.len());
        let mut skipped = 0;

        for contract in &targets {
            if !tenants.contains_key(&contract.tenant_id) {
                let tenant = self.tenant_repo.find_tenant(&mut *tx, contract.tenant_id).await?;
                tenants.insert(contract.tenant_id, tenant);
            }
            let Some(Some(tenant)) = tenants.get(&contract.tenant_id) else {
                tracing::warn!(contract_id = %contract.id, "Contrato sem tenant válido; ignorado na numeração");
                skipped += 1;
                continue;
            };

            let contract_no = self.next_number(&mut tx, tenant, contract.start_date.year()).await?;
            self.contract_repo.set_contract_no(&mut *tx, contract.id, &contract_no).await?;
            preview.push(BackfillPreview { contract_id: contract.id, contract_no });
        }

        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }

        let report = BackfillReport {
            total: targets.len(),
            updated: preview.len(),
            skipped,
            dry_run,
            preview,
        };
        tracing::info!(
            total = report.total,
            updated = report.updated,
            skipped = report.skipped,
            dry_run,
            "Numeração de contratos legados concluída"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_format_is_zero_padded() {
        assert_eq!(format_number("WF", 2025, 1), "CT-WF-2025-000001");
        assert_eq!(format_number("DEFAULT", 2024, 123456), "CT-DEFAULT-2024-123456");
        assert_eq!(format_number("WF", 2025, 1234567), "CT-WF-2025-1234567");
    }

    #[test]
    fn prefix_is_shared_by_tenant_and_year() {
        assert_eq!(number_prefix("WF", 2025), "CT-WF-2025-");
        assert!(format_number("WF", 2025, 42).starts_with(&number_prefix("WF", 2025)));
    }

    #[test]
    fn seed_skips_past_legacy_numbers() {
        assert_eq!(seed_sequence(2, Some(7)), 7);
        assert_eq!(seed_sequence(10, Some(7)), 10);
        assert_eq!(seed_sequence(3, None), 3);
        assert_eq!(seed_sequence(0, None), 0);
    }

    #[test]
    fn consecutive_numbers_are_strictly_increasing() {
        let mut issued: Vec<String> = Vec::new();
        let mut last_seq = 0;
        let mut existing_max = None;
        for _ in 0..5 {
            let next = seed_sequence(last_seq, existing_max) + 1;
            issued.push(format_number("WF", 2025, next));
            last_seq = next;
            existing_max = Some(next);
        }
        let mut sorted = issued.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, issued);
        assert_eq!(issued.last().map(String::as_str), Some("CT-WF-2025-000005"));
    }
}
