// src/services/contract_service.rs

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_transaction, error::AppError},
    db::{ContractRepository, TenantRepository},
    models::{
        audit::{date_value, AuditEntry, Auditable, ContractAuditReport},
        contract::{
            CalculationType, Contract, ContractItem, ContractItemStatus, ContractItemType, ContractStatus,
            ContractTerms, ItemCycle, NewContractItem,
        },
        tenancy::{Shop, Tenant},
    },
    services::{
        approval_service::ApprovalService,
        audit_service::{AuditService, CONTRACT_MODULE},
        sequence_service::SequenceService,
        tenant_guard::TenantGuard,
    },
};

// =============================================================================
//  REGRAS PURAS
// =============================================================================

/// Validação estática dos termos de um rascunho.
pub fn validate_terms(terms: &ContractTerms) -> Result<(), AppError> {
    if terms.end_date <= terms.start_date {
        return Err(AppError::validation(
            "INVALID_DATE_RANGE",
            "A data final do contrato deve ser posterior à data inicial",
            json!({
                "target_model": "contract",
                "start_date": date_value(terms.start_date),
                "end_date": date_value(terms.end_date),
            }),
        ));
    }
    if terms.monthly_rent <= Decimal::ZERO {
        return Err(AppError::validation(
            "INVALID_RENT",
            "O aluguel mensal deve ser maior que zero",
            json!({ "field": "monthly_rent", "value": terms.monthly_rent.to_string() }),
        ));
    }
    if terms.deposit < Decimal::ZERO {
        return Err(AppError::validation(
            "INVALID_DEPOSIT",
            "O depósito não pode ser negativo",
            json!({ "field": "deposit", "value": terms.deposit.to_string() }),
        ));
    }
    Ok(())
}

/// Exige que o contrato esteja em um dos status dados.
pub fn require_status(contract: &Contract, allowed: &[ContractStatus]) -> Result<(), AppError> {
    if allowed.contains(&contract.status) {
        return Ok(());
    }
    Err(AppError::conflict(
        "CONTRACT_STATUS_CONFLICT",
        format!("Operação não permitida com o contrato em {}", contract.status.as_str()),
        json!({
            "target_model": "contract",
            "target_id": contract.id.to_string(),
            "current_status": contract.status.as_str(),
            "allowed_statuses": allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        }),
    ))
}

/// Itens padrão de um rascunho: uma linha de aluguel cobrindo todo o prazo e,
/// se houver depósito, uma cobrança única na data de início.
pub fn default_items(terms: &ContractTerms, first_sequence: i32) -> Vec<NewContractItem> {
    let mut items = vec![NewContractItem {
        sequence_no: first_sequence,
        item_type: ContractItemType::Rent,
        calculation_type: CalculationType::Fixed,
        amount: terms.monthly_rent,
        rate: None,
        period_start: terms.start_date,
        period_end: terms.end_date,
        payment_cycle: terms.payment_cycle.into(),
    }];

    if terms.deposit > Decimal::ZERO {
        items.push(NewContractItem {
            sequence_no: first_sequence + 1,
            item_type: ContractItemType::Deposit,
            calculation_type: CalculationType::Fixed,
            amount: terms.deposit,
            rate: None,
            period_start: terms.start_date,
            period_end: terms.start_date,
            payment_cycle: ItemCycle::OneTime,
        });
    }
    items
}

/// Clona os itens ativos para o novo prazo. Depósitos viram cobrança única
/// na nova data de início; os demais mantêm valor e taxa.
pub fn renewal_items(original: &[ContractItem], new_start: NaiveDate, new_end: NaiveDate) -> Vec<NewContractItem> {
    let mut active: Vec<&ContractItem> = original
        .iter()
        .filter(|item| item.status == ContractItemStatus::Active)
        .collect();
    active.sort_by_key(|item| item.sequence_no);

    active
        .into_iter()
        .zip(1..)
        .map(|(item, sequence_no)| {
            let deposit = item.item_type == ContractItemType::Deposit;
            NewContractItem {
                sequence_no,
                item_type: item.item_type,
                calculation_type: item.calculation_type,
                amount: item.amount,
                rate: item.rate,
                period_start: new_start,
                period_end: if deposit { new_start } else { new_end },
                payment_cycle: if deposit { ItemCycle::OneTime } else { item.payment_cycle },
            }
        })
        .collect()
}

/// Campos obrigatórios para enviar à revisão.
pub fn check_submittable(contract: &Contract) -> Result<(), AppError> {
    let target = json!({ "target_model": "contract", "target_id": contract.id.to_string() });
    if contract.shop_id.is_nil() {
        return Err(AppError::validation(
            "CONTRACT_SHOP_MISSING",
            "O contrato não está vinculado a uma loja",
            target,
        ));
    }
    if contract.monthly_rent <= Decimal::ZERO {
        return Err(AppError::validation(
            "CONTRACT_RENT_INVALID",
            "O aluguel mensal do contrato deve ser maior que zero",
            target,
        ));
    }
    if contract.start_date >= contract.end_date {
        return Err(AppError::validation(
            "CONTRACT_DATE_INVALID",
            "A data inicial do contrato deve ser anterior à data final",
            json!({
                "target_model": "contract",
                "target_id": contract.id.to_string(),
                "start_date": date_value(contract.start_date),
                "end_date": date_value(contract.end_date),
            }),
        ));
    }
    Ok(())
}

/// Um contrato já vencido não pode ser ativado: é um fato relativo ao tempo,
/// por isso conflito de estado e não validação.
pub fn check_activatable(contract: &Contract, today: NaiveDate) -> Result<(), AppError> {
    contract.status.ensure_transition(ContractStatus::Active, contract.id)?;
    if contract.end_date <= today {
        return Err(AppError::conflict(
            "CONTRACT_EXPIRED_CONFLICT",
            "Não é possível ativar um contrato já vencido",
            json!({
                "target_model": "contract",
                "target_id": contract.id.to_string(),
                "current_status": contract.status.as_str(),
                "end_date": date_value(contract.end_date),
                "today": date_value(today),
            }),
        ));
    }
    Ok(())
}

pub fn overlap_conflict(contract: &Contract, other: &Contract) -> AppError {
    AppError::conflict(
        "CONTRACT_TIME_OVERLAP",
        "A loja já possui um contrato ativo no período",
        json!({
            "target_model": "contract",
            "target_id": contract.id.to_string(),
            "shop_id": contract.shop_id.to_string(),
            "conflict_contract_id": other.id.to_string(),
            "conflict_contract_no": other.contract_no,
            "conflict_range": {
                "start_date": date_value(other.start_date),
                "end_date": date_value(other.end_date),
            },
        }),
    )
}

pub fn check_expirable(contract: &Contract, today: NaiveDate) -> Result<(), AppError> {
    contract.status.ensure_transition(ContractStatus::Expired, contract.id)?;
    if contract.end_date >= today {
        return Err(AppError::conflict(
            "CONTRACT_NOT_EXPIRED",
            "O contrato ainda não venceu",
            json!({
                "target_model": "contract",
                "target_id": contract.id.to_string(),
                "end_date": date_value(contract.end_date),
                "today": date_value(today),
            }),
        ));
    }
    Ok(())
}

pub fn check_archivable(contract: &Contract) -> Result<(), AppError> {
    if contract.is_archived {
        return Err(AppError::conflict(
            "CONTRACT_ALREADY_ARCHIVED",
            "O contrato já está arquivado",
            json!({ "target_model": "contract", "target_id": contract.id.to_string() }),
        ));
    }
    require_status(contract, &[ContractStatus::Expired, ContractStatus::Terminated])
}

/// Termos do contrato de renovação: começa no dia seguinte ao fim do original.
pub fn renewal_terms(original: &Contract, new_end_date: NaiveDate) -> Result<ContractTerms, AppError> {
    require_status(original, &[ContractStatus::Active, ContractStatus::Expired])?;

    let start_date = original.end_date + Duration::days(1);
    if new_end_date <= start_date {
        return Err(AppError::validation(
            "INVALID_RENEWAL_DATE",
            "A nova data final deve ser posterior ao início da renovação",
            json!({
                "target_model": "contract",
                "target_id": original.id.to_string(),
                "original_end_date": date_value(original.end_date),
                "renewal_start_date": date_value(start_date),
                "new_end_date": date_value(new_end_date),
            }),
        ));
    }

    Ok(ContractTerms {
        start_date,
        end_date: new_end_date,
        monthly_rent: original.monthly_rent,
        deposit: original.deposit,
        payment_cycle: original.payment_cycle,
    })
}

fn ensure_shop_usable(shop: &Shop) -> Result<(), AppError> {
    if shop.is_deleted {
        return Err(AppError::validation(
            "SHOP_DELETED",
            "A loja foi excluída e não aceita novos contratos",
            json!({ "target_model": "shop", "target_id": shop.id.to_string() }),
        ));
    }
    Ok(())
}

// =============================================================================
//  SERVIÇO
// =============================================================================

#[derive(Clone)]
pub struct ContractService {
    pool: PgPool,
    lock_timeout_ms: u64,
    contract_repo: ContractRepository,
    tenant_repo: TenantRepository,
    sequence: SequenceService,
    approval: ApprovalService,
    audit: AuditService,
    guard: TenantGuard,
}

impl ContractService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        lock_timeout_ms: u64,
        contract_repo: ContractRepository,
        tenant_repo: TenantRepository,
        sequence: SequenceService,
        approval: ApprovalService,
        audit: AuditService,
        guard: TenantGuard,
    ) -> Self {
        Self { pool, lock_timeout_ms, contract_repo, tenant_repo, sequence, approval, audit, guard }
    }

    // =========================================================================
    //  RASCUNHO
    // =========================================================================

    pub async fn create_draft(
        &self,
        shop_id: Uuid,
        terms: ContractTerms,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit.settle(self.create_draft_inner(shop_id, terms, tenant_id, actor_id)).await
    }

    async fn create_draft_inner(
        &self,
        shop_id: Uuid,
        terms: ContractTerms,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        validate_terms(&terms)?;

        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;

        let shop = self
            .guard
            .lock_shop(&mut tx, shop_id, tenant_id, actor_id, "create_contract")
            .await?;
        ensure_shop_usable(&shop)?;

        let tenant = self.load_tenant(&mut tx, tenant_id).await?;
        let contract_no = self
            .sequence
            .next_number(&mut tx, &tenant, terms.start_date.year())
            .await?;

        let contract = self
            .contract_repo
            .insert(&mut *tx, tenant_id, shop.id, Some(contract_no.as_str()), &terms, actor_id, None)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("create_contract", CONTRACT_MODULE, &contract)
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        self.insert_items(&mut tx, &contract, &default_items(&terms, 1), actor_id)
            .await?;

        tx.commit().await?;

        tracing::info!(contract_id = %contract.id, %contract_no, shop_id = %shop.id, %actor_id, "Rascunho de contrato criado");
        Ok(contract)
    }

    /// Altera os termos de um rascunho. Os itens vigentes são desativados e
    /// recriados, continuando a numeração de exibição.
    pub async fn update_draft(
        &self,
        contract_id: Uuid,
        terms: ContractTerms,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit.settle(self.update_draft_inner(contract_id, terms, tenant_id, actor_id)).await
    }

    async fn update_draft_inner(
        &self,
        contract_id: Uuid,
        terms: ContractTerms,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        validate_terms(&terms)?;

        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "update_contract")
            .await?;
        require_status(&contract, &[ContractStatus::Draft])?;

        let updated = self.contract_repo.update_terms(&mut *tx, contract_id, &terms).await?;

        let existing = self.contract_repo.list_items(&mut *tx, contract_id).await?;
        let next_sequence = existing.iter().map(|i| i.sequence_no).max().unwrap_or(0) + 1;
        let deactivated = self.contract_repo.deactivate_items(&mut *tx, contract_id).await?;

        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("update_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;
        self.insert_items(&mut tx, &updated, &default_items(&terms, next_sequence), actor_id)
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, deactivated_items = deactivated, "Rascunho de contrato atualizado");
        Ok(updated)
    }

    // =========================================================================
    //  REVISÃO
    // =========================================================================

    /// Envia à revisão e abre a rodada de aprovação na mesma transação:
    /// sem fluxo configurado, nada muda e o contrato segue em DRAFT.
    pub async fn submit_for_review(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit.settle(self.submit_for_review_inner(contract_id, tenant_id, actor_id)).await
    }

    async fn submit_for_review_inner(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "submit_contract_review")
            .await?;
        contract.status.ensure_transition(ContractStatus::PendingReview, contract_id)?;
        check_submittable(&contract)?;

        // Campos de revisão de uma rodada anterior não valem para a nova
        let updated = self
            .contract_repo
            .update_review(&mut *tx, contract_id, ContractStatus::PendingReview, None, None, None)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("submit_contract_review", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        self.approval.open_round(&mut tx, &updated, actor_id).await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, from = "DRAFT", to = "PENDING_REVIEW", "Contrato enviado para revisão");
        Ok(updated)
    }

    /// Devolve um contrato rejeitado para rascunho, permitindo nova submissão.
    pub async fn revise(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit
            .settle(self.transition(contract_id, tenant_id, actor_id, ContractStatus::Draft, "revise_contract"))
            .await
    }

    // =========================================================================
    //  CICLO DE VIGÊNCIA
    // =========================================================================

    /// Trava o contrato e depois a loja: ativações concorrentes da mesma loja
    /// se enfileiram e cada uma reavalia a sobreposição com o que já foi gravado.
    pub async fn activate(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit.settle(self.activate_inner(contract_id, tenant_id, actor_id)).await
    }

    async fn activate_inner(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        let today = Utc::now().date_naive();
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;

        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "activate_contract")
            .await?;
        check_activatable(&contract, today)?;

        self.guard
            .lock_shop(&mut tx, contract.shop_id, tenant_id, actor_id, "activate_contract")
            .await?;

        let active = self
            .contract_repo
            .list_active_for_shop(&mut *tx, contract.shop_id, contract.id)
            .await?;
        if let Some(other) = active.iter().find(|other| contract.overlaps(other)) {
            return Err(overlap_conflict(&contract, other));
        }

        let updated = self
            .contract_repo
            .update_status(&mut *tx, contract_id, ContractStatus::Active)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("activate_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, from = "APPROVED", to = "ACTIVE", "Contrato ativado");
        Ok(updated)
    }

    pub async fn terminate(
        &self,
        contract_id: Uuid,
        reason: Option<&str>,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit.settle(self.terminate_inner(contract_id, reason, tenant_id, actor_id)).await
    }

    async fn terminate_inner(
        &self,
        contract_id: Uuid,
        reason: Option<&str>,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "terminate_contract")
            .await?;
        contract.status.ensure_transition(ContractStatus::Terminated, contract_id)?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let updated = self
            .contract_repo
            .terminate(&mut *tx, contract_id, reason, Utc::now())
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("terminate_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, from = "ACTIVE", to = "TERMINATED", "Contrato encerrado");
        Ok(updated)
    }

    pub async fn expire(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit.settle(self.expire_inner(contract_id, tenant_id, actor_id)).await
    }

    async fn expire_inner(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        let today = Utc::now().date_naive();
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "expire_contract")
            .await?;
        check_expirable(&contract, today)?;

        let updated = self
            .contract_repo
            .update_status(&mut *tx, contract_id, ContractStatus::Expired)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("expire_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, from = "ACTIVE", to = "EXPIRED", "Contrato vencido");
        Ok(updated)
    }

    /// Marca como arquivado. Nenhuma linha é apagada.
    pub async fn archive(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit.settle(self.archive_inner(contract_id, tenant_id, actor_id)).await
    }

    async fn archive_inner(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "archive_contract")
            .await?;
        check_archivable(&contract)?;

        let updated = self
            .contract_repo
            .archive(&mut *tx, contract_id, actor_id, Utc::now())
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("archive_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, "Contrato arquivado");
        Ok(updated)
    }

    /// Cria um novo rascunho que começa no dia seguinte ao fim do original.
    pub async fn renew(
        &self,
        contract_id: Uuid,
        new_end_date: NaiveDate,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit.settle(self.renew_inner(contract_id, new_end_date, tenant_id, actor_id)).await
    }

    async fn renew_inner(
        &self,
        contract_id: Uuid,
        new_end_date: NaiveDate,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Contract, AppError> {
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let original = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, "renew_contract")
            .await?;
        let terms = renewal_terms(&original, new_end_date)?;

        let shop = self
            .guard
            .lock_shop(&mut tx, original.shop_id, tenant_id, actor_id, "renew_contract")
            .await?;
        ensure_shop_usable(&shop)?;

        let tenant = self.load_tenant(&mut tx, tenant_id).await?;
        let contract_no = self
            .sequence
            .next_number(&mut tx, &tenant, terms.start_date.year())
            .await?;

        let renewed = self
            .contract_repo
            .insert(&mut *tx, tenant_id, shop.id, Some(contract_no.as_str()), &terms, actor_id, Some(original.id))
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("renew_contract", CONTRACT_MODULE, &renewed)
                    .before(json!({
                        "original_contract_id": original.id.to_string(),
                        "original_status": original.status.as_str(),
                        "original_end_date": date_value(original.end_date),
                    }))
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        let original_items = self.contract_repo.list_items(&mut *tx, original.id).await?;
        let items = renewal_items(&original_items, terms.start_date, terms.end_date);
        self.insert_items(&mut tx, &renewed, &items, actor_id).await?;

        tx.commit().await?;

        tracing::info!(
            original_id = %original.id,
            renewed_id = %renewed.id,
            %contract_no,
            %actor_id,
            "Contrato renovado"
        );
        Ok(renewed)
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn get(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Contract, AppError> {
        self.audit
            .settle(async {
                let mut conn = self.pool.acquire().await?;
                self.guard
                    .load_contract(&mut conn, contract_id, tenant_id, actor_id, "get_contract")
                    .await
            })
            .await
    }

    pub async fn list_items(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Vec<ContractItem>, AppError> {
        self.audit
            .settle(async {
                let mut conn = self.pool.acquire().await?;
                self.guard
                    .load_contract(&mut conn, contract_id, tenant_id, actor_id, "list_contract_items")
                    .await?;
                self.contract_repo.list_items(&mut *conn, contract_id).await
            })
            .await
    }

    /// Cadeia de hashes e sequência de ações exigidas de um contrato.
    pub async fn audit_report(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<ContractAuditReport, AppError> {
        let contract = self.get(contract_id, tenant_id, actor_id).await?;
        let chain = self
            .audit
            .verify_chain(Contract::OBJECT_TYPE, &contract.id.to_string())
            .await?;
        let sequence = self.audit.verify_contract_sequence(&contract).await?;

        if !chain.ok || !sequence.ok {
            tracing::warn!(%contract_id, chain_error = ?chain.error, missing = ?sequence.missing_actions, "Trilha de auditoria inconsistente");
        }
        Ok(ContractAuditReport { contract_id, chain, sequence })
    }

    // =========================================================================
    //  AUXILIARES
    // =========================================================================

    async fn transition(
        &self,
        contract_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
        next: ContractStatus,
        action: &'static str,
    ) -> Result<Contract, AppError> {
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;
        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, actor_id, action)
            .await?;
        contract.status.ensure_transition(next, contract_id)?;

        let updated = self.contract_repo.update_status(&mut *tx, contract_id, next).await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance(action, CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(actor_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %actor_id, from = contract.status.as_str(), to = next.as_str(), action, "Status do contrato alterado");
        Ok(updated)
    }

    async fn insert_items(
        &self,
        conn: &mut PgConnection,
        contract: &Contract,
        items: &[NewContractItem],
        actor_id: Uuid,
    ) -> Result<Vec<ContractItem>, AppError> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let row = self
                .contract_repo
                .insert_item(&mut *conn, contract.tenant_id, contract.id, item)
                .await?;
            self.audit
                .record(
                    &mut *conn,
                    AuditEntry::for_instance("create_contract_item", CONTRACT_MODULE, &row)
                        .tenant(contract.tenant_id)
                        .actor(actor_id),
                )
                .await?;
            created.push(row);
        }
        Ok(created)
    }

    async fn load_tenant(&self, conn: &mut PgConnection, tenant_id: Uuid) -> Result<Tenant, AppError> {
        self.tenant_repo
            .find_tenant(&mut *conn, tenant_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found("tenant", tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contract::{tests::sample_contract, PaymentCycle};
    use ContractStatus::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn terms(deposit: i64) -> ContractTerms {
        ContractTerms {
            start_date: d(2025, 1, 1),
            end_date: d(2025, 12, 31),
            monthly_rent: Decimal::new(500000, 2),
            deposit: Decimal::new(deposit, 0),
            payment_cycle: PaymentCycle::Quarterly,
        }
    }

    fn item(seq: i32, item_type: ContractItemType, status: ContractItemStatus) -> ContractItem {
        ContractItem {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            contract_id: Uuid::nil(),
            sequence_no: seq,
            item_type,
            calculation_type: CalculationType::Fixed,
            amount: Decimal::new(1200, 0),
            rate: Some(Decimal::new(5, 2)),
            period_start: d(2025, 1, 1),
            period_end: d(2025, 12, 31),
            payment_cycle: ItemCycle::Monthly,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn terms_validation_rejects_bad_input() {
        let mut t = terms(0);
        t.end_date = t.start_date;
        assert_eq!(validate_terms(&t).unwrap_err().code(), "INVALID_DATE_RANGE");

        let mut t = terms(0);
        t.monthly_rent = Decimal::ZERO;
        assert_eq!(validate_terms(&t).unwrap_err().code(), "INVALID_RENT");

        let t = terms(-1);
        assert_eq!(validate_terms(&t).unwrap_err().code(), "INVALID_DEPOSIT");

        assert!(validate_terms(&terms(0)).is_ok());
    }

    #[test]
    fn default_items_include_deposit_only_when_positive() {
        let with_deposit = default_items(&terms(10000), 1);
        assert_eq!(with_deposit.len(), 2);

        let rent = &with_deposit[0];
        assert_eq!(rent.item_type, ContractItemType::Rent);
        assert_eq!((rent.period_start, rent.period_end), (d(2025, 1, 1), d(2025, 12, 31)));
        assert_eq!(rent.payment_cycle, ItemCycle::Quarterly);

        let deposit = &with_deposit[1];
        assert_eq!(deposit.sequence_no, 2);
        assert_eq!(deposit.payment_cycle, ItemCycle::OneTime);
        assert_eq!(deposit.period_end, deposit.period_start);

        let without = default_items(&terms(0), 5);
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].sequence_no, 5);
    }

    #[test]
    fn renewal_clones_active_items_onto_new_term() {
        let original = vec![
            item(3, ContractItemType::Deposit, ContractItemStatus::Active),
            item(1, ContractItemType::Rent, ContractItemStatus::Active),
            item(2, ContractItemType::PropertyFee, ContractItemStatus::Inactive),
        ];
        let cloned = renewal_items(&original, d(2026, 1, 1), d(2026, 12, 31));

        assert_eq!(cloned.len(), 2);
        assert_eq!(cloned[0].item_type, ContractItemType::Rent);
        assert_eq!(cloned[0].sequence_no, 1);
        assert_eq!(cloned[0].rate, Some(Decimal::new(5, 2)));
        assert_eq!((cloned[0].period_start, cloned[0].period_end), (d(2026, 1, 1), d(2026, 12, 31)));
        assert_eq!(cloned[0].payment_cycle, ItemCycle::Monthly);

        assert_eq!(cloned[1].item_type, ContractItemType::Deposit);
        assert_eq!(cloned[1].sequence_no, 2);
        assert_eq!(cloned[1].payment_cycle, ItemCycle::OneTime);
        assert_eq!((cloned[1].period_start, cloned[1].period_end), (d(2026, 1, 1), d(2026, 1, 1)));
    }

    #[test]
    fn submission_requires_positive_rent() {
        let mut c = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Draft);
        assert!(check_submittable(&c).is_ok());
        c.monthly_rent = Decimal::ZERO;
        assert_eq!(check_submittable(&c).unwrap_err().code(), "CONTRACT_RENT_INVALID");
    }

    #[test]
    fn scenario_activating_expired_approved_contract_is_a_conflict() {
        let today = d(2025, 6, 15);
        let c = sample_contract(d(2024, 6, 15), d(2025, 6, 14), Approved);
        let err = check_activatable(&c, today).unwrap_err();
        assert_eq!(err.code(), "CONTRACT_EXPIRED_CONFLICT");
        assert_eq!(err.kind(), Some(crate::common::error::ErrorKind::StateConflict));
    }

    #[test]
    fn only_approved_contracts_activate() {
        let today = d(2025, 1, 1);
        let draft = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Draft);
        assert_eq!(check_activatable(&draft, today).unwrap_err().code(), "CONTRACT_STATUS_CONFLICT");

        let active = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Active);
        assert_eq!(check_activatable(&active, today).unwrap_err().code(), "CONTRACT_STATUS_CONFLICT");
    }

    #[test]
    fn scenario_second_overlapping_activation_fails() {
        let today = d(2024, 12, 1);
        let mut first = sample_contract(d(2025, 1, 1), d(2025, 6, 30), Approved);
        let mut second = sample_contract(d(2025, 3, 1), d(2025, 9, 30), Approved);
        second.shop_id = first.shop_id;

        assert!(check_activatable(&first, today).is_ok());
        first.status = Active;

        assert!(check_activatable(&second, today).is_ok());
        assert!(first.status == Active && second.overlaps(&first));
        let err = overlap_conflict(&second, &first);
        assert_eq!(err.code(), "CONTRACT_TIME_OVERLAP");
        assert_eq!(err.data().unwrap()["conflict_contract_id"], json!(first.id.to_string()));
        assert_eq!(err.data().unwrap()["conflict_range"]["end_date"], json!("2025-06-30"));
    }

    #[test]
    fn expiry_requires_end_date_in_the_past() {
        let c = sample_contract(d(2025, 1, 1), d(2025, 6, 30), Active);
        assert_eq!(check_expirable(&c, d(2025, 6, 30)).unwrap_err().code(), "CONTRACT_NOT_EXPIRED");
        assert!(check_expirable(&c, d(2025, 7, 1)).is_ok());
    }

    #[test]
    fn archive_rules() {
        let mut c = sample_contract(d(2025, 1, 1), d(2025, 6, 30), Active);
        assert_eq!(check_archivable(&c).unwrap_err().code(), "CONTRACT_STATUS_CONFLICT");

        c.status = Terminated;
        assert!(check_archivable(&c).is_ok());

        c.is_archived = true;
        assert_eq!(check_archivable(&c).unwrap_err().code(), "CONTRACT_ALREADY_ARCHIVED");
    }

    #[test]
    fn renewal_starts_the_day_after_original_end() {
        let c = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Expired);
        let t = renewal_terms(&c, d(2026, 12, 31)).unwrap();
        assert_eq!(t.start_date, d(2026, 1, 1));
        assert_eq!(t.end_date, d(2026, 12, 31));
        assert_eq!(t.monthly_rent, c.monthly_rent);

        assert_eq!(renewal_terms(&c, d(2025, 12, 31)).unwrap_err().code(), "INVALID_RENEWAL_DATE");

        let draft = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Draft);
        assert_eq!(renewal_terms(&draft, d(2026, 12, 31)).unwrap_err().code(), "CONTRACT_STATUS_CONFLICT");
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::models::approval::ApprovalTaskStatus;
    use crate::services::testing::{self, days_from_today};
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    #[sqlx::test(migrations = "./migrations")]
    async fn submit_without_flow_keeps_the_draft(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        let state = testing::app(pool.clone());
        let service = &state.contract_service;

        let draft = service
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        assert!(draft.contract_no.as_deref().is_some_and(|no| no.starts_with("CT-WF-")));

        let err = service.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap_err();
        assert_eq!(err.code(), "APPROVAL_FLOW_NOT_CONFIGURED");

        assert_eq!(testing::reload(&pool, draft.id).await.status, ContractStatus::Draft);
        let tasks = state.approval_service.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert!(tasks.is_empty());
        assert_eq!(testing::audit_actions(&pool, draft.id).await, vec!["create_contract"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn two_node_round_then_activation_leaves_a_verifiable_trail(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        testing::flow(&pool, t.tenant_id, &["OPERATION", "MANAGEMENT"]).await;
        let operation = testing::user(&pool, t.tenant_id, "op", Some("OPERATION")).await;
        let management = testing::user(&pool, t.tenant_id, "mg", Some("MANAGEMENT")).await;
        let state = testing::app(pool.clone());
        let (contracts, approvals) = (&state.contract_service, &state.approval_service);

        let draft = contracts
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        let after_first = approvals.approve(draft.id, operation, Some("ok"), t.tenant_id).await.unwrap();
        assert_eq!(after_first.status, ContractStatus::PendingReview);
        let tasks = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert_eq!(tasks.iter().filter(|task| task.status == ApprovalTaskStatus::Pending).count(), 1);

        let approved = approvals.approve(draft.id, management, None, t.tenant_id).await.unwrap();
        assert_eq!(approved.status, ContractStatus::Approved);

        let active = contracts.activate(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert_eq!(active.status, ContractStatus::Active);

        assert_eq!(
            testing::audit_actions(&pool, draft.id).await,
            vec![
                "create_contract",
                "submit_contract_review",
                "start_approval_round",
                "approve_contract",
                "approve_contract",
                "activate_contract",
            ]
        );
        let report = contracts.audit_report(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert!(report.chain.ok, "{:?}", report.chain);
        assert!(report.sequence.ok, "{:?}", report.sequence);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reviewer_with_wrong_role_changes_nothing(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        testing::flow(&pool, t.tenant_id, &["OPERATION"]).await;
        let intruder = testing::user(&pool, t.tenant_id, "sales", Some("SALES")).await;
        let state = testing::app(pool.clone());
        let (contracts, approvals) = (&state.contract_service, &state.approval_service);

        let draft = contracts
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        let before = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        let err = approvals.approve(draft.id, intruder, Some("ok"), t.tenant_id).await.unwrap_err();
        assert_eq!(err.code(), "APPROVAL_TASK_ROLE_MISMATCH");

        assert_eq!(testing::reload(&pool, draft.id).await.status, ContractStatus::PendingReview);
        let after = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert_eq!(after.len(), before.len());
        for (a, b) in after.iter().zip(&before) {
            assert_eq!((a.id, a.status, a.acted_by), (b.id, b.status, b.acted_by));
        }

        let actions = testing::audit_actions(&pool, draft.id).await;
        assert_eq!(actions.last().map(String::as_str), Some("approval_role_mismatch_blocked"));
        assert!(!actions.iter().any(|a| a == "approve_contract"));
        assert!(contracts.audit_report(draft.id, t.tenant_id, t.operator_id).await.unwrap().chain.ok);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_overlapping_activations_admit_only_one(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        let state = testing::app(pool.clone());
        let service = &state.contract_service;

        let first = service
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(170)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        let second = service
            .create_draft(t.shop_id, testing::terms(days_from_today(30), days_from_today(250)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        testing::force_status(&pool, first.id, ContractStatus::Approved).await;
        testing::force_status(&pool, second.id, ContractStatus::Approved).await;

        let (a, b) = tokio::join!(
            service.activate(first.id, t.tenant_id, t.operator_id),
            service.activate(second.id, t.tenant_id, t.operator_id),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.code(), "CONTRACT_TIME_OVERLAP");

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE shop_id = $1 AND status = 'ACTIVE'")
            .bind(t.shop_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(active, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn cross_tenant_reads_are_audited_on_a_tight_pool(pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
        let pool = pool_opts
            .max_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(1))
            .connect_with(connect_opts)
            .await
            .unwrap();
        let owner = testing::tenancy(&pool, "wf").await;
        let other = testing::tenancy(&pool, "xx").await;
        let state = testing::app(pool.clone());
        let service = &state.contract_service;

        let draft = service
            .create_draft(owner.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), owner.tenant_id, owner.operator_id)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            service.get(draft.id, other.tenant_id, other.operator_id),
            service.get(draft.id, other.tenant_id, other.operator_id),
        );
        assert_eq!(a.unwrap_err().code(), "RESOURCE_NOT_FOUND");
        assert_eq!(b.unwrap_err().code(), "RESOURCE_NOT_FOUND");

        assert_eq!(testing::count_actions(&pool, "cross_tenant_access_blocked").await, 2);
        let report = service.audit_report(draft.id, owner.tenant_id, owner.operator_id).await.unwrap();
        assert!(report.chain.ok, "{:?}", report.chain);
        assert_eq!(report.chain.checked, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn numbering_continues_after_legacy_numbers_of_the_same_prefix(pool: PgPool) {
        let t = testing::tenancy(&pool, "w_f").await;
        let state = testing::app(pool.clone());
        let repo = ContractRepository::new();
        let legacy_terms = testing::terms(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());

        for no in ["CT-W_F-2025-000041", "CT-WXF-2025-000500", "CT-W_F-2025-LEGADO"] {
            repo.insert(&pool, t.tenant_id, t.shop_id, Some(no), &legacy_terms, t.operator_id, None)
                .await
                .unwrap();
        }

        let draft = state
            .contract_service
            .create_draft(
                t.shop_id,
                testing::terms(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
                t.tenant_id,
                t.operator_id,
            )
            .await
            .unwrap();
        assert_eq!(draft.contract_no.as_deref(), Some("CT-W_F-2025-000042"));
    }
}
