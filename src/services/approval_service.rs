// src/services/approval_service.rs

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_transaction, error::AppError},
    db::{ApprovalRepository, ContractRepository, UserRepository},
    models::{
        approval::{ApprovalFlowNode, ApprovalTargetType, ApprovalTask, ApprovalTaskStatus, NewApprovalTask},
        audit::{AuditEntry, Auditable},
        auth::User,
        contract::{Contract, ContractStatus},
    },
    services::{
        audit_service::{AuditService, CONTRACT_MODULE},
        tenant_guard::TenantGuard,
    },
};

pub const AUTO_SKIP_COMMENT: &str = "auto-skipped due to prior rejection";

// =============================================================================
//  REGRAS PURAS
// =============================================================================

pub fn next_round_no(max_round: Option<i32>) -> i32 {
    max_round.unwrap_or(0) + 1
}

/// Uma tarefa PENDING por nó ativo, na ordem configurada.
pub fn plan_round(
    nodes: &[ApprovalFlowNode],
    round_no: i32,
    now: DateTime<Utc>,
    contract_id: Uuid,
) -> Result<Vec<NewApprovalTask>, AppError> {
    if nodes.is_empty() {
        return Err(AppError::validation(
            "APPROVAL_FLOW_NOT_CONFIGURED",
            "Nenhum fluxo de aprovação ativo configurado para contratos",
            json!({ "target_model": "contract", "target_id": contract_id.to_string() }),
        ));
    }

    let mut ordered: Vec<&ApprovalFlowNode> = nodes.iter().collect();
    ordered.sort_by_key(|n| n.order_no);

    Ok(ordered
        .into_iter()
        .map(|node| NewApprovalTask {
            round_no,
            order_no: node.order_no,
            node_name: node.node_name.clone(),
            approver_role: node.approver_role.clone(),
            assigned_to: node.approver_user_id,
            sla_due_at: node.sla_hours.map(|h| now + Duration::hours(i64::from(h))),
        })
        .collect())
}

/// O "nó atual": a tarefa PENDING de menor ordem na rodada mais alta.
pub fn current_task(tasks: &[ApprovalTask]) -> Option<&ApprovalTask> {
    let round = tasks.iter().map(|t| t.round_no).max()?;
    tasks
        .iter()
        .filter(|t| t.round_no == round && t.is_pending())
        .min_by_key(|t| t.order_no)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Allowed,
    AssigneeMismatch,
    RoleMismatch,
}

/// Aprovador designado tem precedência sobre o papel; superusuário só
/// dispensa a designação nominal.
pub fn check_eligibility(task: &ApprovalTask, reviewer: &User) -> Eligibility {
    if let Some(assigned_to) = task.assigned_to {
        if reviewer.id == assigned_to || reviewer.is_superuser {
            return Eligibility::Allowed;
        }
        return Eligibility::AssigneeMismatch;
    }
    match task.approver_role.as_deref() {
        Some(role) if !reviewer.has_role(role) => Eligibility::RoleMismatch,
        _ => Eligibility::Allowed,
    }
}

/// Status do contrato depois de aprovar `current`: só fica APPROVED quando
/// não sobra nenhuma tarefa pendente na rodada.
pub fn approval_outcome(round: &[ApprovalTask], current: Uuid) -> ContractStatus {
    let still_pending = round.iter().any(|t| t.id != current && t.is_pending());
    if still_pending { ContractStatus::PendingReview } else { ContractStatus::Approved }
}

/// Tarefas a marcar numa rejeição: a atual REJECTED, as demais pendentes SKIPPED.
pub fn rejection_plan(round: &[ApprovalTask], current: Uuid) -> Vec<(Uuid, ApprovalTaskStatus)> {
    round
        .iter()
        .filter(|t| t.is_pending())
        .map(|t| {
            let status = if t.id == current { ApprovalTaskStatus::Rejected } else { ApprovalTaskStatus::Skipped };
            (t.id, status)
        })
        .collect()
}

fn task_not_found(contract_id: Uuid) -> AppError {
    AppError::not_found(
        "APPROVAL_TASK_NOT_FOUND",
        "Nenhuma tarefa de aprovação pendente para o contrato",
        json!({ "target_model": "approval_task", "contract_id": contract_id.to_string() }),
    )
}

// =============================================================================
//  SERVIÇO
// =============================================================================

#[derive(Clone)]
pub struct ApprovalService {
    pool: PgPool,
    lock_timeout_ms: u64,
    approval_repo: ApprovalRepository,
    contract_repo: ContractRepository,
    user_repo: UserRepository,
    audit: AuditService,
    guard: TenantGuard,
}

impl ApprovalService {
    pub fn new(
        pool: PgPool,
        lock_timeout_ms: u64,
        approval_repo: ApprovalRepository,
        contract_repo: ContractRepository,
        user_repo: UserRepository,
        audit: AuditService,
        guard: TenantGuard,
    ) -> Self {
        Self { pool, lock_timeout_ms, approval_repo, contract_repo, user_repo, audit, guard }
    }

    /// Abre uma nova rodada dentro da transação da submissão.
    pub async fn open_round(
        &self,
        conn: &mut PgConnection,
        contract: &Contract,
        actor_id: Uuid,
    ) -> Result<Vec<ApprovalTask>, AppError> {
        let nodes = self
            .approval_repo
            .list_active_nodes(&mut *conn, contract.tenant_id, ApprovalTargetType::Contract)
            .await?;
        let max_round = self.approval_repo.max_round(&mut *conn, contract.id).await?;
        let round_no = next_round_no(max_round);
        let planned = plan_round(&nodes, round_no, Utc::now(), contract.id)?;

        let mut tasks = Vec::with_capacity(planned.len());
        for new_task in &planned {
            let task = self
                .approval_repo
                .insert_task(&mut *conn, contract.tenant_id, contract.id, new_task)
                .await?;
            self.audit
                .record(
                    &mut *conn,
                    AuditEntry::for_instance("create_approval_task", CONTRACT_MODULE, &task)
                        .tenant(contract.tenant_id)
                        .actor(actor_id),
                )
                .await?;
            tasks.push(task);
        }

        self.audit
            .record(
                &mut *conn,
                AuditEntry::new("start_approval_round", CONTRACT_MODULE)
                    .object(Contract::OBJECT_TYPE, contract.id)
                    .tenant(contract.tenant_id)
                    .actor(actor_id)
                    .after(json!({
                        "round_no": round_no,
                        "task_count": tasks.len(),
                        "task_ids": tasks.iter().map(|t| t.id.to_string()).collect::<Vec<_>>(),
                    })),
            )
            .await?;

        tracing::info!(contract_id = %contract.id, round_no, tasks = tasks.len(), "Rodada de aprovação aberta");
        Ok(tasks)
    }

    pub async fn approve(
        &self,
        contract_id: Uuid,
        reviewer_id: Uuid,
        comment: Option<&str>,
        tenant_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit
            .settle(self.approve_inner(contract_id, reviewer_id, comment, tenant_id))
            .await
    }

    pub async fn reject(
        &self,
        contract_id: Uuid,
        reviewer_id: Uuid,
        reason: &str,
        tenant_id: Uuid,
    ) -> Result<Contract, AppError> {
        self.audit
            .settle(self.reject_inner(contract_id, reviewer_id, reason, tenant_id))
            .await
    }

    pub async fn list_tasks(&self, contract_id: Uuid, tenant_id: Uuid, actor_id: Uuid) -> Result<Vec<ApprovalTask>, AppError> {
        self.audit
            .settle(async {
                let mut conn = self.pool.acquire().await?;
                self.guard
                    .load_contract(&mut conn, contract_id, tenant_id, actor_id, "list_approval_tasks")
                    .await?;
                self.approval_repo.list_tasks(&mut *conn, contract_id).await
            })
            .await
    }

    async fn approve_inner(
        &self,
        contract_id: Uuid,
        reviewer_id: Uuid,
        comment: Option<&str>,
        tenant_id: Uuid,
    ) -> Result<Contract, AppError> {
        let reviewer = self.load_reviewer(reviewer_id).await?;
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;

        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, reviewer_id, "approve_contract")
            .await?;
        let round = self.approval_repo.lock_current_round(&mut *tx, contract_id).await?;

        // Sem tarefa pendente vem antes do status: reaprovar nunca passa em silêncio
        let Some(task) = current_task(&round).cloned() else {
            return Err(task_not_found(contract_id));
        };
        contract.status.ensure_transition(ContractStatus::Approved, contract_id)?;

        if let Err(e) = ensure_eligible(&task, &reviewer, &contract) {
            tx.rollback().await?;
            return Err(e);
        }

        let now = Utc::now();
        let updated_task = self
            .approval_repo
            .mark_task(&mut *tx, task.id, ApprovalTaskStatus::Approved, reviewer_id, now, comment)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("approve_approval_task", CONTRACT_MODULE, &updated_task)
                    .before(task.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(reviewer_id),
            )
            .await?;

        let next_status = approval_outcome(&round, task.id);
        let updated = self
            .contract_repo
            .update_review(&mut *tx, contract_id, next_status, Some(reviewer_id), Some(now), comment)
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("approve_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(reviewer_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            %contract_id,
            %reviewer_id,
            node = %task.node_name,
            from = contract.status.as_str(),
            to = next_status.as_str(),
            "Nó de aprovação aprovado"
        );
        Ok(updated)
    }

    async fn reject_inner(
        &self,
        contract_id: Uuid,
        reviewer_id: Uuid,
        reason: &str,
        tenant_id: Uuid,
    ) -> Result<Contract, AppError> {
        let reviewer = self.load_reviewer(reviewer_id).await?;
        let mut tx = begin_transaction(&self.pool, self.lock_timeout_ms).await?;

        let contract = self
            .guard
            .lock_contract(&mut tx, contract_id, tenant_id, reviewer_id, "reject_contract")
            .await?;
        let round = self.approval_repo.lock_current_round(&mut *tx, contract_id).await?;

        let Some(task) = current_task(&round).cloned() else {
            return Err(task_not_found(contract_id));
        };
        contract.status.ensure_transition(ContractStatus::Rejected, contract_id)?;

        if let Err(e) = ensure_eligible(&task, &reviewer, &contract) {
            tx.rollback().await?;
            return Err(e);
        }

        let reason = reason.trim();
        if reason.is_empty() {
            tx.rollback().await?;
            tracing::warn!(%contract_id, %reviewer_id, "Rejeição sem motivo bloqueada");
            return Err(AppError::blocked(
                AppError::validation(
                    "REJECTION_REASON_EMPTY",
                    "O motivo da rejeição é obrigatório",
                    json!({ "target_model": "contract", "target_id": contract_id.to_string() }),
                ),
                AuditEntry::new("reject_reason_empty_blocked", CONTRACT_MODULE)
                    .object(Contract::OBJECT_TYPE, contract_id)
                    .tenant(tenant_id)
                    .actor(reviewer_id)
                    .after(json!({ "task_id": task.id.to_string(), "node_name": task.node_name })),
            ));
        }

        let now = Utc::now();
        for (task_id, status) in rejection_plan(&round, task.id) {
            let before = round.iter().find(|t| t.id == task_id).map(|t| t.audit_snapshot());
            let (action, comment) = match status {
                ApprovalTaskStatus::Rejected => ("reject_approval_task", reason),
                _ => ("skip_approval_task", AUTO_SKIP_COMMENT),
            };
            let marked = self
                .approval_repo
                .mark_task(&mut *tx, task_id, status, reviewer_id, now, Some(comment))
                .await?;

            let mut entry = AuditEntry::for_instance(action, CONTRACT_MODULE, &marked)
                .tenant(tenant_id)
                .actor(reviewer_id);
            if let Some(before) = before {
                entry = entry.before(before);
            }
            self.audit.record(&mut tx, entry).await?;
        }

        let updated = self
            .contract_repo
            .update_review(&mut *tx, contract_id, ContractStatus::Rejected, Some(reviewer_id), Some(now), Some(reason))
            .await?;
        self.audit
            .record(
                &mut tx,
                AuditEntry::for_instance("reject_contract", CONTRACT_MODULE, &updated)
                    .before(contract.audit_snapshot())
                    .tenant(tenant_id)
                    .actor(reviewer_id),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(%contract_id, %reviewer_id, node = %task.node_name, "Contrato rejeitado");
        Ok(updated)
    }

    async fn load_reviewer(&self, reviewer_id: Uuid) -> Result<User, AppError> {
        self.user_repo
            .find_by_id(reviewer_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found("user", reviewer_id))
    }
}

// Divergências de papel ou designação são tentativas de autorização:
// ficam na trilha mesmo com a operação desfeita.
fn ensure_eligible(task: &ApprovalTask, reviewer: &User, contract: &Contract) -> Result<(), AppError> {
    let (action, code, message) = match check_eligibility(task, reviewer) {
        Eligibility::Allowed => return Ok(()),
        Eligibility::AssigneeMismatch => (
            "approval_assignee_mismatch_blocked",
            "APPROVAL_TASK_ASSIGNEE_MISMATCH",
            "Esta tarefa está designada a outro aprovador",
        ),
        Eligibility::RoleMismatch => (
            "approval_role_mismatch_blocked",
            "APPROVAL_TASK_ROLE_MISMATCH",
            "O papel do aprovador não corresponde ao exigido pelo nó",
        ),
    };

    let data = json!({
        "target_model": "approval_task",
        "task_id": task.id.to_string(),
        "node_name": task.node_name,
        "required_role": task.approver_role,
        "assigned_to": task.assigned_to.map(|id| id.to_string()),
        "reviewer_id": reviewer.id.to_string(),
        "reviewer_role": reviewer.role_type,
    });

    tracing::warn!(contract_id = %contract.id, reviewer_id = %reviewer.id, code, "Aprovação bloqueada");
    let entry = AuditEntry::new(action, CONTRACT_MODULE)
        .object(Contract::OBJECT_TYPE, contract.id)
        .tenant(contract.tenant_id)
        .actor(reviewer.id)
        .after(data.clone());

    Err(AppError::blocked(AppError::conflict(code, message, data), entry))
}


#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::testing::{self, days_from_today};

    #[sqlx::test(migrations = "./migrations")]
    async fn rejection_skips_the_rest_and_resubmission_opens_a_fresh_round(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        testing::flow(&pool, t.tenant_id, &["OPERATION", "LEGAL", "MANAGEMENT"]).await;
        let operation = testing::user(&pool, t.tenant_id, "op", Some("OPERATION")).await;
        let state = testing::app(pool.clone());
        let (contracts, approvals) = (&state.contract_service, &state.approval_service);

        let draft = contracts
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        let rejected = approvals
            .reject(draft.id, operation, "incomplete documents", t.tenant_id)
            .await
            .unwrap();
        assert_eq!(rejected.status, ContractStatus::Rejected);

        let round_one = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        let mut statuses: Vec<(i32, ApprovalTaskStatus)> = round_one.iter().map(|task| (task.order_no, task.status)).collect();
        statuses.sort_by_key(|(order, _)| *order);
        assert_eq!(
            statuses,
            vec![(1, ApprovalTaskStatus::Rejected), (2, ApprovalTaskStatus::Skipped), (3, ApprovalTaskStatus::Skipped)]
        );

        contracts.revise(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        let all = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        let round_two: Vec<&ApprovalTask> = all.iter().filter(|task| task.round_no == 2).collect();
        assert_eq!(round_two.len(), 3);
        assert!(round_two.iter().all(|task| task.is_pending()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_rejection_reason_is_audited_after_the_rollback(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        testing::flow(&pool, t.tenant_id, &["OPERATION"]).await;
        let operation = testing::user(&pool, t.tenant_id, "op", Some("OPERATION")).await;
        let state = testing::app(pool.clone());
        let (contracts, approvals) = (&state.contract_service, &state.approval_service);

        let draft = contracts
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        let err = approvals.reject(draft.id, operation, "   ", t.tenant_id).await.unwrap_err();
        assert_eq!(err.code(), "REJECTION_REASON_EMPTY");

        assert_eq!(testing::reload(&pool, draft.id).await.status, ContractStatus::PendingReview);
        let tasks = approvals.list_tasks(draft.id, t.tenant_id, t.operator_id).await.unwrap();
        assert!(tasks.iter().all(|task| task.is_pending()));

        let actions = testing::audit_actions(&pool, draft.id).await;
        assert_eq!(actions.last().map(String::as_str), Some("reject_reason_empty_blocked"));
        assert!(contracts.audit_report(draft.id, t.tenant_id, t.operator_id).await.unwrap().chain.ok);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn approving_twice_reports_the_missing_task(pool: PgPool) {
        let t = testing::tenancy(&pool, "wf").await;
        testing::flow(&pool, t.tenant_id, &["OPERATION"]).await;
        let operation = testing::user(&pool, t.tenant_id, "op", Some("OPERATION")).await;
        let state = testing::app(pool.clone());
        let (contracts, approvals) = (&state.contract_service, &state.approval_service);

        let draft = contracts
            .create_draft(t.shop_id, testing::terms(days_from_today(-10), days_from_today(300)), t.tenant_id, t.operator_id)
            .await
            .unwrap();
        contracts.submit_for_review(draft.id, t.tenant_id, t.operator_id).await.unwrap();

        approvals.approve(draft.id, operation, None, t.tenant_id).await.unwrap();
        let err = approvals.approve(draft.id, operation, None, t.tenant_id).await.unwrap_err();
        assert_eq!(err.code(), "APPROVAL_TASK_NOT_FOUND");
        assert_eq!(testing::reload(&pool, draft.id).await.status, ContractStatus::Approved);
    }
}
