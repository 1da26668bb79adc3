// src/db/approval_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::approval::{ApprovalFlowNode, ApprovalTargetType, ApprovalTask, ApprovalTaskStatus, NewApprovalTask},
};

const TASK_COLUMNS: &str = r#"
    id, tenant_id, contract_id, round_no, order_no, node_name,
    approver_role, assigned_to, status, acted_by, acted_at, comment,
    sla_due_at, created_at
"#;

#[derive(Clone, Default)]
pub struct ApprovalRepository;

impl ApprovalRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  CONFIGURAÇÃO DO FLUXO (somente leitura)
    // =========================================================================

    pub async fn list_active_nodes<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        target_type: ApprovalTargetType,
    ) -> Result<Vec<ApprovalFlowNode>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let nodes = sqlx::query_as::<_, ApprovalFlowNode>(
            r#"
            SELECT id, tenant_id, target_type, order_no, node_name,
                   approver_role, approver_user_id, sla_hours, is_active
            FROM approval_flow_nodes
            WHERE tenant_id = $1 AND target_type = $2 AND is_active = TRUE
            ORDER BY order_no
            "#,
        )
        .bind(tenant_id)
        .bind(target_type)
        .fetch_all(executor)
        .await?;

        Ok(nodes)
    }

    // =========================================================================
    //  TAREFAS
    // =========================================================================

    pub async fn max_round<'e, E>(&self, executor: E, contract_id: Uuid) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let round: Option<i32> =
            sqlx::query_scalar("SELECT MAX(round_no) FROM approval_tasks WHERE contract_id = $1")
                .bind(contract_id)
                .fetch_one(executor)
                .await?;

        Ok(round)
    }

    pub async fn insert_task<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        contract_id: Uuid,
        task: &NewApprovalTask,
    ) -> Result<ApprovalTask, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO approval_tasks (
                tenant_id, contract_id, round_no, order_no, node_name,
                approver_role, assigned_to, status, sla_due_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, ApprovalTask>(&sql)
            .bind(tenant_id)
            .bind(contract_id)
            .bind(task.round_no)
            .bind(task.order_no)
            .bind(&task.node_name)
            .bind(task.approver_role.as_deref())
            .bind(task.assigned_to)
            .bind(ApprovalTaskStatus::Pending)
            .bind(task.sla_due_at)
            .fetch_one(executor)
            .await?;

        Ok(task)
    }

    /// Trava todas as tarefas da rodada mais recente do contrato, em ordem.
    pub async fn lock_current_round<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ApprovalTask>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {} FROM approval_tasks
            WHERE contract_id = $1
              AND round_no = (SELECT MAX(round_no) FROM approval_tasks WHERE contract_id = $1)
            ORDER BY order_no
            FOR UPDATE
            "#,
            TASK_COLUMNS
        );
        let tasks = sqlx::query_as::<_, ApprovalTask>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;

        Ok(tasks)
    }

    pub async fn mark_task<'e, E>(
        &self,
        executor: E,
        task_id: Uuid,
        status: ApprovalTaskStatus,
        acted_by: Uuid,
        acted_at: DateTime<Utc>,
        comment: Option<&str>,
    ) -> Result<ApprovalTask, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE approval_tasks
            SET status = $1, acted_by = $2, acted_at = $3, comment = $4
            WHERE id = $5
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, ApprovalTask>(&sql)
            .bind(status)
            .bind(acted_by)
            .bind(acted_at)
            .bind(comment)
            .bind(task_id)
            .fetch_one(executor)
            .await?;

        Ok(task)
    }

    pub async fn list_tasks<'e, E>(&self, executor: E, contract_id: Uuid) -> Result<Vec<ApprovalTask>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM approval_tasks WHERE contract_id = $1 ORDER BY round_no, order_no",
            TASK_COLUMNS
        );
        let tasks = sqlx::query_as::<_, ApprovalTask>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;

        Ok(tasks)
    }
}
