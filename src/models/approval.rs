// src/models/approval.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::audit::{instant_value, Auditable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_target_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalTargetType {
    Contract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalTaskStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl ApprovalTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalTaskStatus::Pending => "PENDING",
            ApprovalTaskStatus::Approved => "APPROVED",
            ApprovalTaskStatus::Rejected => "REJECTED",
            ApprovalTaskStatus::Skipped => "SKIPPED",
        }
    }
}

// ---
// Configuração do fluxo (somente leitura para este núcleo)
// ---
// Cada nó nomeia um papel OU um aprovador específico, e um SLA opcional.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalFlowNode {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub target_type: ApprovalTargetType,
    pub order_no: i32,
    #[schema(example = "Revisão Operacional")]
    pub node_name: String,
    #[schema(example = "OPERATION")]
    pub approver_role: Option<String>,
    pub approver_user_id: Option<Uuid>,
    #[schema(example = 24)]
    pub sla_hours: Option<i32>,
    pub is_active: bool,
}

// ---
// Tarefa: uma instância de um nó, em uma rodada, de um contrato
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalTask {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub round_no: i32,
    pub order_no: i32,
    pub node_name: String,
    pub approver_role: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub status: ApprovalTaskStatus,
    pub acted_by: Option<Uuid>,
    pub acted_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalTask {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalTaskStatus::Pending
    }
}

/// Tarefa planejada para uma nova rodada, ainda não persistida.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApprovalTask {
    pub round_no: i32,
    pub order_no: i32,
    pub node_name: String,
    pub approver_role: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub sla_due_at: Option<DateTime<Utc>>,
}

impl Auditable for ApprovalTask {
    const OBJECT_TYPE: &'static str = "approval_task";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "contract_id": self.contract_id.to_string(),
            "round_no": self.round_no,
            "order_no": self.order_no,
            "node_name": self.node_name,
            "approver_role": self.approver_role,
            "assigned_to": self.assigned_to.map(|id| id.to_string()),
            "status": self.status.as_str(),
            "acted_by": self.acted_by.map(|id| id.to_string()),
            "acted_at": instant_value(self.acted_at),
            "comment": self.comment,
            "sla_due_at": instant_value(self.sla_due_at),
        })
    }
}
