// src/models/contract.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::audit::{date_value, decimal_value, instant_value, Auditable},
};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Active,
    Expired,
    Terminated,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::PendingReview => "PENDING_REVIEW",
            ContractStatus::Approved => "APPROVED",
            ContractStatus::Rejected => "REJECTED",
            ContractStatus::Active => "ACTIVE",
            ContractStatus::Expired => "EXPIRED",
            ContractStatus::Terminated => "TERMINATED",
        }
    }

    /// A tabela de transições: as únicas arestas legais da máquina de estados.
    pub fn allowed_next(&self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Draft => &[PendingReview],
            PendingReview => &[Approved, Rejected],
            Approved => &[Active],
            Rejected => &[Draft],
            Active => &[Expired, Terminated],
            Expired | Terminated => &[],
        }
    }

    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Falha com CONTRACT_STATUS_CONFLICT listando os próximos estados permitidos.
    pub fn ensure_transition(&self, next: ContractStatus, contract_id: Uuid) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        let allowed: Vec<&str> = self.allowed_next().iter().map(|s| s.as_str()).collect();
        Err(AppError::conflict(
            "CONTRACT_STATUS_CONFLICT",
            format!(
                "Contrato em {} não pode ir para {}",
                self.as_str(),
                next.as_str()
            ),
            json!({
                "target_model": "Contract",
                "target_id": contract_id.to_string(),
                "current_status": self.as_str(),
                "requested_status": next.as_str(),
                "allowed_next": allowed,
                "terminal": self.is_terminal(),
            }),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_cycle", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentCycle {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

// Ciclo de cobrança de um item: o do contrato ou uma cobrança única
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_cycle", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCycle {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    OneTime,
}

impl From<PaymentCycle> for ItemCycle {
    fn from(cycle: PaymentCycle) -> Self {
        match cycle {
            PaymentCycle::Monthly => ItemCycle::Monthly,
            PaymentCycle::Quarterly => ItemCycle::Quarterly,
            PaymentCycle::SemiAnnual => ItemCycle::SemiAnnual,
            PaymentCycle::Annual => ItemCycle::Annual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_item_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractItemType {
    Rent,
    PropertyFee,
    Deposit,
    RevenueShare,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "calculation_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationType {
    Fixed,
    Step,
    Escalation,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_item_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractItemStatus {
    Active,
    Inactive,
}

// --- Contrato ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub shop_id: Uuid,
    #[schema(example = "CT-WF-2025-000001")]
    pub contract_no: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[schema(example = "10000.00")]
    pub monthly_rent: Decimal,
    #[schema(example = "20000.00")]
    pub deposit: Decimal,
    pub payment_cycle: PaymentCycle,
    pub status: ContractStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comment: Option<String>,
    pub renewed_from_id: Option<Uuid>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Teste de sobreposição de intervalos semiabertos [start, end).
    pub fn overlaps(&self, other: &Contract) -> bool {
        other.start_date < self.end_date && other.end_date > self.start_date
    }
}

impl Auditable for Contract {
    const OBJECT_TYPE: &'static str = "contract";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "shop_id": self.shop_id.to_string(),
            "contract_no": self.contract_no,
            "start_date": date_value(self.start_date),
            "end_date": date_value(self.end_date),
            "monthly_rent": decimal_value(self.monthly_rent),
            "deposit": decimal_value(self.deposit),
            "payment_cycle": self.payment_cycle,
            "status": self.status.as_str(),
            "reviewed_by": self.reviewed_by.map(|id| id.to_string()),
            "reviewed_at": instant_value(self.reviewed_at),
            "review_comment": self.review_comment,
            "termination_reason": self.termination_reason,
            "is_archived": self.is_archived,
            "archived_at": instant_value(self.archived_at),
        })
    }
}

// Termos editáveis de um rascunho (criação e atualização)
#[derive(Debug, Clone, Copy)]
pub struct ContractTerms {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    pub deposit: Decimal,
    pub payment_cycle: PaymentCycle,
}

// --- Itens do contrato ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractItem {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub sequence_no: i32,
    pub item_type: ContractItemType,
    pub calculation_type: CalculationType,
    pub amount: Decimal,
    pub rate: Option<Decimal>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub payment_cycle: ItemCycle,
    pub status: ContractItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Item ainda não persistido.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContractItem {
    pub sequence_no: i32,
    pub item_type: ContractItemType,
    pub calculation_type: CalculationType,
    pub amount: Decimal,
    pub rate: Option<Decimal>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub payment_cycle: ItemCycle,
}

impl Auditable for ContractItem {
    const OBJECT_TYPE: &'static str = "contract_item";

    fn audit_object_id(&self) -> String {
        self.id.to_string()
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "contract_id": self.contract_id.to_string(),
            "sequence_no": self.sequence_no,
            "item_type": self.item_type,
            "calculation_type": self.calculation_type,
            "amount": decimal_value(self.amount),
            "rate": self.rate.map(decimal_value),
            "period_start": date_value(self.period_start),
            "period_end": date_value(self.period_end),
            "payment_cycle": self.payment_cycle,
            "status": self.status,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ContractStatus::*;

    const ALL: [ContractStatus; 7] = [Draft, PendingReview, Approved, Rejected, Active, Expired, Terminated];

    pub(crate) fn sample_contract(start: NaiveDate, end: NaiveDate, status: ContractStatus) -> Contract {
        Contract {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            contract_no: None,
            start_date: start,
            end_date: end,
            monthly_rent: Decimal::new(1000000, 2),
            deposit: Decimal::new(2000000, 2),
            payment_cycle: PaymentCycle::Monthly,
            status,
            reviewed_by: None,
            reviewed_at: None,
            review_comment: None,
            renewed_from_id: None,
            terminated_at: None,
            termination_reason: None,
            is_archived: false,
            archived_at: None,
            archived_by: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn transition_table_has_exactly_the_legal_edges() {
        let legal = [
            (Draft, PendingReview),
            (PendingReview, Approved),
            (PendingReview, Rejected),
            (Approved, Active),
            (Rejected, Draft),
            (Active, Expired),
            (Active, Terminated),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn draft_never_jumps_to_active() {
        let err = Draft.ensure_transition(Active, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "CONTRACT_STATUS_CONFLICT");
        assert_eq!(err.data().unwrap()["allowed_next"], json!(["PENDING_REVIEW"]));
    }

    #[test]
    fn expired_and_terminated_are_terminal() {
        assert!(Expired.is_terminal());
        assert!(Terminated.is_terminal());
        assert!(!Active.is_terminal());
    }

    #[test]
    fn status_strings_are_preserved_verbatim() {
        assert_eq!(serde_json::to_value(PendingReview).unwrap(), json!("PENDING_REVIEW"));
        assert_eq!(Terminated.as_str(), "TERMINATED");
    }

    #[test]
    fn half_open_intervals_overlap_check() {
        let a = sample_contract(d(2025, 1, 1), d(2025, 6, 30), Active);
        let b = sample_contract(d(2025, 3, 1), d(2025, 9, 30), Approved);
        let c = sample_contract(d(2025, 6, 30), d(2025, 12, 31), Approved);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        // fim exclusivo: começar no dia em que o outro termina não sobrepõe
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn snapshot_is_an_allow_list_with_string_decimals() {
        let c = sample_contract(d(2025, 1, 1), d(2025, 12, 31), Draft);
        let snap = c.audit_snapshot();
        assert_eq!(snap["monthly_rent"], json!("10000.00"));
        assert_eq!(snap["start_date"], json!("2025-01-01"));
        assert_eq!(snap["status"], json!("DRAFT"));
        assert!(snap.get("tenant_id").is_none());
        assert!(snap.get("created_at").is_none());
    }
}
