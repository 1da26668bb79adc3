// src/services/testing.rs

// Dados de apoio para os testes que rodam contra o Postgres (`#[sqlx::test]`)

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::{AppState, Settings},
    db::ContractRepository,
    models::contract::{Contract, ContractStatus, ContractTerms, PaymentCycle},
};

pub fn settings() -> Settings {
    Settings {
        database_url: String::new(),
        jwt_secret: "segredo-de-teste".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        db_max_connections: 5,
        db_acquire_timeout_secs: 3,
        db_lock_timeout_ms: 5000,
    }
}

pub fn app(pool: PgPool) -> AppState {
    AppState::assemble(pool, settings())
}

pub fn days_from_today(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}

pub fn terms(start_date: NaiveDate, end_date: NaiveDate) -> ContractTerms {
    ContractTerms {
        start_date,
        end_date,
        monthly_rent: Decimal::new(1_000_000, 2),
        deposit: Decimal::new(2_000_000, 2),
        payment_cycle: PaymentCycle::Monthly,
    }
}

/// Um tenant com uma loja e um operador, o mínimo para criar contratos.
pub struct Tenancy {
    pub tenant_id: Uuid,
    pub shop_id: Uuid,
    pub operator_id: Uuid,
}

pub async fn tenancy(pool: &PgPool, code: &str) -> Tenancy {
    let tenant_id: Uuid = sqlx::query_scalar("INSERT INTO tenants (name, code) VALUES ($1, $1) RETURNING id")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap();
    let shop_id: Uuid = sqlx::query_scalar("INSERT INTO shops (tenant_id, name) VALUES ($1, 'Loja 1') RETURNING id")
        .bind(tenant_id)
        .fetch_one(pool)
        .await
        .unwrap();
    let operator_id = user(pool, tenant_id, &format!("{}-operador", code), None).await;

    Tenancy { tenant_id, shop_id, operator_id }
}

pub async fn user(pool: &PgPool, tenant_id: Uuid, username: &str, role: Option<&str>) -> Uuid {
    sqlx::query_scalar("INSERT INTO users (tenant_id, username, role_type) VALUES ($1, $2, $3) RETURNING id")
        .bind(tenant_id)
        .bind(username)
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Configura o fluxo de aprovação do tenant com um nó por papel, na ordem dada.
pub async fn flow(pool: &PgPool, tenant_id: Uuid, roles: &[&str]) {
    for (index, role) in roles.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approval_flow_nodes (tenant_id, order_no, node_name, approver_role) VALUES ($1, $2, $3, $4)",
        )
        .bind(tenant_id)
        .bind(index as i32 + 1)
        .bind(format!("Revisão {}", role))
        .bind(*role)
        .execute(pool)
        .await
        .unwrap();
    }
}

/// Força o status direto na tabela, sem passar pelo fluxo (nem pela trilha).
pub async fn force_status(pool: &PgPool, contract_id: Uuid, status: ContractStatus) {
    sqlx::query("UPDATE contracts SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(contract_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn reload(pool: &PgPool, contract_id: Uuid) -> Contract {
    ContractRepository::new().find_by_id(pool, contract_id).await.unwrap().unwrap()
}

/// Ações gravadas na trilha do contrato, na ordem da cadeia.
pub async fn audit_actions(pool: &PgPool, contract_id: Uuid) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT action FROM audit_logs WHERE object_type = 'contract' AND object_id = $1 ORDER BY created_at, id",
    )
    .bind(contract_id.to_string())
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn count_actions(pool: &PgPool, action: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = $1")
        .bind(action)
        .fetch_one(pool)
        .await
        .unwrap()
}
