// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, str::FromStr, time::Duration};

use crate::{
    db::{
        ApprovalRepository, AttachmentRepository, AuditRepository, ContractRepository, SequenceRepository,
        TenantRepository, UserRepository,
    },
    services::{
        approval_service::ApprovalService, attachment_service::AttachmentService, audit_service::AuditService,
        auth::AuthService, contract_service::ContractService, sequence_service::SequenceService,
        tenant_guard::TenantGuard,
    },
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 3;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    // Aplicado com SET LOCAL em cada transação de escrita
    pub db_lock_timeout_ms: u64,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} com valor inválido: {}", key, raw)),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            db_acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", DEFAULT_ACQUIRE_TIMEOUT_SECS)?,
            db_lock_timeout_ms: parse_or(&lookup, "DB_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Settings,
    pub auth_service: AuthService,
    pub sequence_service: SequenceService,
    pub approval_service: ApprovalService,
    pub contract_service: ContractService,
    pub attachment_service: AttachmentService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(settings.db_acquire_timeout_secs))
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self::assemble(db_pool, settings))
    }

    // --- Monta o gráfico de dependências ---
    pub(crate) fn assemble(db_pool: PgPool, settings: Settings) -> Self {
        let lock_timeout_ms = settings.db_lock_timeout_ms;

        let user_repo = UserRepository::new(db_pool.clone());
        let tenant_repo = TenantRepository::new(db_pool.clone());
        let contract_repo = ContractRepository::new();

        let auth_service = AuthService::new(user_repo.clone(), settings.jwt_secret.clone());
        let audit_service = AuditService::new(db_pool.clone(), AuditRepository::new(), lock_timeout_ms);
        let guard = TenantGuard::new(contract_repo.clone(), tenant_repo.clone());

        let sequence_service = SequenceService::new(
            db_pool.clone(),
            lock_timeout_ms,
            SequenceRepository::new(),
            contract_repo.clone(),
            tenant_repo.clone(),
        );
        let approval_service = ApprovalService::new(
            db_pool.clone(),
            lock_timeout_ms,
            ApprovalRepository::new(),
            contract_repo.clone(),
            user_repo,
            audit_service.clone(),
            guard.clone(),
        );
        let contract_service = ContractService::new(
            db_pool.clone(),
            lock_timeout_ms,
            contract_repo,
            tenant_repo,
            sequence_service.clone(),
            approval_service.clone(),
            audit_service.clone(),
            guard.clone(),
        );
        let attachment_service = AttachmentService::new(
            db_pool.clone(),
            lock_timeout_ms,
            AttachmentRepository::new(),
            audit_service,
            guard,
        );

        Self {
            db_pool,
            settings,
            auth_service,
            sequence_service,
            approval_service,
            contract_service,
            attachment_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let settings = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://db"), ("JWT_SECRET", "s")])).unwrap();
        assert_eq!(settings.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(settings.db_max_connections, 5);
        assert_eq!(settings.db_acquire_timeout_secs, 3);
        assert_eq!(settings.db_lock_timeout_ms, 5000);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("JWT_SECRET", "s"),
            ("DB_LOCK_TIMEOUT_MS", "250"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(settings.db_lock_timeout_ms, 250);
        assert_eq!(settings.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn missing_required_or_malformed_values_fail() {
        assert!(Settings::from_lookup(lookup(&[("JWT_SECRET", "s")])).is_err());
        assert!(Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("JWT_SECRET", "s"),
            ("DB_MAX_CONNECTIONS", "muitas"),
        ]))
        .is_err());
    }
}
