// src/services/tenant_guard.rs

use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ContractRepository, TenantRepository},
    models::{
        audit::{AuditEntry, Auditable},
        contract::Contract,
        tenancy::Shop,
    },
    services::audit_service::CONTRACT_MODULE,
};

/// Confere o tenant de toda entidade carregada antes de qualquer regra de negócio.
///
/// Uma divergência volta como `AppError::Blocked`; quem grava a tentativa é
/// o `AuditService::settle` do serviço chamador.
#[derive(Clone)]
pub struct TenantGuard {
    contract_repo: ContractRepository,
    tenant_repo: TenantRepository,
}

impl TenantGuard {
    pub fn new(contract_repo: ContractRepository, tenant_repo: TenantRepository) -> Self {
        Self { contract_repo, tenant_repo }
    }

    /// Trava o contrato e confere o tenant. Id inexistente e tenant alheio
    /// produzem o mesmo erro.
    pub async fn lock_contract(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
        service_action: &str,
    ) -> Result<Contract, AppError> {
        let contract = self
            .contract_repo
            .lock_by_id(&mut *conn, contract_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found(Contract::OBJECT_TYPE, contract_id))?;

        assert_tenant(&contract, contract.tenant_id, tenant_id, actor_id, service_action)?;
        Ok(contract)
    }

    /// Leitura sem lock, com a mesma checagem de tenant.
    pub async fn load_contract(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
        service_action: &str,
    ) -> Result<Contract, AppError> {
        let contract = self
            .contract_repo
            .find_by_id(&mut *conn, contract_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found(Contract::OBJECT_TYPE, contract_id))?;

        assert_tenant(&contract, contract.tenant_id, tenant_id, actor_id, service_action)?;
        Ok(contract)
    }

    pub async fn lock_shop(
        &self,
        conn: &mut PgConnection,
        shop_id: Uuid,
        tenant_id: Uuid,
        actor_id: Uuid,
        service_action: &str,
    ) -> Result<Shop, AppError> {
        let shop = self
            .tenant_repo
            .lock_shop(&mut *conn, shop_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found(Shop::OBJECT_TYPE, shop_id))?;

        assert_tenant(&shop, shop.tenant_id, tenant_id, actor_id, service_action)?;
        Ok(shop)
    }
}

/// Em caso de divergência não revela que o registro existe: devolve o mesmo
/// erro de um id inexistente, junto da entrada de auditoria da tentativa.
pub fn assert_tenant<T: Auditable>(
    entity: &T,
    actual_tenant_id: Uuid,
    expected_tenant_id: Uuid,
    actor_id: Uuid,
    service_action: &str,
) -> Result<(), AppError> {
    if actual_tenant_id == expected_tenant_id {
        return Ok(());
    }

    let target_id = entity.audit_object_id();
    tracing::warn!(
        target_model = T::OBJECT_TYPE,
        %target_id,
        %actor_id,
        %expected_tenant_id,
        %actual_tenant_id,
        service_action,
        "Acesso entre tenants bloqueado"
    );

    let entry = AuditEntry::new("cross_tenant_access_blocked", CONTRACT_MODULE)
        .object(T::OBJECT_TYPE, &target_id)
        .tenant(expected_tenant_id)
        .actor(actor_id)
        .before(json!({ "actual_tenant_id": actual_tenant_id.to_string() }))
        .after(json!({
            "expected_tenant_id": expected_tenant_id.to_string(),
            "service_action": service_action,
        }));

    Err(AppError::blocked(AppError::resource_not_found(T::OBJECT_TYPE, target_id), entry))
}
