// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Contratos ---
        handlers::contracts::create_contract,
        handlers::contracts::get_contract,
        handlers::contracts::update_contract,
        handlers::contracts::list_items,
        handlers::contracts::activate_contract,
        handlers::contracts::terminate_contract,
        handlers::contracts::expire_contract,
        handlers::contracts::archive_contract,
        handlers::contracts::renew_contract,

        // --- Aprovação ---
        handlers::contracts::submit_contract,
        handlers::contracts::approve_contract,
        handlers::contracts::reject_contract,
        handlers::contracts::revise_contract,
        handlers::contracts::list_approval_tasks,

        // --- Anexos ---
        handlers::attachments::upload_attachment,
        handlers::attachments::list_attachments,
        handlers::attachments::create_signature,
        handlers::attachments::list_signatures,

        // --- Auditoria ---
        handlers::audit::verify_contract,

        // --- Administração ---
        handlers::admin::backfill_contract_numbers,
    ),
    components(
        schemas(
            // --- Contratos ---
            models::contract::ContractStatus,
            models::contract::PaymentCycle,
            models::contract::ItemCycle,
            models::contract::ContractItemType,
            models::contract::CalculationType,
            models::contract::ContractItemStatus,
            models::contract::Contract,
            models::contract::ContractItem,

            // --- Aprovação ---
            models::approval::ApprovalTaskStatus,
            models::approval::ApprovalTask,

            // --- Anexos ---
            models::attachment::AttachmentType,
            models::attachment::SignatureParty,
            models::attachment::SignatureMethod,
            models::attachment::ContractAttachment,
            models::attachment::ContractSignature,

            // --- Auditoria ---
            models::audit::ChainVerification,
            models::audit::SequenceVerification,
            models::audit::ContractAuditReport,

            // --- Administração ---
            services::sequence_service::BackfillPreview,
            services::sequence_service::BackfillReport,

            // --- Payloads ---
            handlers::contracts::ContractTermsPayload,
            handlers::contracts::CreateContractPayload,
            handlers::contracts::ApprovePayload,
            handlers::contracts::RejectPayload,
            handlers::contracts::TerminatePayload,
            handlers::contracts::RenewPayload,
            handlers::attachments::SignaturePayload,
            handlers::admin::BackfillPayload,
        )
    ),
    tags(
        (name = "Contratos", description = "Rascunho, ativação, encerramento e renovação"),
        (name = "Aprovação", description = "Envio para revisão e decisões das rodadas"),
        (name = "Anexos", description = "Versões de anexos e registros de assinatura"),
        (name = "Auditoria", description = "Verificação da trilha de auditoria"),
        (name = "Administração", description = "Manutenção de dados legados")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
