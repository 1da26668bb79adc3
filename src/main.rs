//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Settings};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

fn contract_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::contracts::create_contract))
        .route(
            "/{id}",
            get(handlers::contracts::get_contract).put(handlers::contracts::update_contract),
        )
        .route("/{id}/items", get(handlers::contracts::list_items))
        // Revisão e aprovação
        .route("/{id}/submit", post(handlers::contracts::submit_contract))
        .route("/{id}/approve", post(handlers::contracts::approve_contract))
        .route("/{id}/reject", post(handlers::contracts::reject_contract))
        .route("/{id}/revise", post(handlers::contracts::revise_contract))
        .route("/{id}/approval-tasks", get(handlers::contracts::list_approval_tasks))
        // Ciclo de vida
        .route("/{id}/activate", post(handlers::contracts::activate_contract))
        .route("/{id}/terminate", post(handlers::contracts::terminate_contract))
        .route("/{id}/expire", post(handlers::contracts::expire_contract))
        .route("/{id}/archive", post(handlers::contracts::archive_contract))
        .route("/{id}/renew", post(handlers::contracts::renew_contract))
        // Anexos e assinaturas
        .route(
            "/{id}/attachments",
            post(handlers::attachments::upload_attachment).get(handlers::attachments::list_attachments),
        )
        .route(
            "/{id}/signatures",
            post(handlers::attachments::create_signature).get(handlers::attachments::list_signatures),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar
    let settings = Settings::from_env()?;
    let app_state = AppState::new(settings).await?;
    let bind_addr = app_state.settings.bind_addr.clone();

    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Tudo sob /api exige o Bearer token; o tenant vem do cabeçalho em cada handler
    let api_routes = Router::new()
        .nest("/contracts", contract_routes())
        .route("/audit/contracts/{id}/verify", get(handlers::audit::verify_contract))
        .route(
            "/admin/contract-numbers/backfill",
            post(handlers::admin::backfill_contract_numbers),
        )
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .with_state(app_state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
