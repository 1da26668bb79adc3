// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::audit::AuditEntry;

// Códigos SQLSTATE que indicam disputa de bloqueio (tentar de novo é seguro)
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

/// As três famílias de erro de domínio que cruzam a fronteira do serviço.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    BusinessValidation,
    StateConflict,
}

#[derive(Debug, Error)]
pub enum AppError {
    // --- Domínio ---
    #[error("{message}")]
    NotFound {
        code: &'static str,
        message: String,
        data: Value,
    },

    #[error("{message}")]
    BusinessValidation {
        code: &'static str,
        message: String,
        data: Value,
    },

    #[error("{message}")]
    StateConflict {
        code: &'static str,
        message: String,
        data: Value,
    },

    /// Tentativa bloqueada que ainda precisa ir para a trilha. O serviço grava
    /// a entrada depois de liberar a conexão e devolve só o erro interno.
    #[error("{error}")]
    Blocked {
        error: Box<AppError>,
        entry: Box<AuditEntry>,
    },

    // --- Infraestrutura ---
    #[error("Erro de validação")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Tempo de espera por bloqueio excedido: {0}")]
    LockTimeout(String),

    #[error("Erro de banco de dados: {0}")]
    Database(sqlx::Error),

    #[error("Erro interno do servidor")]
    Internal(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn not_found(code: &'static str, message: impl Into<String>, data: Value) -> Self {
        AppError::NotFound { code, message: message.into(), data }
    }

    pub fn validation(code: &'static str, message: impl Into<String>, data: Value) -> Self {
        AppError::BusinessValidation { code, message: message.into(), data }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>, data: Value) -> Self {
        AppError::StateConflict { code, message: message.into(), data }
    }

    pub fn blocked(error: AppError, entry: AuditEntry) -> Self {
        AppError::Blocked { error: Box::new(error), entry: Box::new(entry) }
    }

    /// Erro padrão para um id que não existe no tenant do chamador.
    pub fn resource_not_found(target_model: &str, target_id: impl ToString) -> Self {
        Self::not_found(
            "RESOURCE_NOT_FOUND",
            format!("{} não encontrado", target_model),
            json!({ "target_model": target_model, "target_id": target_id.to_string() }),
        )
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::NotFound { .. } => Some(ErrorKind::NotFound),
            AppError::BusinessValidation { .. } => Some(ErrorKind::BusinessValidation),
            AppError::StateConflict { .. } => Some(ErrorKind::StateConflict),
            AppError::Blocked { error, .. } => error.kind(),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { code, .. }
            | AppError::BusinessValidation { code, .. }
            | AppError::StateConflict { code, .. } => code,
            AppError::Blocked { error, .. } => error.code(),
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidToken | AppError::Jwt(_) => "INVALID_TOKEN",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::LockTimeout(_) => "LOCK_TIMEOUT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            AppError::NotFound { data, .. }
            | AppError::BusinessValidation { data, .. }
            | AppError::StateConflict { data, .. } => Some(data),
            AppError::Blocked { error, .. } => error.data(),
            _ => None,
        }
    }

    /// Conflitos de estado e disputas de bloqueio podem ser repetidos após
    /// recarregar o estado atual; erros de validação exigem nova entrada.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Blocked { error, .. } => error.is_retryable(),
            other => matches!(other, AppError::StateConflict { .. } | AppError::LockTimeout(_)),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = e {
            return AppError::not_found("RESOURCE_NOT_FOUND", "Registro não encontrado", Value::Null);
        }

        if let Some(db_err) = e.as_database_error() {
            let sqlstate = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            if matches!(
                sqlstate.as_str(),
                LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED | SERIALIZATION_FAILURE
            ) {
                return AppError::LockTimeout(db_err.message().to_string());
            }

            // A constraint única é a última linha de defesa contra corridas
            if db_err.is_unique_violation() {
                return AppError::conflict(
                    "UNIQUE_CONSTRAINT_VIOLATION",
                    "Conflito de unicidade, recarregue e tente novamente",
                    json!({ "constraint": db_err.constraint() }),
                );
            }
        }

        AppError::Database(e)
    }
}

// Rejeição simples usada pelos extratores (cabeçalhos, contexto)
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Blocked { error, entry } = self {
            tracing::error!(action = %entry.action, "Tentativa bloqueada chegou à resposta sem ir para a trilha");
            return (*error).into_response();
        }

        let status = match &self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BusinessValidation { .. } => StatusCode::BAD_REQUEST,
            AppError::StateConflict { .. } => StatusCode::CONFLICT,
            AppError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidToken | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "code": self.code(),
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::Blocked { .. } | AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!("Erro Interno do Servidor: {:?}", self);
                let body = Json(json!({
                    "error": "Ocorreu um erro inesperado.",
                    "code": self.code(),
                }));
                return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "kind": self.kind(),
            "data": self.data(),
            "retryable": self.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_expose_kind_and_code() {
        let err = AppError::conflict("CONTRACT_TIME_OVERLAP", "sobreposição", json!({"shop_id": "x"}));
        assert_eq!(err.kind(), Some(ErrorKind::StateConflict));
        assert_eq!(err.code(), "CONTRACT_TIME_OVERLAP");
        assert!(err.is_retryable());

        let err = AppError::validation("INVALID_DATE_RANGE", "datas", Value::Null);
        assert_eq!(err.kind(), Some(ErrorKind::BusinessValidation));
        assert!(!err.is_retryable());
    }

    #[test]
    fn resource_not_found_carries_target() {
        let err = AppError::resource_not_found("Contract", 42);
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        assert_eq!(err.data().unwrap()["target_id"], "42");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn blocked_attempt_answers_like_the_wrapped_error() {
        let inner = AppError::resource_not_found("contract", 7);
        let err = AppError::blocked(inner, AuditEntry::new("cross_tenant_access_blocked", "contract"));
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.data().unwrap()["target_id"], "7");
        assert!(!err.is_retryable());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn lock_timeout_is_retryable_and_not_a_domain_error() {
        let err = AppError::LockTimeout("canceling statement due to lock timeout".into());
        assert!(err.is_retryable());
        assert_eq!(err.kind(), None);
    }
}
