use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(privacydesk::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(privacydesk::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(privacydesk::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(privacydesk::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Validation failed: {}", .0.join("; "))]
    #[diagnostic(code(privacydesk::validation))]
    Validation(Vec<String>),

    #[error("Bad request: {0}")]
    #[diagnostic(code(privacydesk::bad_request))]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    #[diagnostic(code(privacydesk::unauthorized))]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    #[diagnostic(code(privacydesk::forbidden))]
    Forbidden(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(privacydesk::not_found))]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(privacydesk::conflict))]
    Conflict(String),

    #[error("Record store unavailable: {0}")]
    #[diagnostic(
        code(privacydesk::backend_unavailable),
        help("Set database.url (PRIVACYDESK__DATABASE__URL) and check the database is reachable")
    )]
    BackendUnavailable(String),

    #[error("Spreadsheet error: {0}")]
    #[diagnostic(code(privacydesk::spreadsheet))]
    Spreadsheet(String),

    #[error("PDF error: {0}")]
    #[diagnostic(code(privacydesk::pdf))]
    Pdf(String),

    #[error("{0}")]
    #[diagnostic(code(privacydesk::other))]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Spreadsheet(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Io(_)
            | AppError::Config(_)
            | AppError::Serde(_)
            | AppError::Db(_)
            | AppError::Pdf(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to API clients. Internal failures are not echoed back.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Los datos enviados no son válidos".to_string(),
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::BackendUnavailable(msg)
            | AppError::Spreadsheet(msg) => msg.clone(),
            _ => "Error interno del servidor".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let mut body = json!({
            "success": false,
            "error": self.public_message(),
        });
        if let AppError::Validation(errors) = &self {
            body["errors"] = json!(errors);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::BackendUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Other("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Other("connection string leaked".into());
        assert_eq!(err.public_message(), "Error interno del servidor");

        let err = AppError::NotFound("Consentimiento no encontrado".into());
        assert_eq!(err.public_message(), "Consentimiento no encontrado");
    }

    #[tokio::test]
    async fn test_validation_response_lists_errors() {
        let err = AppError::Validation(vec!["a".into(), "b".into()]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"], json!(["a", "b"]));
    }
}
