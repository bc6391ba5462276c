use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session rejected by backend (HTTP {0})")]
    Auth(u16),

    #[error("Asset unavailable: {0}")]
    Asset(String),

    #[error("Surface unavailable: {0}")]
    Surface(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Transport-level failures worth another attempt within the same tick.
    /// Auth and parse failures repeat deterministically, so they are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Timeout(_) => true,
            AppError::Http(e) => !e.is_decode(),
            _ => false,
        }
    }

    /// Short operator-facing text for the dashboard status line.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(_) => "Session expired. Sign in again.".to_string(),
            AppError::Timeout(_) => "Server took too long to respond.".to_string(),
            AppError::Parse(_) | AppError::Json(_) => "Unexpected response from server.".to_string(),
            AppError::Http(e) if e.is_decode() => "Unexpected response from server.".to_string(),
            AppError::Network(_) | AppError::Http(_) => {
                "Cannot connect to server. Check network.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::Network(_) | AppError::Http(_) | AppError::Timeout(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        assert!(AppError::Network("connection refused".into()).is_transient());
        assert!(AppError::Timeout(10).is_transient());
    }

    #[test]
    fn auth_and_parse_are_not_retried() {
        assert!(!AppError::Auth(401).is_transient());
        assert!(!AppError::Parse("missing seriesId".into()).is_transient());
        assert!(!AppError::Asset("celebration.txt".into()).is_transient());
    }

    #[test]
    fn auth_message_asks_for_sign_in() {
        assert_eq!(AppError::Auth(401).user_message(), "Session expired. Sign in again.");
    }
}
