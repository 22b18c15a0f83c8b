//! Error taxonomy (§7) shared across the admission, store, and HTTP layers.

use thiserror::Error;

/// The stable set of error cases a caller of the core API can observe.
///
/// Each variant maps to exactly one HTTP status via [`CoreError::status_code`];
/// internal causes (sqlx errors, io errors, ...) are folded into `Internal`
/// rather than leaked to callers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("source code exceeds the maximum allowed size")]
    SourceTooLarge,

    #[error("session not found")]
    SessionNotFound,

    #[error("session is closed")]
    SessionClosed,

    #[error("language not found: {0}")]
    LanguageNotFound(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("execution not found")]
    ExecutionNotFound,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// The HTTP status code this error should be reported as (§7).
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::InvalidParameter(_) => 400,
            CoreError::SourceTooLarge => 400,
            CoreError::SessionNotFound => 404,
            CoreError::LanguageNotFound(_) => 404,
            CoreError::ExecutionNotFound => 404,
            CoreError::SessionClosed => 400,
            CoreError::RateLimited { .. } => 429,
            CoreError::Internal(_) => 500,
        }
    }

    /// A short, stable machine-readable code for the error body (distinct from the
    /// human-readable `Display` message, which may include interpolated detail).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidParameter(_) => "invalid_parameter",
            CoreError::SourceTooLarge => "source_too_large",
            CoreError::SessionNotFound => "session_not_found",
            CoreError::SessionClosed => "session_closed",
            CoreError::LanguageNotFound(_) => "language_not_found",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::ExecutionNotFound => "execution_not_found",
            CoreError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Internal(anyhow::Error::new(err))
    }
}

impl axum::response::IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        if matches!(self, CoreError::Internal(_)) {
            tracing::error!(error = %self, "internal error surfaced to HTTP layer");
        }

        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        if let CoreError::RateLimited { retry_after_ms } = self {
            body["retryAfter"] = serde_json::json!(retry_after_ms / 1000);
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(CoreError::InvalidParameter("x".into()).status_code(), 400);
        assert_eq!(CoreError::SourceTooLarge.status_code(), 400);
        assert_eq!(CoreError::SessionNotFound.status_code(), 404);
        assert_eq!(CoreError::SessionClosed.status_code(), 400);
        assert_eq!(
            CoreError::RateLimited { retry_after_ms: 100 }.status_code(),
            429
        );
        assert_eq!(CoreError::ExecutionNotFound.status_code(), 404);
        assert_eq!(CoreError::Internal(anyhow::anyhow!("boom")).status_code(), 500);
    }
}
