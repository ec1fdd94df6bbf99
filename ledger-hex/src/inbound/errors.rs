//! Error responses for the HTTP adapter.
//!
//! Handlers return [`ApiError`], which renders `{"error", "code"}` with the
//! raw message. Outside local environments the [`sanitize_errors`]
//! middleware rewrites that body before it leaves the process.

use std::any::Any;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use ledger_types::AppError;

const MAX_MESSAGE_LEN: usize = 160;

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

/// Unsanitized error carried on the response for [`sanitize_errors`].
#[derive(Debug, Clone)]
struct RawError {
    status: StatusCode,
    message: String,
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_of(err: AppError) -> String {
    match err {
        AppError::BadRequest(msg)
        | AppError::Rejected(msg)
        | AppError::NotFound(msg)
        | AppError::Conflict(msg)
        | AppError::Unavailable(msg)
        | AppError::Internal(msg) => msg,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": message,
        "code": status.as_u16()
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request refused");
        }

        let message = message_of(self.0);
        let mut response = error_response(status, &message);
        response
            .extensions_mut()
            .insert(RawError { status, message });
        response
    }
}

/// Whether error details may reach the caller.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    expose_details: bool,
}

impl ErrorPolicy {
    /// Details are exposed only when `app_env` is empty, `local` or `dev`.
    pub fn for_env(app_env: &str) -> Self {
        let env = app_env.trim().to_ascii_lowercase();
        Self {
            expose_details: matches!(env.as_str(), "" | "local" | "dev"),
        }
    }

    pub fn expose_details(&self) -> bool {
        self.expose_details
    }
}

/// Generic text for server-side failures; others trimmed and stripped of
/// control characters.
pub fn sanitize_message(status: StatusCode, message: &str) -> String {
    match status {
        StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
        StatusCode::SERVICE_UNAVAILABLE => "service unavailable, retry later".to_string(),
        _ => message
            .chars()
            .filter(|c| !c.is_control())
            .take(MAX_MESSAGE_LEN)
            .collect(),
    }
}

pub async fn sanitize_errors(
    State(policy): State<ErrorPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if policy.expose_details() {
        return response;
    }
    match response.extensions().get::<RawError>().cloned() {
        Some(raw) => error_response(raw.status, &sanitize_message(raw.status, &raw.message)),
        None => response,
    }
}

/// `CatchPanicLayer` handler. The panic is logged without the request.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = %detail, "handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&AppError::Rejected("limit".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&AppError::Unavailable("open".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AppError::Conflict("dup".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_policy_by_env() {
        assert!(ErrorPolicy::for_env("").expose_details());
        assert!(ErrorPolicy::for_env("dev").expose_details());
        assert!(ErrorPolicy::for_env("LOCAL").expose_details());
        assert!(!ErrorPolicy::for_env("prod").expose_details());
        assert!(!ErrorPolicy::for_env("staging").expose_details());
    }

    #[test]
    fn test_sanitize_hides_server_errors() {
        let msg = sanitize_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database error: relation payments does not exist",
        );
        assert_eq!(msg, "internal error");
        assert!(
            !sanitize_message(StatusCode::SERVICE_UNAVAILABLE, "10.0.0.4:8080 refused")
                .contains("10.0.0.4")
        );
    }

    #[test]
    fn test_sanitize_trims_and_strips_control_chars() {
        let long = format!("bad\n\tinput {}", "x".repeat(300));
        let msg = sanitize_message(StatusCode::BAD_REQUEST, &long);
        assert!(msg.starts_with("badinput"));
        assert_eq!(msg.chars().count(), 160);
    }
}
