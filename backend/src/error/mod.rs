use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

pub mod gateway;

pub use gateway::GatewayError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
    /// Domain outcome with its own status / machine code pair, produced by
    /// `From<GatewayError>`. Clients branch on the code, so the whole mapping
    /// lives in one place.
    Gateway {
        status: StatusCode,
        message: String,
        code: &'static str,
        details: Option<Value>,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND".to_string(), None),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg,
                "UNAUTHORIZED".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
            AppError::Gateway {
                status,
                message,
                code,
                details,
            } => (status, message, code.to_string(), details),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let code = err.code();
        match err {
            GatewayError::Identity => AppError::Gateway {
                status: StatusCode::UNAUTHORIZED,
                message: "User identity could not be established".to_string(),
                code,
                details: None,
            },
            GatewayError::PolicyDenied { role, provider } => AppError::Gateway {
                status: StatusCode::FORBIDDEN,
                message: format!(
                    "Policy denies {} access to {}",
                    role.as_str(),
                    provider.display_name()
                ),
                code,
                details: Some(serde_json::json!({
                    "role": role.as_str(),
                    "provider": provider.as_str(),
                })),
            },
            GatewayError::ReauthRequired { provider } => AppError::Gateway {
                status: StatusCode::FORBIDDEN,
                message: format!(
                    "{} requires fresh authorization before each use",
                    provider.display_name()
                ),
                code,
                details: Some(serde_json::json!({ "provider": provider.as_str() })),
            },
            GatewayError::AuthRequired { provider } => AppError::Gateway {
                status: StatusCode::UNAUTHORIZED,
                message: format!("No usable {} credential", provider.display_name()),
                code,
                details: Some(serde_json::json!({ "provider": provider.as_str() })),
            },
            GatewayError::Cancelled => AppError::Gateway {
                status: StatusCode::REQUEST_TIMEOUT,
                message: "Authorization was cancelled".to_string(),
                code,
                details: None,
            },
            GatewayError::ExchangeFailed { provider, detail } => AppError::Gateway {
                status: StatusCode::BAD_GATEWAY,
                message: format!("{} rejected the authorization code", provider.display_name()),
                code,
                details: Some(serde_json::json!({
                    "provider": provider.as_str(),
                    "detail": detail,
                })),
            },
            GatewayError::RefreshFailed { provider, detail } => AppError::Gateway {
                status: StatusCode::BAD_GATEWAY,
                message: format!("{} token refresh failed", provider.display_name()),
                code,
                details: Some(serde_json::json!({
                    "provider": provider.as_str(),
                    "detail": detail,
                })),
            },
            GatewayError::Provider {
                provider,
                status,
                body,
            } => AppError::Gateway {
                status: StatusCode::BAD_GATEWAY,
                message: format!("{} request failed", provider.display_name()),
                code,
                details: Some(serde_json::json!({
                    "provider": provider.as_str(),
                    "status": status,
                    "body": body,
                })),
            },
            GatewayError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            GatewayError::Store(err) => AppError::from(err),
            GatewayError::Internal(err) => AppError::InternalServerError(err),
        }
    }
}
