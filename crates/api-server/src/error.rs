//! HTTP rendering of [`GateError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use domaingate_core::GateError;
use serde::Serialize;

/// JSON body returned for every rejected or failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper so handlers can return `Result<_, ApiError>` and use `?` on
/// [`GateError`].
#[derive(Debug)]
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message,
            domain: self.0.domain().map(str::to_string),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domaingate_core::RateWindowKind;

    #[test]
    fn test_status_follows_error_kind() {
        let cases = [
            (GateError::NoTenantSpecified, StatusCode::BAD_REQUEST),
            (GateError::InvalidTenantFormat("a..b".into()), StatusCode::BAD_REQUEST),
            (GateError::UnknownTenant("x.com".into()), StatusCode::NOT_FOUND),
            (GateError::NotWhitelisted("x.com".into()), StatusCode::FORBIDDEN),
            (
                GateError::RateLimited {
                    tenant: "x.com".into(),
                    window: RateWindowKind::Minute,
                    limit: 60,
                    observed: 60,
                },
                StatusCode::FORBIDDEN,
            ),
            (GateError::Config("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).into_response().status(), expected);
        }
    }
}
