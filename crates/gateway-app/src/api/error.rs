use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use types::{ApiErrorKind, ErrorBody};

/// Newtype so `ApiErrorKind` (owned by `types`, with no axum dependency)
/// can implement `IntoResponse` here at the HTTP boundary.
pub struct ApiError(pub ApiErrorKind);

impl From<ApiErrorKind> for ApiError {
    fn from(kind: ApiErrorKind) -> Self {
        ApiError(kind)
    }
}

impl From<modbus_client::GatewayError> for ApiError {
    fn from(err: modbus_client::GatewayError) -> Self {
        ApiError(err.into())
    }
}

impl From<store::StoreError> for ApiError {
    fn from(err: store::StoreError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = (&self.0).into();
        let mut response = (status, Json(body)).into_response();

        if let Some(retry_after) = self.0.retry_after_seconds() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
