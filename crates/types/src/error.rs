use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The cross-cutting error taxonomy every crate's local error converts
/// into at the boundary where `gateway-app` maps it to an HTTP response.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ApiErrorKind {
    #[error("validation error: {detail}")]
    ValidationError { detail: String },

    #[error("not found: {detail}")]
    NotFound { detail: String },

    #[error("conflict: {detail}")]
    Conflict { detail: String },

    #[error("device error: {detail}")]
    DeviceError {
        detail: String,
        code: Option<i32>,
    },

    #[error("transport error: {detail}")]
    TransportError { detail: String, timeout: bool },

    #[error("circuit open: {detail}")]
    CircuitOpen {
        detail: String,
        retry_after_seconds: u64,
    },

    #[error("dependency error: {detail}")]
    DependencyError { detail: String },
}

impl ApiErrorKind {
    pub fn validation(detail: impl Into<String>) -> Self {
        ApiErrorKind::ValidationError {
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiErrorKind::NotFound {
            detail: detail.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        ApiErrorKind::Conflict {
            detail: detail.into(),
        }
    }

    pub fn device(detail: impl Into<String>, code: Option<i32>) -> Self {
        ApiErrorKind::DeviceError {
            detail: detail.into(),
            code,
        }
    }

    pub fn transport(detail: impl Into<String>, timeout: bool) -> Self {
        ApiErrorKind::TransportError {
            detail: detail.into(),
            timeout,
        }
    }

    pub fn circuit_open(detail: impl Into<String>, retry_after_seconds: u64) -> Self {
        ApiErrorKind::CircuitOpen {
            detail: detail.into(),
            retry_after_seconds,
        }
    }

    pub fn dependency(detail: impl Into<String>) -> Self {
        ApiErrorKind::DependencyError {
            detail: detail.into(),
        }
    }

    /// HTTP status this kind maps onto, per the error taxonomy.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiErrorKind::ValidationError { .. } => 400,
            ApiErrorKind::NotFound { .. } => 404,
            ApiErrorKind::Conflict { .. } => 409,
            ApiErrorKind::DeviceError { .. } => 502,
            ApiErrorKind::TransportError { timeout, .. } => {
                if *timeout {
                    504
                } else {
                    502
                }
            }
            ApiErrorKind::CircuitOpen { .. } => 503,
            ApiErrorKind::DependencyError { .. } => 503,
        }
    }

    /// `Retry-After` header value, seconds, when one applies.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ApiErrorKind::CircuitOpen {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiErrorKind::ValidationError { detail }
            | ApiErrorKind::NotFound { detail }
            | ApiErrorKind::Conflict { detail }
            | ApiErrorKind::DeviceError { detail, .. }
            | ApiErrorKind::TransportError { detail, .. }
            | ApiErrorKind::CircuitOpen { detail, .. }
            | ApiErrorKind::DependencyError { detail } => detail,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ApiErrorKind::DeviceError { code, .. } => *code,
            _ => None,
        }
    }
}

/// Wire shape for `{error, detail, code?}` response bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl From<&ApiErrorKind> for ErrorBody {
    fn from(kind: &ApiErrorKind) -> Self {
        let error = match kind {
            ApiErrorKind::ValidationError { .. } => "validation_error",
            ApiErrorKind::NotFound { .. } => "not_found",
            ApiErrorKind::Conflict { .. } => "conflict",
            ApiErrorKind::DeviceError { .. } => "modbus_exception",
            ApiErrorKind::TransportError { .. } => "transport_error",
            ApiErrorKind::CircuitOpen { .. } => "circuit_open",
            ApiErrorKind::DependencyError { .. } => "dependency_error",
        };
        ErrorBody {
            error: error.to_string(),
            detail: kind.detail().to_string(),
            code: kind.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ApiErrorKind::validation("x").http_status(), 400);
        assert_eq!(ApiErrorKind::not_found("x").http_status(), 404);
        assert_eq!(ApiErrorKind::conflict("x").http_status(), 409);
        assert_eq!(ApiErrorKind::device("x", None).http_status(), 502);
        assert_eq!(ApiErrorKind::transport("x", true).http_status(), 504);
        assert_eq!(ApiErrorKind::transport("x", false).http_status(), 502);
        assert_eq!(ApiErrorKind::circuit_open("x", 12).http_status(), 503);
        assert_eq!(ApiErrorKind::dependency("x").http_status(), 503);
    }

    #[test]
    fn circuit_open_carries_retry_after() {
        let kind = ApiErrorKind::circuit_open("breaker open", 17);
        assert_eq!(kind.retry_after_seconds(), Some(17));
        assert_eq!(ApiErrorKind::validation("x").retry_after_seconds(), None);
    }

    #[test]
    fn error_body_maps_kind_name() {
        let body: ErrorBody = (&ApiErrorKind::device("illegal address", Some(2))).into();
        assert_eq!(body.error, "modbus_exception");
        assert_eq!(body.code, Some(2));
    }
}
