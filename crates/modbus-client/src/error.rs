use thiserror::Error;
use types::ApiErrorKind;

/// Errors a Gateway or the manager can raise. Distinct from `ApiErrorKind`
/// so the transport layer doesn't have to know about HTTP status mapping;
/// `gateway-app` converts at the boundary.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("invalid socket address {host}:{port}")]
    InvalidAddress { host: String, port: u16 },

    #[error("connection error: {0}")]
    Connect(String),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("modbus exception: {detail}")]
    ModbusException { detail: String, code: Option<i32> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("circuit open, retry after {retry_after_seconds}s")]
    CircuitOpen { retry_after_seconds: u64 },

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("unsupported operation on {0} register space")]
    NotWritable(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Transport(_) | GatewayError::Connect(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}

impl From<GatewayError> for ApiErrorKind {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownDevice(id) => {
                ApiErrorKind::not_found(format!("unknown device '{id}'"))
            }
            GatewayError::NotWritable(space) => {
                ApiErrorKind::validation(format!("{space} register space is not writable"))
            }
            GatewayError::InvalidAddress { host, port } => {
                ApiErrorKind::validation(format!("invalid address {host}:{port}"))
            }
            GatewayError::ModbusException { detail, code } => {
                ApiErrorKind::device(detail, code)
            }
            GatewayError::Timeout { timeout_ms } => ApiErrorKind::transport(
                format!("request timed out after {timeout_ms}ms"),
                true,
            ),
            GatewayError::Connect(detail) | GatewayError::Transport(detail) => {
                ApiErrorKind::transport(detail, false)
            }
            GatewayError::CircuitOpen {
                retry_after_seconds,
            } => ApiErrorKind::circuit_open("gateway circuit breaker open", retry_after_seconds),
        }
    }
}
