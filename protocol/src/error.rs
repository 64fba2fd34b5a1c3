use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Error classification reported by the transport. The call executor only
/// distinguishes [`RpcCode::Unauthenticated`]; every other code takes the
/// prompt path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RpcCode {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    DeadlineExceeded,
    Unavailable,
    Internal,
    #[serde(other)]
    Unknown,
}

impl RpcCode {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            400 | 422 => Self::InvalidArgument,
            408 | 504 => Self::DeadlineExceeded,
            429 | 502 | 503 => Self::Unavailable,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unauthenticated, message)
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code == RpcCode::Unauthenticated
    }
}
