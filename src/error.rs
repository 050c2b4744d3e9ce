// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy shared by every wallet operation.
//!
//! Every failure surfaced by the crate is a [`WalletError`]. The route layer
//! serialises it through [`IntoResponse`] as
//! `{ "success": false, "error": ..., "error_code": ... }`, and successful
//! results through [`ApiResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Wallet core error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    /// Caller supplied a malformed or out-of-range value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure (connection refused, timeout, TLS, ...).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Upstream service answered with an error.
    #[error("Provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },

    /// Oracle returned something that is not a 64-byte `r || s` signature.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Account already deployed: {0}")]
    AlreadyDeployed(String),

    #[error("Account not deployed: {0}")]
    NotDeployed(String),

    /// The chain or the paymaster refused the transaction. The message is
    /// propagated verbatim.
    #[error("Transaction rejected: {0}")]
    ChainRejected(String),

    #[error("No supported gas token available for self-paid fees")]
    NoSupportedGasToken,

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: String, actual: String },

    #[error("Fee limit exceeded: required {required}, max {max}")]
    FeeLimitExceeded { required: u128, max: u128 },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl WalletError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        WalletError::ProviderError {
            status,
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::InvalidArgument(_) => "invalid_argument",
            WalletError::NetworkError(_) => "network_error",
            WalletError::ProviderError { .. } => "provider_error",
            WalletError::MalformedSignature(_) => "malformed_signature",
            WalletError::InsufficientBalance(_) => "insufficient_balance",
            WalletError::AlreadyDeployed(_) => "already_deployed",
            WalletError::NotDeployed(_) => "not_deployed",
            WalletError::ChainRejected(_) => "chain_rejected",
            WalletError::NoSupportedGasToken => "no_supported_gas_token",
            WalletError::AddressMismatch { .. } => "address_mismatch",
            WalletError::FeeLimitExceeded { .. } => "fee_limit_exceeded",
            WalletError::MissingConfig(_) => "missing_config",
            WalletError::Unauthorized(_) => "unauthorized",
            WalletError::Timeout(_) => "timeout",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WalletError::InvalidArgument(_) | WalletError::InsufficientBalance(_) => {
                StatusCode::BAD_REQUEST
            }
            WalletError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WalletError::AlreadyDeployed(_) | WalletError::NotDeployed(_) => StatusCode::CONFLICT,
            WalletError::AddressMismatch { .. } | WalletError::FeeLimitExceeded { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WalletError::ProviderError { status, .. } => match *status {
                401 | 403 => StatusCode::UNAUTHORIZED,
                404 => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
            WalletError::NetworkError(_)
            | WalletError::MalformedSignature(_)
            | WalletError::ChainRejected(_)
            | WalletError::NoSupportedGasToken => StatusCode::BAD_GATEWAY,
            WalletError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            WalletError::MissingConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => WalletError::provider(status.as_u16(), err.to_string()),
            None => WalletError::NetworkError(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    error_code: &'static str,
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            success: false,
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}

/// Success envelope: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn codes_and_statuses() {
        let err = WalletError::AlreadyDeployed("0x1".into());
        assert_eq!(err.error_code(), "already_deployed");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = WalletError::provider(401, "bad token");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Provider error (401): bad token");

        let err = WalletError::provider(500, "boom");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        assert_eq!(
            WalletError::InsufficientBalance("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn error_into_response_returns_envelope() {
        let response = WalletError::NotDeployed("0xabc".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "not_deployed");
        assert_eq!(body["error"], "Account not deployed: 0xabc");
    }

    #[tokio::test]
    async fn success_envelope_wraps_data() {
        let response = ApiResponse::ok(serde_json::json!({ "address": "0x1" })).into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"success":true,"data":{"address":"0x1"}}"#);
    }
}
