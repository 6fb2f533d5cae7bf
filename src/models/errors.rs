//! Centralized Error Handling Module
//!
//! Every failure carries a unique code so logs can be grepped and alerted on.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - VAL_xxx: Subject validation errors (surfaced to the caller, never retried)
//! - GW_xxx: Gateway errors (internal to the gateway, degrade to `Unavailable`)
//! - CFG_xxx: Configuration errors
//! - INTERNAL_xxx: Faults contained inside a single check

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Whether this error is a caller-facing validation failure
    pub fn is_validation(&self) -> bool {
        self.code.is_validation()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Validation Errors
    // ============================================
    /// Malformed contract address
    InvalidAddress,
    /// Empty or oversized symbol/name text
    InvalidSymbol,
    /// Malformed subject (bad chain id, empty pool id, ...)
    InvalidSubject,

    // ============================================
    // Gateway Errors
    // ============================================
    /// Per-call timeout elapsed
    GatewayTimeout,
    /// Provider answered HTTP 429 or a rate-limit JSON-RPC error
    GatewayRateLimited,
    /// Connection could not be established
    GatewayConnectionFailed,
    /// Provider answered HTTP 5xx
    GatewayServerError,
    /// Provider answered a non-retryable HTTP status
    GatewayHttpError,
    /// JSON-RPC error response
    GatewayRpcError,
    /// Method or feature not supported by the provider
    GatewayUnsupported,
    /// Response could not be decoded
    GatewayInvalidResponse,
    /// No endpoint configured for the chain
    GatewayNoEndpoints,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Configuration could not be parsed
    ConfigParseError,

    // ============================================
    // Internal Errors
    // ============================================
    /// A check panicked or its task was lost
    InternalFault,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "VAL_INVALID_ADDRESS",
            Self::InvalidSymbol => "VAL_INVALID_SYMBOL",
            Self::InvalidSubject => "VAL_INVALID_SUBJECT",

            Self::GatewayTimeout => "GW_TIMEOUT",
            Self::GatewayRateLimited => "GW_RATE_LIMITED",
            Self::GatewayConnectionFailed => "GW_CONNECTION_FAILED",
            Self::GatewayServerError => "GW_SERVER_ERROR",
            Self::GatewayHttpError => "GW_HTTP_ERROR",
            Self::GatewayRpcError => "GW_RPC_ERROR",
            Self::GatewayUnsupported => "GW_UNSUPPORTED",
            Self::GatewayInvalidResponse => "GW_INVALID_RESPONSE",
            Self::GatewayNoEndpoints => "GW_NO_ENDPOINTS",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigParseError => "CFG_PARSE_ERROR",

            Self::InternalFault => "INTERNAL_FAULT",
        }
    }

    /// Transient failures worth another attempt with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayTimeout
                | Self::GatewayRateLimited
                | Self::GatewayConnectionFailed
                | Self::GatewayServerError
        )
    }

    /// Validation codes are surfaced to the caller of `evaluate`
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress | Self::InvalidSymbol | Self::InvalidSubject
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Invalid contract address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Invalid symbol or name text
    pub fn invalid_symbol(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSymbol, msg)
    }

    /// Invalid subject
    pub fn invalid_subject(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSubject, msg)
    }

    /// Gateway call timed out
    pub fn gateway_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GatewayTimeout, msg)
    }

    /// Gateway rate limited
    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::GatewayRateLimited, "Rate limited (HTTP 429)")
    }

    /// Provider does not support the request
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GatewayUnsupported, msg)
    }

    /// Response could not be decoded
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GatewayInvalidResponse, msg)
    }

    /// No endpoint configured
    pub fn no_endpoints(chain_id: u64) -> Self {
        Self::new(
            ErrorCode::GatewayNoEndpoints,
            format!("No endpoints configured for chain_id {}", chain_id),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Contained internal fault
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalFault, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::InternalFault, err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::GatewayTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::GatewayConnectionFailed, "Connection failed")
        } else if err.is_decode() {
            Self::with_source(ErrorCode::GatewayInvalidResponse, "Response decode failed", err)
        } else {
            match err.status() {
                Some(status) if status.as_u16() == 429 => Self::rate_limited(),
                Some(status) if status.is_server_error() => {
                    Self::new(ErrorCode::GatewayServerError, format!("HTTP error: {}", status))
                }
                _ => Self::new(ErrorCode::GatewayHttpError, err.to_string()),
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::GatewayInvalidResponse, "JSON parse error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::gateway_timeout("Connection timed out");
        assert_eq!(err.code, ErrorCode::GatewayTimeout);
        assert_eq!(err.code_str(), "GW_TIMEOUT");
        assert_eq!(err.to_string(), "[GW_TIMEOUT] Connection timed out");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::GatewayTimeout.is_retryable());
        assert!(ErrorCode::GatewayRateLimited.is_retryable());
        assert!(ErrorCode::GatewayServerError.is_retryable());
        assert!(!ErrorCode::GatewayUnsupported.is_retryable());
        assert!(!ErrorCode::InvalidAddress.is_retryable());
    }

    #[test]
    fn test_validation_codes() {
        assert!(AppError::invalid_address("0x12").is_validation());
        assert!(AppError::invalid_symbol("").is_validation());
        assert!(!AppError::rate_limited().is_validation());
        assert!(!AppError::internal("boom").is_validation());
    }
}
