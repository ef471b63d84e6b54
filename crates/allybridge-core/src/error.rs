//! Error taxonomy for the Office Ally bridge.
//!
//! Four error types cover the four failure domains: `AuthError` for the
//! login handshake, `RequestError` for orchestrated platform traffic,
//! `DecodeError` for turning markup into records, and `OperationError`
//! as the facade-level wrapper callers actually see. Every variant maps
//! to a stable machine-readable code and a category so callers never
//! have to match on message text.

use std::fmt;

/// Errors that can occur during the login handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The platform refused the username/password pair, or no credentials
    /// are configured at all.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials {
        /// Description of the rejection.
        message: String,
    },

    /// The login flow returned a page that matches neither the success
    /// nor the failure contract.
    #[error("Unexpected login response: {message}")]
    UnexpectedResponseShape {
        /// Description of what was observed instead.
        message: String,
    },

    /// Transport-level failure (connect, timeout) during the handshake.
    #[error("Network failure during authentication: {message}")]
    NetworkFailure {
        /// Description of the transport failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidCredentials` error.
    #[must_use]
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedResponseShape` error.
    #[must_use]
    pub fn unexpected_response_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            message: message.into(),
        }
    }

    /// Creates a new `NetworkFailure` error.
    #[must_use]
    pub fn network_failure(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Returns `true` if the underlying cause is transient and a later
    /// attempt may succeed without operator intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials { .. } => ErrorCategory::Auth,
            Self::UnexpectedResponseShape { .. } => ErrorCategory::Auth,
            Self::NetworkFailure { .. } => ErrorCategory::Network,
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials { .. } => "auth_invalid_credentials",
            Self::UnexpectedResponseShape { .. } => "auth_unexpected_response",
            Self::NetworkFailure { .. } => "auth_network_failure",
        }
    }
}

/// Errors that can occur while orchestrating platform requests.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// An operation parameter failed validation before any network
    /// traffic was attempted.
    #[error("Invalid parameters: {message}")]
    InvalidParams {
        /// Description of the offending parameter.
        message: String,
    },

    /// A response carried the platform's session-expiry signature.
    #[error("Session expired: {marker}")]
    SessionExpired {
        /// The signature that tripped (redirect target or final URL).
        marker: String,
    },

    /// Transport-level failure after the bounded retry budget was spent.
    #[error("Network failure: {message}")]
    NetworkFailure {
        /// Description of the transport failure.
        message: String,
    },

    /// The platform answered with an explicit error page or an
    /// out-of-contract status.
    #[error("Platform rejected the request: {message}")]
    PlatformRejected {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Description of the rejection.
        message: String,
    },
}

impl RequestError {
    /// Creates a new `InvalidParams` error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates a new `SessionExpired` error.
    #[must_use]
    pub fn session_expired(marker: impl Into<String>) -> Self {
        Self::SessionExpired {
            marker: marker.into(),
        }
    }

    /// Creates a new `NetworkFailure` error.
    #[must_use]
    pub fn network_failure(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Creates a new `PlatformRejected` error without a status code.
    #[must_use]
    pub fn platform_rejected(message: impl Into<String>) -> Self {
        Self::PlatformRejected {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a new `PlatformRejected` error carrying the HTTP status.
    #[must_use]
    pub fn platform_rejected_with_status(status: u16, message: impl Into<String>) -> Self {
        Self::PlatformRejected {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is the session-expiry signal the
    /// facade reacts to with a re-authentication.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// Returns `true` if the underlying cause is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParams { .. } => ErrorCategory::Validation,
            Self::SessionExpired { .. } => ErrorCategory::Session,
            Self::NetworkFailure { .. } => ErrorCategory::Network,
            Self::PlatformRejected { .. } => ErrorCategory::Platform,
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => "invalid_params",
            Self::SessionExpired { .. } => "session_expired",
            Self::NetworkFailure { .. } => "network_failure",
            Self::PlatformRejected { .. } => "platform_rejected",
        }
    }
}

/// Errors that can occur while decoding platform responses into records.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A required field was absent or empty; no partial record is built.
    #[error("Missing required field '{field}' in {record}")]
    MissingField {
        /// The record kind being decoded.
        record: &'static str,
        /// Name of the missing field.
        field: String,
    },

    /// The response does not match the expected markup or JSON shape.
    #[error("Unexpected response shape: {message}")]
    UnexpectedResponseShape {
        /// Description of what was observed instead.
        message: String,
    },
}

impl DecodeError {
    /// Creates a new `MissingField` error.
    #[must_use]
    pub fn missing_field(record: &'static str, field: impl Into<String>) -> Self {
        Self::MissingField {
            record,
            field: field.into(),
        }
    }

    /// Creates a new `UnexpectedResponseShape` error.
    #[must_use]
    pub fn unexpected_response_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            message: message.into(),
        }
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingField { .. } => ErrorCategory::Decode,
            Self::UnexpectedResponseShape { .. } => ErrorCategory::Decode,
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::UnexpectedResponseShape { .. } => "unexpected_response",
        }
    }
}

/// Facade-level error: one of the component errors wrapped with the name
/// of the operation that failed, or the terminal session failure after
/// the single re-authentication retry was spent.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Authentication failed while running the operation.
    #[error("operation '{operation}' failed: {source}")]
    Auth {
        /// The facade operation that was running.
        operation: &'static str,
        /// The underlying handshake error.
        #[source]
        source: AuthError,
    },

    /// A platform request failed while running the operation.
    #[error("operation '{operation}' failed: {source}")]
    Request {
        /// The facade operation that was running.
        operation: &'static str,
        /// The underlying request error.
        #[source]
        source: RequestError,
    },

    /// Decoding the platform response failed.
    #[error("operation '{operation}' failed: {source}")]
    Decode {
        /// The facade operation that was running.
        operation: &'static str,
        /// The underlying decode error.
        #[source]
        source: DecodeError,
    },

    /// The session expired again right after a successful
    /// re-authentication; retrying further would loop.
    #[error("operation '{operation}' failed: session expired again after re-authentication")]
    PersistentSessionFailure {
        /// The facade operation that was running.
        operation: &'static str,
    },
}

impl OperationError {
    /// Wraps an `AuthError` with the operation name.
    #[must_use]
    pub fn auth(operation: &'static str, source: AuthError) -> Self {
        Self::Auth { operation, source }
    }

    /// Wraps a `RequestError` with the operation name.
    #[must_use]
    pub fn request(operation: &'static str, source: RequestError) -> Self {
        Self::Request { operation, source }
    }

    /// Wraps a `DecodeError` with the operation name.
    #[must_use]
    pub fn decode(operation: &'static str, source: DecodeError) -> Self {
        Self::Decode { operation, source }
    }

    /// Creates the terminal session failure for the given operation.
    #[must_use]
    pub fn persistent_session_failure(operation: &'static str) -> Self {
        Self::PersistentSessionFailure { operation }
    }

    /// Returns the name of the operation that failed.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Auth { operation, .. }
            | Self::Request { operation, .. }
            | Self::Decode { operation, .. }
            | Self::PersistentSessionFailure { operation } => operation,
        }
    }

    /// Returns `true` if the session could not be kept alive even after
    /// the single allowed re-authentication.
    #[must_use]
    pub fn is_persistent_session_failure(&self) -> bool {
        matches!(self, Self::PersistentSessionFailure { .. })
    }

    /// Returns the error category of the underlying cause.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth { source, .. } => source.category(),
            Self::Request { source, .. } => source.category(),
            Self::Decode { source, .. } => source.category(),
            Self::PersistentSessionFailure { .. } => ErrorCategory::Session,
        }
    }

    /// Returns the stable machine-readable code of the underlying cause.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth { source, .. } => source.code(),
            Self::Request { source, .. } => source.code(),
            Self::Decode { source, .. } => source.code(),
            Self::PersistentSessionFailure { .. } => "persistent_session_failure",
        }
    }
}

/// Categories of bridge errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Login handshake errors.
    Auth,
    /// Session lifetime errors (expiry, persistent expiry).
    Session,
    /// Parameter validation errors.
    Validation,
    /// Transport-level errors.
    Network,
    /// Explicit platform rejections.
    Platform,
    /// Response decoding errors.
    Decode,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Session => write!(f, "session"),
            Self::Validation => write!(f, "validation"),
            Self::Network => write!(f, "network"),
            Self::Platform => write!(f, "platform"),
            Self::Decode => write!(f, "decode"),
        }
    }
}
