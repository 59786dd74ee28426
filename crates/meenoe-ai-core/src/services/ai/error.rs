// AI Core Error Types

use thiserror::Error;

use crate::models::context::ErrorCategory;

/// Errors raised by the AI pipeline
#[derive(Error, Debug)]
pub enum AiError {
    /// The caller exceeded a rate-limit window
    #[error("Rate limit exceeded, please try again later")]
    RateLimitExceeded,

    /// Request content failed validation; carries the validator's error list
    #[error("Invalid input: {}", .0.join("; "))]
    InvalidInput(Vec<String>),

    /// Serialized request exceeded the size ceiling
    #[error("Request too large: {0} bytes")]
    RequestTooLarge(usize),

    /// No adapter registered under the requested provider id
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// The active adapter lacks the requested capability
    #[error("Provider {provider} does not support {capability}")]
    UnsupportedCapability { provider: String, capability: String },

    /// The backend relay did not answer its health check
    #[error("AI relay unreachable: {0}")]
    ProxyUnavailable(String),

    /// The primary and every configured fallback provider failed
    #[error("All providers failed: {0}")]
    AllProvidersFailed(#[source] Box<AiError>),

    /// Stream cancelled by the user
    #[error("Response stopped by user")]
    Aborted,

    /// Authentication failed
    #[error("Invalid or expired API key: {0}")]
    AuthFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request timeout
    #[error("AI service response timeout")]
    Timeout,

    /// Connection failed
    #[error("Cannot connect to AI service: {0}")]
    ConnectionFailed(String),

    /// Response parse error
    #[error("Response parse error: {0}")]
    ParseError(String),

    /// Catch-all for transport/HTTP failures from a provider
    #[error("AI provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout
        } else if err.is_connect() {
            AiError::ConnectionFailed(err.to_string())
        } else {
            AiError::Provider(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::ParseError(err.to_string())
    }
}

/// Result type for AI operations
pub type AiResult<T> = Result<T, AiError>;

/// Stable error codes for consumers and the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiErrorCode {
    RateLimitExceeded,
    InvalidInput,
    RequestTooLarge,
    ProviderNotFound,
    UnsupportedCapability,
    ProxyUnavailable,
    AllProvidersFailed,
    Aborted,
    AuthFailed,
    InvalidConfig,
    Timeout,
    ConnectionFailed,
    ParseError,
    Provider,
}

impl AiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiErrorCode::RateLimitExceeded => "AI_RATE_LIMITED",
            AiErrorCode::InvalidInput => "AI_INVALID_INPUT",
            AiErrorCode::RequestTooLarge => "AI_REQUEST_TOO_LARGE",
            AiErrorCode::ProviderNotFound => "AI_PROVIDER_NOT_FOUND",
            AiErrorCode::UnsupportedCapability => "AI_UNSUPPORTED_CAPABILITY",
            AiErrorCode::ProxyUnavailable => "AI_PROXY_UNAVAILABLE",
            AiErrorCode::AllProvidersFailed => "AI_ALL_PROVIDERS_FAILED",
            AiErrorCode::Aborted => "AI_ABORTED",
            AiErrorCode::AuthFailed => "AI_AUTH_FAILED",
            AiErrorCode::InvalidConfig => "AI_INVALID_CONFIG",
            AiErrorCode::Timeout => "AI_TIMEOUT",
            AiErrorCode::ConnectionFailed => "AI_CONNECTION_FAILED",
            AiErrorCode::ParseError => "AI_PARSE_ERROR",
            AiErrorCode::Provider => "AI_PROVIDER_ERROR",
        }
    }
}

impl AiError {
    pub fn code(&self) -> AiErrorCode {
        match self {
            AiError::RateLimitExceeded => AiErrorCode::RateLimitExceeded,
            AiError::InvalidInput(_) => AiErrorCode::InvalidInput,
            AiError::RequestTooLarge(_) => AiErrorCode::RequestTooLarge,
            AiError::ProviderNotFound(_) => AiErrorCode::ProviderNotFound,
            AiError::UnsupportedCapability { .. } => AiErrorCode::UnsupportedCapability,
            AiError::ProxyUnavailable(_) => AiErrorCode::ProxyUnavailable,
            AiError::AllProvidersFailed(_) => AiErrorCode::AllProvidersFailed,
            AiError::Aborted => AiErrorCode::Aborted,
            AiError::AuthFailed(_) => AiErrorCode::AuthFailed,
            AiError::InvalidConfig(_) => AiErrorCode::InvalidConfig,
            AiError::Timeout => AiErrorCode::Timeout,
            AiError::ConnectionFailed(_) => AiErrorCode::ConnectionFailed,
            AiError::ParseError(_) => AiErrorCode::ParseError,
            AiError::Provider(_) => AiErrorCode::Provider,
        }
    }

    /// Map to the fixed set of user-facing categories.
    /// AllProvidersFailed delegates to the last underlying failure so a
    /// configuration problem still surfaces as "please configure".
    pub fn user_category(&self) -> ErrorCategory {
        match self {
            AiError::RateLimitExceeded => ErrorCategory::RateLimited,
            AiError::ProviderNotFound(_)
            | AiError::AuthFailed(_)
            | AiError::InvalidConfig(_)
            | AiError::ProxyUnavailable(_) => ErrorCategory::NeedsConfiguration,
            AiError::AllProvidersFailed(inner) => inner.user_category(),
            _ => ErrorCategory::Retry,
        }
    }

    /// Message shown to the user for this failure
    pub fn user_message(&self) -> &'static str {
        match self.user_category() {
            ErrorCategory::RateLimited => {
                "You're sending messages too quickly. Please slow down and try again in a moment."
            }
            ErrorCategory::NeedsConfiguration => {
                "The AI assistant isn't configured yet. Please add a provider and API key in settings."
            }
            ErrorCategory::Retry => {
                "Something went wrong while generating a response. Please try again."
            }
        }
    }
}
