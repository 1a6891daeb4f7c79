//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//!
//! ## Error Categories
//!
//! Provider failures carry an [`ErrorCategory`] so callers can decide what to do.
//! This crate never retries on its own: categories are hints for the caller.
//!
//! - **RateLimit**: API rate limiting
//! - **TokenLimit**: Context too large
//! - **Auth**: Authentication failures
//! - **Network**: Connectivity issues
//! - **Unavailable**: Provider unavailable
//! - **Transient**: Temporary server-side failure

use std::time::Duration;
use thiserror::Error;

use crate::config::SUPPORTED_PROVIDERS;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimit,
    TokenLimit,
    Auth,
    Network,
    Unavailable,
    BadRequest,
    ParseError,
    Transient,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether a caller may reasonably retry the whole request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Provider error with category and context
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
    /// Wait hint reported by the provider (e.g. `retry-after`)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("throttl")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("token")
            && (lower.contains("limit") || lower.contains("exceed") || lower.contains("maximum"))
            || lower.contains("context length")
            || lower.contains("too large")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("access denied")
            || lower.contains("credential")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("dispatch failure")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("not found")
        {
            return LlmError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if lower.contains("overloaded") || lower.contains("internal server") {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        if lower.contains("400") || lower.contains("bad request") || lower.contains("validation")
        {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify an HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            413 => LlmError::with_provider(ErrorCategory::TokenLimit, message, provider),
            500 | 502 | 503 | 504 | 529 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Startup configuration problem; the process must not serve requests
    #[error("Config error: {0}")]
    Config(String),

    #[error(
        "Unsupported model provider: {name}. Use one of: {}",
        SUPPORTED_PROVIDERS.join(", ")
    )]
    UnsupportedProvider { name: String },

    #[error("LLM error: {0}")]
    Llm(LlmError),

    /// Malformed provider payload or protocol violation
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Template error in {name}: {message}")]
    Template { name: String, message: String },

    #[error("Tool error: {0}")]
    Tool(String),
}

impl From<LlmError> for WikiError {
    fn from(err: LlmError) -> Self {
        WikiError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, WikiError>;

impl WikiError {
    pub fn template(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Template {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Configuration-class errors that must abort the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnsupportedProvider { .. })
    }

    /// Category of a provider failure, if this is one
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Llm(e) => Some(e.category),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::TokenLimit.to_string(), "TOKEN_LIMIT");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::BadRequest.is_retryable());
    }

    #[test]
    fn test_classify_messages() {
        let err = ErrorClassifier::classify("Rate limit exceeded", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);

        let err = ErrorClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.category, ErrorCategory::Auth);

        let err = ErrorClassifier::classify("ThrottlingException: slow down", "bedrock");
        assert_eq!(err.category, ErrorCategory::RateLimit);

        let err = ErrorClassifier::classify("Connection reset by peer", "anthropic");
        assert_eq!(err.category, ErrorCategory::Network);

        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let overloaded = ErrorClassifier::classify_http_status(529, "Overloaded", "anthropic");
        assert_eq!(overloaded.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_unsupported_provider_lists_supported_names() {
        let err = WikiError::UnsupportedProvider {
            name: "Gemini".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Gemini"));
        for name in ["OpenAI", "AzureOpenAI", "Anthropic", "AmazonBedrock"] {
            assert!(message.contains(name), "missing {name} in {message}");
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");

        let wrapped: WikiError = err.into();
        assert_eq!(wrapped.category(), Some(ErrorCategory::RateLimit));
        assert!(!wrapped.is_fatal());
    }
}
