use thiserror::Error;
use zkapp_lib::TypeError;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQL(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Type error: {0}")]
    Type(#[from] TypeError),
}

impl LedgerError {
    /// Whether repeating the same request later may succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Http { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::GraphQL(_) => true,
            _ => false,
        }
    }

    /// Get error code for logging
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK_ERROR",
            Self::Http { .. } => "HTTP_ERROR",
            Self::GraphQL(_) => "GRAPHQL_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::Type(_) => "TYPE_ERROR",
        }
    }
}

impl From<url::ParseError> for LedgerError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("Invalid URL: {err}"))
    }
}
