//! # Error Handling
//!
//! Error taxonomy for the synthesis engine. Configuration and resolution
//! errors are scoped to a single routing spec; transient errors abort a whole
//! pass and are meant to be retried by whoever triggered it.

/// Custom result type for routeforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the synthesis engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Declarative input that can never synthesize (bad matcher, unknown cluster ref, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced service, namespace or port has no live membership
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Listing specs or membership failed; the pass can be retried as is
    #[error("Transient error: {0}")]
    Transient(String),

    /// The triggering context was cancelled before the pass could publish
    #[error("Synthesis pass cancelled")]
    Cancelled,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML or JSON documents
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors, including a snapshot that failed its consistency check
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new resolution error
    pub fn resolution<S: Into<String>>(message: S) -> Self {
        Self::Resolution(message.into())
    }

    /// Create a new transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Short, stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Resolution(_) => "resolution",
            Error::Transient(_) => "transient",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }

    /// Check if re-running the same pass may succeed without changing the inputs
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Cancelled)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        // Nested struct errors are not listed by field_errors()
        if message.is_empty() {
            return Self::Config(format!("Validation failed: {}", errors));
        }
        Self::Config(format!("Validation failed: {}", message))
    }
}
