//! Error types for the pantry gateway

use thiserror::Error;

/// Result type alias for pantry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the pantry gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript processing error
    #[error("transcript error: {0}")]
    Transcript(String),

    /// Command extraction error
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Spoken item matched several catalog entries without a clear winner
    #[error("ambiguous item \"{spoken}\": did you mean {}?", suggestions.join(", "))]
    AmbiguousMatch {
        /// The spoken item phrase that failed to resolve
        spoken: String,
        /// Names of the near-miss catalog candidates
        suggestions: Vec<String>,
    },

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid mutation (unknown unit, incompatible units, bad quantity)
    #[error("validation error: {0}")]
    Validation(String),

    /// Session error
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Embedding error
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl Error {
    /// Short machine-readable code for the `error` session event
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Toml(_) => "config_error",
            Self::Transcript(_) => "transcript_error",
            Self::Extraction(_) => "extraction_error",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Session(_) => "session_error",
            Self::Io(_) => "io_error",
            Self::Http(_) => "transport_error",
            Self::Serialization(_) => "serialization_error",
            Self::Database(_) | Self::Sqlite(_) => "database_error",
            Self::Embedding(_) => "embedding_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_match_lists_suggestions() {
        let err = Error::AmbiguousMatch {
            spoken: "crushed tomato".to_string(),
            suggestions: vec!["canned tomatoes".to_string(), "tomato paste".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("crushed tomato"));
        assert!(msg.contains("canned tomatoes, tomato paste"));
        assert_eq!(err.code(), "ambiguous_match");
    }
}
