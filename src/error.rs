//! Custom error types for cityquery

use thiserror::Error;

/// Main error type for cityquery operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {message}")]
    EmbeddingService { message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("No table found within distance {max_distance}")]
    EmptyResult { max_distance: f32 },

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Malformed model response: {message} (raw: {raw})")]
    MalformedResponse { message: String, raw: String },

    #[error("Expected function call '{expected}', got '{actual}' (raw: {raw})")]
    UnexpectedPayloadShape {
        expected: String,
        actual: String,
        raw: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Query returned no rows: {sql}")]
    NoRows { sql: String },

    #[error("Unsupported value type '{type_name}' in column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("Query execution failed: {message} (sql: {sql})")]
    Execution { sql: String, message: String },

    #[error("Timed out after {secs}s waiting for {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Stored query not found: {0}")]
    QueryNotFound(i64),

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub fn embedding(message: impl Into<String>) -> Self {
        Error::EmbeddingService {
            message: message.into(),
        }
    }

    /// Errors the front end should turn into a friendly message rather than a failure report
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::EmptyResult { .. } | Error::NoRows { .. })
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Error::Template(err.to_string())
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(err: handlebars::RenderError) -> Self {
        Error::Template(err.to_string())
    }
}

/// Result type alias for cityquery
pub type Result<T> = std::result::Result<T, Error>;
