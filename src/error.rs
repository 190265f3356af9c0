use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Programmer error detected while building a query. Never recovered
    /// mid-compilation: the builder refuses to produce a `Query` at all.
    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Hook '{name}' failed: {message}")]
    Hook { name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn misuse(msg: impl Into<String>) -> Self {
        QueryError::Misuse(msg.into())
    }

    pub fn is_misuse(&self) -> bool {
        matches!(self, QueryError::Misuse(_))
    }
}
