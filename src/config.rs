use crate::error::{QueryError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// How positional parameters are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

/// How LIMIT/OFFSET are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    /// `LIMIT n OFFSET m`
    #[default]
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// SQL dialect settings consumed by the emitter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Dialect {
    pub name: String,
    pub placeholder: PlaceholderStyle,
    pub pagination: PaginationStyle,
    /// Cosmetic key/values. Only `like_escape` is interpreted.
    pub custom: BTreeMap<String, String>,
}

impl Dialect {
    pub fn mysql() -> Self {
        Self {
            name: "mysql".to_string(),
            ..Self::default()
        }
    }

    pub fn postgres() -> Self {
        Self {
            name: "postgres".to_string(),
            placeholder: PlaceholderStyle::Dollar,
            ..Self::default()
        }
    }

    pub fn oracle() -> Self {
        Self {
            name: "oracle".to_string(),
            pagination: PaginationStyle::OffsetFetch,
            ..Self::default()
        }
    }

    /// Load a dialect from JSON, e.g. `{"placeholder": "dollar"}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let dialect: Dialect = serde_json::from_str(text)
            .map_err(|e| QueryError::Config(format!("invalid dialect: {}", e)))?;
        dialect.validate()?;
        Ok(dialect)
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Escape character appended to LIKE predicates, if configured.
    pub fn like_escape(&self) -> Option<char> {
        self.custom.get("like_escape").and_then(|s| s.chars().next())
    }

    fn validate(&self) -> Result<()> {
        if let Some(esc) = self.custom.get("like_escape") {
            if esc.chars().count() != 1 {
                return Err(QueryError::Config(format!(
                    "like_escape must be a single character, got {:?}",
                    esc
                )));
            }
        }
        Ok(())
    }
}
