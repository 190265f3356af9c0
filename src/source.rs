use crate::builder::CondBuilder;
use crate::condition::Predicate;
use crate::error::{QueryError, Result};
use crate::query::Query;
use std::fmt;

/// Anything that maps to a stored relation.
pub trait Table {
    fn table_name(&self) -> &str;
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// Implicit cross join: `FROM a, b`.
    Comma,
}

impl JoinType {
    /// Outer joins keep every row of the preserved side whether or not the
    /// joined source matches.
    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Right | JoinType::Full)
    }

    pub fn needs_constraint(self) -> bool {
        !matches!(self, JoinType::Cross | JoinType::Comma)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
            JoinType::Full => write!(f, "FULL JOIN"),
            JoinType::Cross => write!(f, "CROSS JOIN"),
            JoinType::Comma => write!(f, ","),
        }
    }
}

/// Join constraint as declared by the caller.
#[derive(Debug)]
pub enum JoinOn {
    On(CondBuilder),
    Using(Vec<String>),
    None,
}

impl JoinOn {
    pub fn on<F>(f: F) -> Self
    where
        F: FnOnce(CondBuilder) -> CondBuilder,
    {
        JoinOn::On(f(CondBuilder::new()))
    }

    pub fn using(columns: Vec<impl Into<String>>) -> Self {
        JoinOn::Using(columns.into_iter().map(|c| c.into()).collect())
    }
}

/// Join constraint after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    On(Vec<Predicate>),
    Using(Vec<String>),
}

/// One entry of the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) join: Option<JoinType>,
    pub(crate) constraint: Option<Constraint>,
    pub(crate) sub: Option<Box<Query>>,
}

impl Source {
    /// Parse `"orders"`, `"orders o"` or `"orders AS o"`.
    pub fn parse(spec: &str) -> Self {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        let (name, alias) = match parts.as_slice() {
            [name] => (*name, None),
            [name, alias] => (*name, Some(*alias)),
            [name, kw, alias] if kw.eq_ignore_ascii_case("as") => (*name, Some(*alias)),
            _ => (spec.trim(), None),
        };
        Self {
            name: name.to_string(),
            alias: alias.map(str::to_string),
            join: None,
            constraint: None,
            sub: None,
        }
    }

    pub fn sub_query(query: Query, alias: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            alias: Some(alias.into()),
            join: None,
            constraint: None,
            sub: Some(Box::new(query)),
        }
    }

    pub(crate) fn joined(mut self, join_type: JoinType, on: JoinOn) -> Result<Self> {
        let constraint = match on {
            JoinOn::On(cb) => {
                let preds = cb.finish()?;
                if crate::condition::has_content(&preds) {
                    Some(Constraint::On(preds))
                } else {
                    None
                }
            }
            JoinOn::Using(cols) if cols.iter().any(|c| !c.trim().is_empty()) => {
                Some(Constraint::Using(cols))
            }
            JoinOn::Using(_) | JoinOn::None => None,
        };

        if join_type.needs_constraint() && constraint.is_none() {
            return Err(QueryError::misuse(format!(
                "{} {} declared without ON or USING",
                join_type,
                self.label()
            )));
        }

        self.join = Some(join_type);
        self.constraint = constraint;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn join_type(&self) -> Option<JoinType> {
        self.join
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn is_sub_query(&self) -> bool {
        self.sub.is_some()
    }

    /// Alias if declared, else the table name.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}
