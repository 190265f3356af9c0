//! INSERT, UPDATE and DELETE descriptions.
//!
//! Assignments go through the same normalizer as comparisons: a zero value
//! leaves the column out of the statement. Use [`UpdateBuilder::set_null`] or
//! [`UpdateBuilder::set_raw`] to write NULL or an expression explicitly.

use crate::builder::{CondBuilder, Conditions};
use crate::condition::Predicate;
use crate::error::{QueryError, Result};
use crate::source::Table;
use crate::sql::{Compiled, SqlCompiler};
use crate::value::{Normalized, Value};
use tracing::trace;

/// Right-hand side of `column = ...`.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign {
    Bind(Value),
    Null,
    /// Written verbatim, e.g. `count + 1`.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Assign,
}

/// Accumulates assignments, recording the first misuse.
#[derive(Debug, Default)]
struct Assignments {
    items: Vec<Assignment>,
    misuse: Option<QueryError>,
}

impl Assignments {
    fn set(&mut self, column: String, value: Value) {
        if self.misuse.is_some() {
            return;
        }
        match value.into_assignment() {
            Normalized::Present(v) => self.push(column, Assign::Bind(v)),
            Normalized::Absent => trace!(column = %column, "assignment elided"),
            Normalized::Invalid(kind) => {
                self.misuse = Some(QueryError::misuse(format!(
                    "cannot assign a {} value to column {}",
                    kind, column
                )))
            }
        }
    }

    fn push(&mut self, column: String, value: Assign) {
        if self.misuse.is_some() {
            return;
        }
        // Last write to a column wins.
        self.items.retain(|a| a.column != column);
        self.items.push(Assignment { column, value });
    }

    fn finish(self, table: &str) -> Result<Vec<Assignment>> {
        if let Some(err) = self.misuse {
            return Err(err);
        }
        if self.items.is_empty() {
            return Err(QueryError::Query(format!(
                "no columns to write for table {}",
                table
            )));
        }
        Ok(self.items)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub(crate) table: String,
    pub(crate) assigns: Vec<Assignment>,
}

impl Insert {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assigns
    }

    pub fn to_sql(&self) -> Compiled {
        SqlCompiler::default().compile_insert(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub(crate) table: String,
    pub(crate) assigns: Vec<Assignment>,
    pub(crate) conds: Vec<Predicate>,
}

impl Update {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assigns
    }

    pub fn conditions(&self) -> &[Predicate] {
        &self.conds
    }

    pub fn to_sql(&self) -> Compiled {
        SqlCompiler::default().compile_update(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub(crate) table: String,
    pub(crate) conds: Vec<Predicate>,
}

impl Delete {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conditions(&self) -> &[Predicate] {
        &self.conds
    }

    pub fn to_sql(&self) -> Compiled {
        SqlCompiler::default().compile_delete(self)
    }
}

/// INSERT query builder
#[derive(Debug, Default)]
pub struct InsertBuilder {
    table: String,
    assigns: Assignments,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assigns: Assignments::default(),
        }
    }

    pub fn of(table: &impl Table) -> Self {
        Self::new(table.table_name())
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assigns.set(column.into(), value.into());
        self
    }

    pub fn set_null(mut self, column: impl Into<String>) -> Self {
        self.assigns.push(column.into(), Assign::Null);
        self
    }

    pub fn set_raw(mut self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.assigns.push(column.into(), Assign::Raw(expr.into()));
        self
    }

    pub fn build(self) -> Result<Insert> {
        let assigns = self.assigns.finish(&self.table)?;
        Ok(Insert {
            table: self.table,
            assigns,
        })
    }
}

/// UPDATE query builder
#[derive(Debug, Default)]
pub struct UpdateBuilder {
    table: String,
    assigns: Assignments,
    conds: CondBuilder,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn of(table: &impl Table) -> Self {
        Self::new(table.table_name())
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assigns.set(column.into(), value.into());
        self
    }

    pub fn set_null(mut self, column: impl Into<String>) -> Self {
        self.assigns.push(column.into(), Assign::Null);
        self
    }

    pub fn set_raw(mut self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.assigns.push(column.into(), Assign::Raw(expr.into()));
        self
    }

    pub fn build(self) -> Result<Update> {
        let conds = self.conds.finish()?;
        let assigns = self.assigns.finish(&self.table)?;
        Ok(Update {
            table: self.table,
            assigns,
            conds,
        })
    }
}

impl Conditions for UpdateBuilder {
    fn cond_builder(&mut self) -> &mut CondBuilder {
        &mut self.conds
    }
}

/// DELETE query builder
#[derive(Debug, Default)]
pub struct DeleteBuilder {
    table: String,
    conds: CondBuilder,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conds: CondBuilder::new(),
        }
    }

    pub fn of(table: &impl Table) -> Self {
        Self::new(table.table_name())
    }

    pub fn build(self) -> Result<Delete> {
        Ok(Delete {
            table: self.table,
            conds: self.conds.finish()?,
        })
    }
}

impl Conditions for DeleteBuilder {
    fn cond_builder(&mut self) -> &mut CondBuilder {
        &mut self.conds
    }
}
