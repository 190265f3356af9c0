//! The query descriptor.
//!
//! [`QueryBuilder`] collects columns, sources, conditions, grouping, sorting
//! and pagination. [`QueryBuilder::build`] is the single finalization step:
//! it surfaces any recorded misuse, validates pagination, runs the join
//! optimizer and returns an immutable [`Query`] that the emitters only read.

use crate::builder::{CondBuilder, Conditions};
use crate::condition::{find, Op, Operand, Predicate};
use crate::config::Dialect;
use crate::error::{QueryError, Result};
use crate::hook::{HookRegistry, Metadata};
use crate::optimize::optimize_sources;
use crate::source::{JoinOn, JoinType, Source, Table};
use crate::sql::{CompiledSelect, SqlCompiler};
use crate::value::{Normalized, Value};
use crate::vector::{VectorJsonCompiler, VectorSearch};
use std::fmt;
use tracing::debug;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn to_sql(&self) -> String {
        format!("{} {}", self.field, self.direction)
    }
}

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn to_sql(&self, column: &str) -> String {
        match self {
            AggregateFunc::Count if column.is_empty() || column == "*" => "COUNT(*)".to_string(),
            AggregateFunc::Count => format!("COUNT({})", column),
            AggregateFunc::CountDistinct => format!("COUNT(DISTINCT {})", column),
            AggregateFunc::Sum => format!("SUM({})", column),
            AggregateFunc::Avg => format!("AVG({})", column),
            AggregateFunc::Min => format!("MIN({})", column),
            AggregateFunc::Max => format!("MAX({})", column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub func: AggregateFunc,
    pub column: String,
    pub alias: Option<String>,
}

impl Aggregate {
    pub fn to_sql(&self) -> String {
        let expr = self.func.to_sql(&self.column);
        match &self.alias {
            Some(alias) => format!("{} AS {}", expr, alias),
            None => expr,
        }
    }
}

/// Page/row pagination, optionally cursor based.
///
/// When set with a non-zero row count it always wins over `limit`/`offset`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    page: u64,
    rows: u64,
    last: Option<Value>,
}

impl Page {
    pub fn new(page: u64, rows: u64) -> Self {
        Self {
            page,
            rows,
            last: None,
        }
    }

    pub fn page(&self) -> u64 {
        self.page.max(1)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Last value seen on the previous page, if cursor paging is active.
    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.rows > 0
    }

    /// Saturates at `u64::MAX` for page numbers past the addressable range.
    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.rows)
    }
}

/// `WITH name AS (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub recursive: bool,
    pub query: Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionKind {
    All,
    Distinct,
}

impl fmt::Display for UnionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionKind::All => write!(f, "UNION ALL"),
            UnionKind::Distinct => write!(f, "UNION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub kind: UnionKind,
    pub query: Query,
}

/// A finalized, backend-agnostic query description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub(crate) distinct: bool,
    pub(crate) results: Vec<String>,
    pub(crate) aggregates: Vec<Aggregate>,
    pub(crate) sources: Vec<Source>,
    pub(crate) conds: Vec<Predicate>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Vec<Predicate>,
    pub(crate) sorts: Vec<Sort>,
    pub(crate) page: Option<Page>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) ctes: Vec<Cte>,
    pub(crate) unions: Vec<Union>,
    pub(crate) meta: Metadata,
}

impl Query {
    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn conditions(&self) -> &[Predicate] {
        &self.conds
    }

    pub fn having(&self) -> &[Predicate] {
        &self.having
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Effective page/row pagination, if any.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref().filter(|p| p.is_active())
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// The first vector search node in the condition tree, with its field.
    pub fn vector_search(&self) -> Option<(&str, &VectorSearch)> {
        let node = find(&self.conds, &|p| p.op == Op::VectorSearch)?;
        match &node.value {
            Some(Operand::Search(search)) => Some((node.key.as_str(), search.as_ref())),
            _ => None,
        }
    }

    /// `field > last` (ascending) or `field < last` (descending) on the
    /// first sort key, when cursor paging is active.
    pub fn cursor(&self) -> Option<Predicate> {
        let page = self.page()?;
        let last = page.last()?;
        let sort = self.sorts.first()?;
        let op = match sort.direction {
            SortDirection::Asc => Op::Gt,
            SortDirection::Desc => Op::Lt,
        };
        Some(Predicate::value(op, sort.field.clone(), last.clone()))
    }

    /// Compile with the default dialect.
    pub fn to_sql(&self) -> CompiledSelect {
        SqlCompiler::new(Dialect::default()).compile_select(self)
    }

    /// Compile to a similarity-search request body.
    pub fn to_vector_json(&self) -> Result<String> {
        VectorJsonCompiler::new().compile(self)
    }
}

/// Fluent builder for [`Query`].
#[derive(Debug, Default)]
pub struct QueryBuilder {
    distinct: bool,
    results: Vec<String>,
    aggregates: Vec<Aggregate>,
    sources: Vec<Source>,
    conds: CondBuilder,
    group_by: Vec<String>,
    having: CondBuilder,
    sorts: Vec<Sort>,
    page: Option<Page>,
    limit: Option<u64>,
    offset: Option<u64>,
    ctes: Vec<Cte>,
    unions: Vec<Union>,
    meta: Metadata,
    misuse: Option<QueryError>,
}

impl Conditions for QueryBuilder {
    fn cond_builder(&mut self) -> &mut CondBuilder {
        &mut self.conds
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, err: QueryError) {
        if self.misuse.is_none() {
            self.misuse = Some(err);
        }
    }

    /// Select specific columns
    pub fn select(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.results = columns
            .into_iter()
            .map(|c| c.into())
            .filter(|c: &String| !c.trim().is_empty())
            .collect();
        self
    }

    /// Add a column to select
    pub fn add_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !column.trim().is_empty() {
            self.results.push(column);
        }
        self
    }

    /// Add an aggregate function
    pub fn aggregate(
        mut self,
        func: AggregateFunc,
        column: impl Into<String>,
        alias: Option<impl Into<String>>,
    ) -> Self {
        self.aggregates.push(Aggregate {
            func,
            column: column.into(),
            alias: alias.map(|a| a.into()),
        });
        self
    }

    /// Use DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Base source, or an implicit cross join when one is already declared.
    pub fn from(mut self, source: &str) -> Self {
        let source = Source::parse(source);
        if self.sources.is_empty() {
            self.sources.push(source);
        } else {
            match source.joined(JoinType::Comma, JoinOn::None) {
                Ok(s) => self.sources.push(s),
                Err(err) => self.fail(err),
            }
        }
        self
    }

    /// Base source named after a row type.
    pub fn of(self, table: &impl Table) -> Self {
        let name = table.table_name().to_string();
        self.from(&name)
    }

    /// Sub-query as the base source.
    pub fn from_sub<F>(mut self, alias: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        match f(QueryBuilder::new()).build() {
            Ok(query) => self.sources.push(Source::sub_query(query, alias)),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Add a JOIN clause
    pub fn join(mut self, join_type: JoinType, source: &str, on: JoinOn) -> Self {
        if self.sources.is_empty() {
            self.fail(QueryError::misuse(format!("{} {} declared before any base source", join_type, source)));
            return self;
        }
        match Source::parse(source).joined(join_type, on) {
            Ok(s) => self.sources.push(s),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn inner_join(self, source: &str, on: JoinOn) -> Self {
        self.join(JoinType::Inner, source, on)
    }

    pub fn left_join(self, source: &str, on: JoinOn) -> Self {
        self.join(JoinType::Left, source, on)
    }

    pub fn right_join(self, source: &str, on: JoinOn) -> Self {
        self.join(JoinType::Right, source, on)
    }

    pub fn cross_join(self, source: &str) -> Self {
        self.join(JoinType::Cross, source, JoinOn::None)
    }

    /// Join a sub-query under `alias`.
    pub fn join_sub<F>(mut self, join_type: JoinType, alias: impl Into<String>, f: F, on: JoinOn) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        if self.sources.is_empty() {
            self.fail(QueryError::misuse("sub-query join declared before any base source"));
            return self;
        }
        let joined = f(QueryBuilder::new())
            .build()
            .and_then(|q| Source::sub_query(q, alias).joined(join_type, on));
        match joined {
            Ok(s) => self.sources.push(s),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Add GROUP BY columns
    pub fn group_by(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.group_by
            .extend(columns.into_iter().map(|c| c.into()).filter(|c: &String| !c.is_empty()));
        self
    }

    /// Add HAVING conditions
    pub fn having<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CondBuilder) -> CondBuilder,
    {
        self.having = f(std::mem::take(&mut self.having));
        self
    }

    /// Add ORDER BY
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        if !field.is_empty() {
            self.sorts.push(Sort { field, direction });
        }
        self
    }

    pub fn sort_asc(self, field: impl Into<String>) -> Self {
        self.sort(field, SortDirection::Asc)
    }

    pub fn sort_desc(self, field: impl Into<String>) -> Self {
        self.sort(field, SortDirection::Desc)
    }

    /// Set LIMIT. Ignored whenever page/row pagination is set.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Set OFFSET. Ignored whenever page/row pagination is set.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = (offset > 0).then_some(offset);
        self
    }

    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page.get_or_insert_with(Page::default).page = page;
        self
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.page.get_or_insert_with(Page::default).rows = rows;
        self
    }

    /// Cursor paging: continue after `value` of the first sort key.
    pub fn last(mut self, value: impl Into<Value>) -> Self {
        match value.into().into_scalar() {
            Normalized::Present(v) => self.page.get_or_insert_with(Page::default).last = Some(v),
            Normalized::Absent => {}
            Normalized::Invalid(reason) => self.fail(QueryError::misuse(format!("last: {}", reason))),
        }
        self
    }

    /// `WITH name AS (...)`
    pub fn with<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_cte(name.into(), false, f)
    }

    /// `WITH RECURSIVE name AS (...)`
    pub fn with_recursive<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_cte(name.into(), true, f)
    }

    fn push_cte<F>(mut self, name: String, recursive: bool, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        if name.trim().is_empty() {
            self.fail(QueryError::misuse("CTE requires a name"));
            return self;
        }
        match f(QueryBuilder::new()).build() {
            Ok(query) => self.ctes.push(Cte {
                name,
                recursive,
                query,
            }),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn union<F>(mut self, kind: UnionKind, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        match f(QueryBuilder::new()).build() {
            Ok(query) => self.unions.push(Union { kind, query }),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn metadata(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    /// Finalize without interceptors.
    pub fn build(self) -> Result<Query> {
        self.finalize()
    }

    /// Finalize, running registered interceptors around the build.
    pub fn build_with(mut self, hooks: &HookRegistry) -> Result<Query> {
        hooks.before_build(&mut self.meta)?;
        let query = self.finalize()?;
        hooks.after_build(&query)?;
        Ok(query)
    }

    fn finalize(self) -> Result<Query> {
        if let Some(err) = self.misuse {
            return Err(err);
        }
        let conds = self.conds.finish()?;
        let having = self.having.finish()?;

        if let Some(page) = &self.page {
            if page.is_active() && page.last.is_some() && self.sorts.is_empty() {
                return Err(QueryError::misuse(
                    "cursor pagination requires a sort key to compare the last value against",
                ));
            }
        }

        let mut query = Query {
            distinct: self.distinct,
            results: self.results,
            aggregates: self.aggregates,
            sources: self.sources,
            conds,
            group_by: self.group_by,
            having,
            sorts: self.sorts,
            page: self.page,
            limit: self.limit,
            offset: self.offset,
            ctes: self.ctes,
            unions: self.unions,
            meta: self.meta,
        };

        if !query.results.is_empty() && query.sources.len() >= 2 {
            let before = query.sources.len();
            query.sources = optimize_sources(&query);
            if query.sources.len() != before {
                debug!(
                    removed = before - query.sources.len(),
                    kept = query.sources.len(),
                    "removed unreferenced joins"
                );
            }
        }

        debug!(
            sources = query.sources.len(),
            conditions = query.conds.len(),
            "query built"
        );
        Ok(query)
    }
}
