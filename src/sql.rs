//! SQL emission.
//!
//! [`SqlCompiler`] renders a finalized [`Query`] (or an INSERT / UPDATE /
//! DELETE description) into SQL text plus an ordered argument list. Scalar
//! comparison values are bound through placeholders; `IN` lists are written
//! as SQL literals.
//!
//! Sibling predicates are joined with AND unless a bare OR marker sits
//! between two flat predicates. A group node is always AND-joined to its
//! left neighbour.

use crate::condition::{Op, Operand, Predicate};
use crate::config::{Dialect, PaginationStyle, PlaceholderStyle};
use crate::error::{QueryError, Result};
use crate::mutation::{Assign, Assignment, Delete, Insert, Update};
use crate::query::Query;
use crate::source::{Constraint, JoinType, Source};
use crate::value::{format_value, Value};
use crate::vector::VectorSearch;
use std::collections::BTreeMap;
use tracing::debug;

/// Output of a SELECT compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSelect {
    pub sql: String,
    pub args: Vec<Value>,
    /// Synthetic or declared column alias → the expression it names.
    pub aliases: BTreeMap<String, String>,
}

/// SQL text and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    dialect: Dialect,
}

impl SqlCompiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn compile_select(&self, query: &Query) -> CompiledSelect {
        let mut w = Writer::new(&self.dialect);
        let sql = w.select(query, Mode::Plain);
        debug!(args = w.args.len(), "compiled select");
        CompiledSelect {
            sql,
            args: w.args,
            aliases: w.aliases,
        }
    }

    /// Total-row count sharing the query's sources and conditions.
    pub fn compile_count(&self, query: &Query) -> Compiled {
        let mut w = Writer::new(&self.dialect);
        let sql = if query.group_by.is_empty() && !query.distinct && query.unions.is_empty() {
            w.select(query, Mode::Count)
        } else {
            format!("SELECT COUNT(*) FROM ({}) AS t_count", w.select(query, Mode::CountInner))
        };
        w.finish(sql)
    }

    /// Relational similarity search using the first vector search node.
    pub fn compile_vector_search(&self, query: &Query) -> Result<Compiled> {
        let (field, search) = query
            .vector_search()
            .ok_or_else(|| QueryError::Query("no vector search condition in query".to_string()))?;
        let mut w = Writer::new(&self.dialect);
        let sql = w.select(query, Mode::Vector { field, search });
        debug!(field, limit = search.fetch_limit(), "compiled vector search");
        Ok(w.finish(sql))
    }

    pub fn compile_insert(&self, insert: &Insert) -> Compiled {
        let mut w = Writer::new(&self.dialect);
        let mut columns = Vec::with_capacity(insert.assigns.len());
        let mut values = Vec::with_capacity(insert.assigns.len());
        for assign in &insert.assigns {
            columns.push(assign.column.as_str());
            values.push(w.assigned(assign));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            insert.table,
            columns.join(", "),
            values.join(", ")
        );
        w.finish(sql)
    }

    pub fn compile_update(&self, update: &Update) -> Compiled {
        let mut w = Writer::new(&self.dialect);
        let set_clauses: Vec<String> = update
            .assigns
            .iter()
            .map(|a| format!("{} = {}", a.column, w.assigned(a)))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", update.table, set_clauses.join(", "));
        let where_clause = w.list(&update.conds, false);
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        w.finish(sql)
    }

    pub fn compile_delete(&self, delete: &Delete) -> Compiled {
        let mut w = Writer::new(&self.dialect);
        let mut sql = format!("DELETE FROM {}", delete.table);
        let where_clause = w.list(&delete.conds, false);
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        w.finish(sql)
    }
}

#[derive(Clone, Copy)]
enum Mode<'q> {
    Plain,
    /// `SELECT COUNT(*)` with no ordering or paging.
    Count,
    /// Regular columns with no ordering or paging, wrapped by a count.
    CountInner,
    Vector {
        field: &'q str,
        search: &'q VectorSearch,
    },
}

/// Rendering state for one statement. Arguments are pushed in the same
/// order their placeholders are written.
struct Writer<'d> {
    dialect: &'d Dialect,
    args: Vec<Value>,
    alias_seq: usize,
    aliases: BTreeMap<String, String>,
}

impl<'d> Writer<'d> {
    fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            args: Vec::new(),
            alias_seq: 0,
            aliases: BTreeMap::new(),
        }
    }

    fn finish(self, sql: String) -> Compiled {
        Compiled {
            sql,
            args: self.args,
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.args.push(value);
        match self.dialect.placeholder {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${}", self.args.len()),
        }
    }

    fn assigned(&mut self, assign: &Assignment) -> String {
        match &assign.value {
            Assign::Bind(v) => self.bind(v.clone()),
            Assign::Null => "NULL".to_string(),
            Assign::Raw(expr) => expr.clone(),
        }
    }

    fn select(&mut self, q: &Query, mode: Mode<'_>) -> String {
        let mut sql = String::new();

        if !q.ctes.is_empty() {
            sql.push_str("WITH ");
            if q.ctes.iter().any(|c| c.recursive) {
                sql.push_str("RECURSIVE ");
            }
            let mut parts = Vec::with_capacity(q.ctes.len());
            for cte in &q.ctes {
                let inner = self.select(&cte.query, Mode::Plain);
                parts.push(format!("{} AS ({})", cte.name, inner));
            }
            sql.push_str(&parts.join(", "));
            sql.push(' ');
        }

        sql.push_str("SELECT ");
        if matches!(mode, Mode::Count) {
            sql.push_str("COUNT(*)");
        } else {
            if q.distinct {
                sql.push_str("DISTINCT ");
            }
            sql.push_str(&self.columns(q));
        }

        if let Mode::Vector { field, search } = mode {
            let metric = search.distance_metric().sql_operator();
            let ph = self.bind(Value::Vector(search.vector().to_vec()));
            sql.push_str(&format!(", {} {} {} AS distance", field, metric, ph));
        }

        if !q.sources.is_empty() {
            sql.push_str(" FROM ");
            let from = self.sources(&q.sources);
            sql.push_str(&from);
        }

        let where_clause = self.where_clause(q, mode);
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        if !q.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&q.group_by.join(", "));
        }

        let having = self.list(&q.having, false);
        if !having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        for union in &q.unions {
            let inner = self.select(&union.query, Mode::Plain);
            sql.push_str(&format!(" {} {}", union.kind, inner));
        }

        if matches!(mode, Mode::Count | Mode::CountInner) {
            return sql;
        }

        let mut order: Vec<String> = Vec::new();
        if matches!(mode, Mode::Vector { .. }) {
            order.push("distance".to_string());
        }
        order.extend(q.sorts.iter().map(|s| s.to_sql()));
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        sql.push_str(&self.pagination(q, mode));
        sql
    }

    fn columns(&mut self, q: &Query) -> String {
        let mut cols: Vec<String> = Vec::with_capacity(q.results.len() + q.aggregates.len());
        for r in &q.results {
            cols.push(self.column(r));
        }
        for agg in &q.aggregates {
            if let Some(alias) = &agg.alias {
                self.aliases.insert(alias.clone(), agg.func.to_sql(&agg.column));
            }
            cols.push(agg.to_sql());
        }
        if cols.is_empty() {
            "*".to_string()
        } else {
            cols.join(", ")
        }
    }

    fn column(&mut self, col: &str) -> String {
        let col = col.trim();
        if let Some((expr, alias)) = split_alias(col) {
            self.aliases.insert(alias.to_string(), expr.to_string());
            return format!("{} AS {}", expr, alias);
        }

        let qualified = col.contains('.') && !col.ends_with(".*");
        let needs_alias = qualified || col.contains(' ') || has_distinct_prefix(col);
        if !needs_alias {
            return col.to_string();
        }

        let alias = format!("c{}", self.alias_seq);
        self.alias_seq += 1;
        self.aliases.insert(alias.clone(), col.to_string());
        format!("{} AS {}", col, alias)
    }

    fn sources(&mut self, sources: &[Source]) -> String {
        let mut out = String::new();
        for (i, source) in sources.iter().enumerate() {
            let reference = self.source_ref(source);
            match source.join {
                None if i == 0 => out.push_str(&reference),
                Some(JoinType::Comma) | None => {
                    out.push_str(", ");
                    out.push_str(&reference);
                }
                Some(join) => {
                    out.push_str(&format!(" {} {}", join, reference));
                    match &source.constraint {
                        Some(Constraint::On(preds)) => {
                            let on = self.list(preds, false);
                            if !on.is_empty() {
                                out.push_str(" ON ");
                                out.push_str(&on);
                            }
                        }
                        Some(Constraint::Using(cols)) => {
                            out.push_str(&format!(" USING ({})", cols.join(", ")));
                        }
                        None => {}
                    }
                }
            }
        }
        out
    }

    fn source_ref(&mut self, source: &Source) -> String {
        match (&source.sub, &source.alias) {
            (Some(sub), alias) => {
                let inner = self.select(sub, Mode::Plain);
                match alias {
                    Some(a) => format!("({}) {}", inner, a),
                    None => format!("({})", inner),
                }
            }
            (None, Some(alias)) => format!("{} {}", source.name, alias),
            (None, None) => source.name.clone(),
        }
    }

    fn where_clause(&mut self, q: &Query, mode: Mode<'_>) -> String {
        let cursor = match mode {
            Mode::Count | Mode::CountInner => None,
            _ => q.cursor(),
        };

        let Some(cursor) = cursor else {
            return self.list(&q.conds, false);
        };

        let head = self.node(&cursor);
        let rest = self.list(&q.conds, false);
        if rest.is_empty() {
            head
        } else if q.conds.iter().any(Predicate::is_connective) {
            format!("{} AND ({})", head, rest)
        } else {
            format!("{} AND {}", head, rest)
        }
    }

    fn pagination(&self, q: &Query, mode: Mode<'_>) -> String {
        let (mut limit, offset) = match q.page() {
            Some(page) => {
                let offset = if q.cursor().is_some() {
                    None
                } else {
                    Some(page.offset()).filter(|o| *o > 0)
                };
                (Some(page.rows()), offset)
            }
            None => (q.limit, q.offset),
        };
        if let Mode::Vector { search, .. } = mode {
            limit = Some(search.fetch_limit() as u64);
        }

        match self.dialect.pagination {
            PaginationStyle::LimitOffset => {
                let mut out = String::new();
                if let Some(limit) = limit {
                    out.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = offset {
                    out.push_str(&format!(" OFFSET {}", offset));
                }
                out
            }
            PaginationStyle::OffsetFetch => match (limit, offset) {
                (None, None) => String::new(),
                (None, Some(o)) => format!(" OFFSET {} ROWS", o),
                (Some(l), o) => format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", o.unwrap_or(0), l),
            },
        }
    }

    /// Render one tree level. Nodes that render to nothing take no glue.
    fn list(&mut self, preds: &[Predicate], alternatives: bool) -> String {
        let mut out = String::new();
        let mut pending_or = false;
        for p in preds {
            if p.is_connective() {
                pending_or = true;
                continue;
            }
            let fragment = self.node(p);
            if fragment.is_empty() {
                continue;
            }
            if !out.is_empty() {
                let or = alternatives || (pending_or && !p.op.is_group());
                out.push_str(if or { " OR " } else { " AND " });
            }
            pending_or = false;
            out.push_str(&fragment);
        }
        out
    }

    fn node(&mut self, p: &Predicate) -> String {
        match p.op {
            Op::Eq | Op::Ne | Op::Gt | Op::Gte | Op::Lt | Op::Lte => match p.scalar() {
                Some(v) => {
                    let ph = self.bind(v.clone());
                    format!("{} {} {}", p.key, p.op, ph)
                }
                None => String::new(),
            },
            Op::Like | Op::LikeLeft | Op::NotLike => match p.scalar() {
                Some(v) => {
                    let ph = self.bind(v.clone());
                    match self.dialect.like_escape() {
                        Some(esc) => format!("{} {} {} ESCAPE '{}'", p.key, p.op, ph, esc),
                        None => format!("{} {} {}", p.key, p.op, ph),
                    }
                }
                None => String::new(),
            },
            Op::In | Op::NotIn => match p.scalar() {
                Some(v) => format!("{} {} ({})", p.key, p.op, format_value(v)),
                None => String::new(),
            },
            Op::IsNull | Op::NonNull => format!("{} {}", p.key, p.op),
            Op::Raw => {
                let args = match &p.value {
                    Some(Operand::Args(args)) => args.as_slice(),
                    _ => &[],
                };
                self.raw(&p.key, args)
            }
            Op::And | Op::Or => {
                let inner = self.list(&p.subs, p.op == Op::Or);
                if inner.is_empty() {
                    inner
                } else {
                    format!("({})", inner)
                }
            }
            Op::SubQuery => match &p.value {
                Some(Operand::SubQuery(sub)) => {
                    let inner = self.select(sub, Mode::Plain);
                    format!("{} ({})", p.key, inner)
                }
                _ => String::new(),
            },
            Op::VectorDistance => match &p.value {
                Some(Operand::Distance(d)) => {
                    let vec_ph = self.bind(Value::Vector(d.vector().to_vec()));
                    let threshold = self.bind(Value::Float(f64::from(d.threshold())));
                    format!(
                        "{} {} {} < {}",
                        p.key,
                        d.distance_metric().sql_operator(),
                        vec_ph,
                        threshold
                    )
                }
                _ => String::new(),
            },
            Op::VectorSearch | Op::Extension | Op::OrMarker => String::new(),
        }
    }

    /// Bind raw arguments in order, rewriting `?` for numbered dialects.
    fn raw(&mut self, fragment: &str, args: &[Value]) -> String {
        if args.is_empty() {
            return fragment.to_string();
        }
        let mut out = String::with_capacity(fragment.len());
        let mut pending = args.iter();
        for ch in fragment.chars() {
            if ch == '?' {
                if let Some(arg) = pending.next() {
                    let ph = self.bind(arg.clone());
                    out.push_str(&ph);
                    continue;
                }
            }
            out.push(ch);
        }
        if pending.next().is_some() {
            debug!(fragment, "raw fragment has fewer placeholders than arguments");
        }
        out
    }
}

/// Split `expr AS alias` when the alias is a single identifier.
fn split_alias(col: &str) -> Option<(&str, &str)> {
    let upper = col.to_ascii_uppercase();
    let idx = upper.rfind(" AS ")?;
    let expr = col[..idx].trim();
    let alias = col[idx + 4..].trim();
    let is_ident = !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '"' || c == '`');
    (is_ident && !expr.is_empty()).then_some((expr, alias))
}

fn has_distinct_prefix(col: &str) -> bool {
    col.len() > 9 && col.get(..9).is_some_and(|p| p.eq_ignore_ascii_case("DISTINCT "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Conditions;
    use crate::query::{AggregateFunc, Page, QueryBuilder, UnionKind};
    use crate::source::JoinOn;
    use crate::vector::{DistanceMetric, Diversity, VectorDistance};

    fn sql(q: QueryBuilder) -> CompiledSelect {
        q.build().unwrap().to_sql()
    }

    #[test]
    fn test_select_basic() {
        let c = sql(QueryBuilder::new().from("users"));
        assert_eq!(c.sql, "SELECT * FROM users");
        assert!(c.args.is_empty());
    }

    #[test]
    fn test_select_columns() {
        let c = sql(QueryBuilder::new().select(vec!["id", "name", "email"]).from("users"));
        assert_eq!(c.sql, "SELECT id, name, email FROM users");
    }

    #[test]
    fn test_select_where() {
        let c = sql(QueryBuilder::new().from("users").eq("id", 1));
        assert_eq!(c.sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(c.args, vec![Value::Int(1)]);
    }

    #[test]
    fn test_select_where_multiple() {
        let c = sql(QueryBuilder::new().from("users").eq("age", 25).gt("score", 100));
        assert_eq!(c.sql, "SELECT * FROM users WHERE age = ? AND score > ?");
        assert_eq!(c.args, vec![Value::Int(25), Value::Int(100)]);
    }

    #[test]
    fn test_select_where_in_uses_literals() {
        let c = sql(QueryBuilder::new().from("users").in_("id", vec![1, 2]).nin("name", vec!["O'Brien"]));
        assert_eq!(c.sql, "SELECT * FROM users WHERE id IN (1, 2) AND name NOT IN ('O''Brien')");
        assert!(c.args.is_empty());
    }

    #[test]
    fn test_empty_in_drops_where() {
        let c = sql(QueryBuilder::new().from("users").in_("id", Vec::<i64>::new()));
        assert_eq!(c.sql, "SELECT * FROM users");
    }

    #[test]
    fn test_null_checks_and_like() {
        let c = sql(QueryBuilder::new()
            .from("users")
            .is_null("deleted_at")
            .non_null("verified_at")
            .like("name", "Ali"));
        assert_eq!(
            c.sql,
            "SELECT * FROM users WHERE deleted_at IS NULL AND verified_at IS NOT NULL AND name LIKE ?"
        );
        assert_eq!(c.args, vec![Value::from("%Ali%")]);
    }

    #[test]
    fn test_or_marker_vs_or_group() {
        let c = sql(QueryBuilder::new()
            .from("t")
            .eq("a", 1)
            .or()
            .eq("b", 2)
            .eq("c", 3)
            .or()
            .or_group(|g| g.eq("d", 4).eq("e", 5)));
        assert_eq!(
            c.sql,
            "SELECT * FROM t WHERE a = ? OR b = ? AND c = ? AND (d = ? OR e = ?)"
        );
        assert_eq!(c.args.len(), 5);
    }

    #[test]
    fn test_and_group_with_inner_or_marker() {
        let c = sql(QueryBuilder::new()
            .from("t")
            .eq("status", 1)
            .and_group(|g| g.eq("x", 1).or().eq("y", 2)));
        assert_eq!(c.sql, "SELECT * FROM t WHERE status = ? AND (x = ? OR y = ?)");
    }

    #[test]
    fn test_trailing_or_marker_ignored() {
        let c = sql(QueryBuilder::new().from("t").eq("a", 1).or().eq("b", ""));
        assert_eq!(c.sql, "SELECT * FROM t WHERE a = ?");
    }

    #[test]
    fn test_raw_fragment_binds_args() {
        let c = sql(QueryBuilder::new()
            .from("t")
            .eq("a", 1)
            .x_with("b BETWEEN ? AND ?", vec![Value::Int(2), Value::Int(9)]));
        assert_eq!(c.sql, "SELECT * FROM t WHERE a = ? AND b BETWEEN ? AND ?");
        assert_eq!(c.args, vec![Value::Int(1), Value::Int(2), Value::Int(9)]);
    }

    #[test]
    fn test_dollar_placeholders_number_across_sub_queries() {
        let q = QueryBuilder::new()
            .from("t")
            .eq("a", 1)
            .sub("id IN", |s| s.select(vec!["tid"]).from("u").eq("kind", "x"))
            .x_with("b > ?", vec![Value::Int(3)])
            .build()
            .unwrap();
        let c = SqlCompiler::new(Dialect::postgres()).compile_select(&q);
        assert_eq!(
            c.sql,
            "SELECT * FROM t WHERE a = $1 AND id IN (SELECT tid FROM u WHERE kind = $2) AND b > $3"
        );
        assert_eq!(c.args, vec![Value::Int(1), Value::from("x"), Value::Int(3)]);
    }

    #[test]
    fn test_auto_alias() {
        let c = sql(QueryBuilder::new()
            .select(vec!["DISTINCT c.color", "c.id", "c.name AS cat_name", "c.*"])
            .from("cat c"));
        assert_eq!(
            c.sql,
            "SELECT DISTINCT c.color AS c0, c.id AS c1, c.name AS cat_name, c.* FROM cat c"
        );
        assert_eq!(c.aliases.get("c0").map(String::as_str), Some("DISTINCT c.color"));
        assert_eq!(c.aliases.get("c1").map(String::as_str), Some("c.id"));
        assert_eq!(c.aliases.get("cat_name").map(String::as_str), Some("c.name"));
    }

    #[test]
    fn test_select_join() {
        let c = sql(QueryBuilder::new()
            .select(vec!["users.name", "posts.title"])
            .from("users")
            .inner_join("posts", JoinOn::on(|o| o.x("users.id = posts.user_id"))));
        assert_eq!(
            c.sql,
            "SELECT users.name AS c0, posts.title AS c1 FROM users INNER JOIN posts ON users.id = posts.user_id"
        );
    }

    #[test]
    fn test_join_on_binds_values() {
        let c = sql(QueryBuilder::new()
            .from("users u")
            .left_join("posts p", JoinOn::on(|o| o.x("p.user_id = u.id").eq("p.state", "live")))
            .eq("u.active", 1));
        assert_eq!(
            c.sql,
            "SELECT * FROM users u LEFT JOIN posts p ON p.user_id = u.id AND p.state = ? WHERE u.active = ?"
        );
        assert_eq!(c.args, vec![Value::from("live"), Value::Int(1)]);
    }

    #[test]
    fn test_join_using_and_comma() {
        let c = sql(QueryBuilder::new()
            .from("a")
            .from("b")
            .inner_join("c", JoinOn::using(vec!["id"])));
        assert_eq!(c.sql, "SELECT * FROM a, b INNER JOIN c USING (id)");
    }

    #[test]
    fn test_sub_query_source() {
        let c = sql(QueryBuilder::new()
            .from_sub("t", |q| q.select(vec!["id"]).from("users").gt("age", 18))
            .eq("t.id", 5));
        assert_eq!(
            c.sql,
            "SELECT * FROM (SELECT id FROM users WHERE age > ?) t WHERE t.id = ?"
        );
        assert_eq!(c.args, vec![Value::Int(18), Value::Int(5)]);
    }

    #[test]
    fn test_select_order_limit() {
        let c = sql(QueryBuilder::new().from("users").sort_desc("created_at").limit(10));
        assert_eq!(c.sql, "SELECT * FROM users ORDER BY created_at DESC LIMIT 10");
    }

    #[test]
    fn test_page_overrides_limit_offset() {
        let c = sql(QueryBuilder::new().from("t").limit(50).offset(7).page(2).rows(20));
        assert_eq!(c.sql, "SELECT * FROM t LIMIT 20 OFFSET 20");

        // Set after paging, still ignored.
        let c = sql(QueryBuilder::new().from("t").paged(Page::new(3, 10)).limit(50));
        assert_eq!(c.sql, "SELECT * FROM t LIMIT 10 OFFSET 20");

        let c = sql(QueryBuilder::new().from("t").page(1).rows(10));
        assert_eq!(c.sql, "SELECT * FROM t LIMIT 10");
    }

    #[test]
    fn test_cursor_paging() {
        let c = sql(QueryBuilder::new()
            .from("t")
            .eq("kind", "a")
            .sort_asc("id")
            .page(3)
            .rows(10)
            .last(120));
        assert_eq!(c.sql, "SELECT * FROM t WHERE id > ? AND kind = ? ORDER BY id ASC LIMIT 10");
        assert_eq!(c.args, vec![Value::Int(120), Value::from("a")]);

        let c = sql(QueryBuilder::new()
            .from("t")
            .eq("a", 1)
            .or()
            .eq("b", 2)
            .sort_desc("id")
            .rows(10)
            .last(50));
        assert_eq!(
            c.sql,
            "SELECT * FROM t WHERE id < ? AND (a = ? OR b = ?) ORDER BY id DESC LIMIT 10"
        );
    }

    #[test]
    fn test_offset_fetch_dialect() {
        let q = QueryBuilder::new().from("t").sort_asc("id").page(2).rows(5).build().unwrap();
        let c = SqlCompiler::new(Dialect::oracle()).compile_select(&q);
        assert_eq!(c.sql, "SELECT * FROM t ORDER BY id ASC OFFSET 5 ROWS FETCH NEXT 5 ROWS ONLY");
    }

    #[test]
    fn test_like_escape_from_dialect() {
        let q = QueryBuilder::new().from("t").like_left("code", "A_").build().unwrap();
        let c = SqlCompiler::new(Dialect::default().with_custom("like_escape", "\\")).compile_select(&q);
        assert_eq!(c.sql, "SELECT * FROM t WHERE code LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn test_group_by_having() {
        let c = sql(QueryBuilder::new()
            .add_column("user_id")
            .aggregate(AggregateFunc::Count, "*", Some("order_count"))
            .from("orders")
            .group_by(vec!["user_id"])
            .having(|h| h.gt("COUNT(*)", 2)));
        assert_eq!(
            c.sql,
            "SELECT user_id, COUNT(*) AS order_count FROM orders GROUP BY user_id HAVING COUNT(*) > ?"
        );
        assert_eq!(c.aliases.get("order_count").map(String::as_str), Some("COUNT(*)"));
    }

    #[test]
    fn test_select_distinct() {
        let c = sql(QueryBuilder::new().select(vec!["country"]).from("users").distinct());
        assert_eq!(c.sql, "SELECT DISTINCT country FROM users");
    }

    #[test]
    fn test_cte_and_union() {
        let c = sql(QueryBuilder::new()
            .with("recent", |q| q.from("orders").gt("total", 10))
            .from("recent")
            .union(UnionKind::All, |q| q.from("archived").eq("year", 2020)));
        assert_eq!(
            c.sql,
            "WITH recent AS (SELECT * FROM orders WHERE total > ?) SELECT * FROM recent UNION ALL SELECT * FROM archived WHERE year = ?"
        );
        assert_eq!(c.args, vec![Value::Int(10), Value::Int(2020)]);
    }

    #[test]
    fn test_recursive_cte() {
        let c = sql(QueryBuilder::new()
            .with_recursive("tree", |q| q.from("nodes").is_null("parent_id"))
            .from("tree"));
        assert!(c.sql.starts_with("WITH RECURSIVE tree AS ("));
    }

    #[test]
    fn test_count() {
        let q = QueryBuilder::new()
            .from("t")
            .eq("a", 1)
            .sort_asc("id")
            .page(2)
            .rows(10)
            .build()
            .unwrap();
        let c = SqlCompiler::default().compile_count(&q);
        assert_eq!(c.sql, "SELECT COUNT(*) FROM t WHERE a = ?");

        let q = QueryBuilder::new().select(vec!["k"]).from("t").group_by(vec!["k"]).build().unwrap();
        let c = SqlCompiler::default().compile_count(&q);
        assert_eq!(c.sql, "SELECT COUNT(*) FROM (SELECT k FROM t GROUP BY k) AS t_count");
    }

    #[test]
    fn test_vector_search_sql() {
        let q = QueryBuilder::new()
            .from("docs")
            .vector_search(
                "embedding",
                VectorSearch::new(vec![0.5, 0.25], 10)
                    .metric(DistanceMetric::L2)
                    .diversity(Diversity::hash("url")),
            )
            .eq("lang", "en")
            .build()
            .unwrap();
        let c = SqlCompiler::default().compile_vector_search(&q).unwrap();
        assert_eq!(
            c.sql,
            "SELECT *, embedding <-> ? AS distance FROM docs WHERE lang = ? ORDER BY distance LIMIT 50"
        );
        assert_eq!(c.args, vec![Value::Vector(vec![0.5, 0.25]), Value::from("en")]);
    }

    #[test]
    fn test_vector_distance_filter() {
        let c = sql(QueryBuilder::new()
            .from("docs")
            .vector_distance("embedding", VectorDistance::new(vec![1.0], 0.5)));
        assert_eq!(c.sql, "SELECT * FROM docs WHERE embedding <=> ? < ?");
        assert_eq!(c.args, vec![Value::Vector(vec![1.0]), Value::Float(0.5)]);
    }

    #[test]
    fn test_vector_search_without_node_is_error() {
        let q = QueryBuilder::new().from("docs").build().unwrap();
        assert!(SqlCompiler::default().compile_vector_search(&q).is_err());
    }

    #[test]
    fn test_non_ascii_columns() {
        let c = sql(QueryBuilder::new()
            .select(vec!["a日本語xx", "日本語", "DISTINCT 名前", "t.名前"])
            .from("t"));
        assert_eq!(
            c.sql,
            "SELECT a日本語xx, 日本語, DISTINCT 名前 AS c0, t.名前 AS c1 FROM t"
        );
        assert!(!has_distinct_prefix("a日本語xx"));
        assert!(!has_distinct_prefix("DISTINCT"));
        assert!(has_distinct_prefix("distinct 名前"));
    }

    #[test]
    fn test_split_alias() {
        assert_eq!(split_alias("a.b as x"), Some(("a.b", "x")));
        assert_eq!(split_alias("CAST(a AS INT)"), None);
        assert_eq!(split_alias("a.b"), None);
    }
}
