//! Condition tree construction.
//!
//! [`CondBuilder`] appends predicate nodes under AND semantics by default.
//! Values pass through the normalizer first, so an empty string, a numeric
//! zero or `None` makes the call a no-op. Groups are built in an isolated
//! builder and dropped entirely when nothing real is left inside them.
//!
//! The [`Conditions`] trait carries the operator surface so that query,
//! update and delete builders all share it.

use crate::condition::{has_content, Op, Operand, Predicate};
use crate::error::QueryError;
use crate::query::QueryBuilder;
use crate::value::{Normalized, Value};
use crate::vector::{VectorDistance, VectorSearch};
use tracing::trace;

/// Accumulates one level of a condition tree.
#[derive(Debug, Default)]
pub struct CondBuilder {
    preds: Vec<Predicate>,
    misuse: Option<QueryError>,
}

impl CondBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.preds
    }

    pub fn is_empty(&self) -> bool {
        !has_content(&self.preds)
    }

    /// Consume the builder, yielding the nodes or the first recorded misuse.
    pub fn finish(self) -> Result<Vec<Predicate>, QueryError> {
        match self.misuse {
            Some(err) => Err(err),
            None => Ok(self.preds),
        }
    }

    pub(crate) fn fail(&mut self, err: QueryError) {
        if self.misuse.is_none() {
            self.misuse = Some(err);
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.misuse.is_some()
    }

    pub(crate) fn push(&mut self, pred: Predicate) {
        if !self.failed() {
            self.preds.push(pred);
        }
    }

    pub(crate) fn push_value(&mut self, op: Op, key: String, value: Value) {
        if self.failed() {
            return;
        }

        let normalized = if op.is_set() {
            value.into_list()
        } else if op.is_pattern() {
            value.into_pattern()
        } else {
            value.into_scalar()
        };

        match normalized {
            Normalized::Present(v) => {
                let v = match (op, v) {
                    (Op::Like | Op::NotLike, Value::Text(s)) => Value::Text(format!("%{}%", s)),
                    (Op::LikeLeft, Value::Text(s)) => Value::Text(format!("{}%", s)),
                    (_, v) => v,
                };
                self.preds.push(Predicate::value(op, key, v));
            }
            Normalized::Absent => {
                trace!(key = %key, op = %op, "dropping predicate with absent value");
            }
            Normalized::Invalid(reason) => {
                self.fail(QueryError::misuse(format!("{} {}: {}", key, op, reason)));
            }
        }
    }

    pub(crate) fn push_required_in(&mut self, key: String, value: Value) {
        if self.failed() {
            return;
        }
        match value.into_list() {
            Normalized::Present(v) => self.preds.push(Predicate::value(Op::In, key, v)),
            Normalized::Absent => self.fail(QueryError::misuse(format!(
                "in_required({}): no usable values, refusing to compile an unfiltered condition",
                key
            ))),
            Normalized::Invalid(reason) => {
                self.fail(QueryError::misuse(format!("in_required({}): {}", key, reason)))
            }
        }
    }

    pub(crate) fn push_or_marker(&mut self) {
        match self.preds.last() {
            None => {}
            Some(last) if last.is_connective() => {}
            Some(_) => self.push(Predicate::or_marker()),
        }
    }

    /// Attach an isolated sub-tree as one group node if it has real content.
    pub(crate) fn push_group(&mut self, op: Op, inner: CondBuilder) {
        if self.failed() {
            return;
        }
        match inner.finish() {
            Err(err) => self.fail(err),
            Ok(subs) if has_content(&subs) => self.preds.push(Predicate::group(op, subs)),
            Ok(_) => trace!(op = %op, "dropping empty group"),
        }
    }
}

/// The fluent operator surface. Implementors only expose their condition
/// builder; every method here appends to it.
pub trait Conditions: Sized {
    fn cond_builder(&mut self) -> &mut CondBuilder;

    fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Eq, key.into(), value.into());
        self
    }

    fn ne(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Ne, key.into(), value.into());
        self
    }

    fn gt(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Gt, key.into(), value.into());
        self
    }

    fn gte(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Gte, key.into(), value.into());
        self
    }

    fn lt(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Lt, key.into(), value.into());
        self
    }

    fn lte(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Lte, key.into(), value.into());
        self
    }

    /// Explicit boolean equality. Unlike `eq`, `false` is kept.
    fn eq_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.cond_builder()
            .push(Predicate::value(Op::Eq, key, Value::Bool(value)));
        self
    }

    /// `key LIKE '%value%'`
    fn like(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::Like, key.into(), value.into());
        self
    }

    /// `key LIKE 'value%'`
    fn like_left(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::LikeLeft, key.into(), value.into());
        self
    }

    fn not_like(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::NotLike, key.into(), value.into());
        self
    }

    fn in_(mut self, key: impl Into<String>, values: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::In, key.into(), values.into());
        self
    }

    fn nin(mut self, key: impl Into<String>, values: impl Into<Value>) -> Self {
        self.cond_builder().push_value(Op::NotIn, key.into(), values.into());
        self
    }

    /// Like `in_`, but an empty or all-absent list is a misuse instead of a
    /// silently dropped filter.
    fn in_required(mut self, key: impl Into<String>, values: impl Into<Value>) -> Self {
        self.cond_builder().push_required_in(key.into(), values.into());
        self
    }

    fn is_null(mut self, key: impl Into<String>) -> Self {
        self.cond_builder().push(Predicate::new(Op::IsNull, key, None));
        self
    }

    fn non_null(mut self, key: impl Into<String>) -> Self {
        self.cond_builder().push(Predicate::new(Op::NonNull, key, None));
        self
    }

    /// Raw SQL fragment without arguments.
    fn x(self, fragment: impl Into<String>) -> Self {
        self.x_with(fragment, Vec::new())
    }

    /// Raw SQL fragment; `?` markers bind `args` positionally.
    fn x_with(mut self, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = fragment.into();
        if fragment.trim().is_empty() {
            trace!("dropping empty raw fragment");
            return self;
        }
        self.cond_builder()
            .push(Predicate::new(Op::Raw, fragment, Some(Operand::Args(args))));
        self
    }

    /// Bare OR between the previous and the next flat predicate.
    fn or(mut self) -> Self {
        self.cond_builder().push_or_marker();
        self
    }

    /// Parenthesized group joined by AND.
    fn and_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CondBuilder) -> CondBuilder,
    {
        let inner = f(CondBuilder::new());
        self.cond_builder().push_group(Op::And, inner);
        self
    }

    /// Parenthesized group of alternatives joined by OR.
    fn or_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CondBuilder) -> CondBuilder,
    {
        let inner = f(CondBuilder::new());
        self.cond_builder().push_group(Op::Or, inner);
        self
    }

    /// Include the group built by `body` only if `test` returns true.
    /// Both are mandatory.
    fn when<T, B>(mut self, test: Option<T>, body: Option<B>) -> Self
    where
        T: FnOnce() -> bool,
        B: FnOnce(CondBuilder) -> CondBuilder,
    {
        let (test, body) = match (test, body) {
            (Some(t), Some(b)) => (t, b),
            (None, _) => {
                self.cond_builder()
                    .fail(QueryError::misuse("conditional group requires a test function"));
                return self;
            }
            (_, None) => {
                self.cond_builder()
                    .fail(QueryError::misuse("conditional group requires a body function"));
                return self;
            }
        };
        if test() {
            let inner = body(CondBuilder::new());
            self.cond_builder().push_group(Op::And, inner);
        }
        self
    }

    /// `<fragment> (SELECT ...)`, e.g. `sub("id IN", |q| ...)`.
    fn sub<F>(mut self, fragment: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let fragment = fragment.into();
        let cb = self.cond_builder();
        if cb.failed() {
            return self;
        }
        if fragment.trim().is_empty() {
            cb.fail(QueryError::misuse("sub-query condition requires a left-hand fragment"));
            return self;
        }
        match f(QueryBuilder::new()).build() {
            Ok(query) => cb.push(Predicate::new(
                Op::SubQuery,
                fragment,
                Some(Operand::SubQuery(Box::new(query))),
            )),
            Err(err) => cb.fail(err),
        }
        self
    }

    /// Similarity search on `field`. An empty query vector drops the node.
    fn vector_search(mut self, field: impl Into<String>, search: VectorSearch) -> Self {
        let field = field.into();
        let cb = self.cond_builder();
        if search.vector().is_empty() {
            trace!(field = %field, "dropping vector search with empty query vector");
            return self;
        }
        if search.limit() == 0 {
            cb.fail(QueryError::misuse(format!(
                "vector search on {} requires a non-zero result count",
                field
            )));
            return self;
        }
        cb.push(Predicate::new(
            Op::VectorSearch,
            field,
            Some(Operand::Search(Box::new(search))),
        ));
        self
    }

    /// Keep only rows whose distance to `filter.vector` is below the threshold.
    fn vector_distance(mut self, field: impl Into<String>, filter: VectorDistance) -> Self {
        let field = field.into();
        if filter.vector().is_empty() {
            trace!(field = %field, "dropping distance filter with empty vector");
            return self;
        }
        self.cond_builder()
            .push(Predicate::new(Op::VectorDistance, field, Some(Operand::Distance(filter))));
        self
    }

    /// Backend-specific request field, merged verbatim into the vector request.
    fn ext(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let key = key.into();
        if key.is_empty() || value.is_null() {
            return self;
        }
        self.cond_builder()
            .push(Predicate::new(Op::Extension, key, Some(Operand::Json(value))));
        self
    }
}

impl Conditions for CondBuilder {
    fn cond_builder(&mut self) -> &mut CondBuilder {
        self
    }
}
