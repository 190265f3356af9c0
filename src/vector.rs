//! Vector similarity search.
//!
//! The same condition tree that compiles to SQL is translated here into a
//! similarity-backend request: equality and set membership become `match`
//! conditions, comparisons become `range` conditions, and OR runs become
//! nested `should` filters. Operators the backend cannot express (LIKE,
//! `<>`, raw fragments, sub-queries) are dropped with a warning.
//!
//! Diversity is not implemented by the backend. When enabled, the request
//! asks for `limit * over_fetch` hits and the caller re-ranks that larger
//! set with the chosen strategy.

use crate::condition::{find, Op, Operand, Predicate};
use crate::error::Result;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_OVER_FETCH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    /// pgvector distance operator.
    pub fn sql_operator(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::L2 => "<->",
            DistanceMetric::InnerProduct => "<#>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DiversityStrategy {
    /// Drop hits whose `field` hashes equal an already kept hit.
    Hash { field: String },
    /// Keep hits at least `min_distance` apart from every kept hit.
    MinDistance { min_distance: f32 },
    /// Maximal marginal relevance, `lambda` weighting relevance over novelty.
    Mmr { lambda: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diversity {
    pub enabled: bool,
    #[serde(flatten)]
    pub strategy: DiversityStrategy,
    pub over_fetch: usize,
}

impl Diversity {
    pub fn new(strategy: DiversityStrategy) -> Self {
        Self {
            enabled: true,
            strategy,
            over_fetch: DEFAULT_OVER_FETCH,
        }
    }

    pub fn hash(field: impl Into<String>) -> Self {
        Self::new(DiversityStrategy::Hash {
            field: field.into(),
        })
    }

    pub fn min_distance(min_distance: f32) -> Self {
        Self::new(DiversityStrategy::MinDistance { min_distance })
    }

    pub fn mmr(lambda: f32) -> Self {
        Self::new(DiversityStrategy::Mmr { lambda })
    }

    /// Zero keeps the default factor.
    pub fn over_fetch(mut self, factor: usize) -> Self {
        if factor > 0 {
            self.over_fetch = factor;
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Parameters of a similarity search node.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearch {
    vector: Vec<f32>,
    limit: usize,
    metric: DistanceMetric,
    diversity: Option<Diversity>,
    hnsw_ef: Option<usize>,
    exact: bool,
    with_payload: bool,
}

impl VectorSearch {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            metric: DistanceMetric::default(),
            diversity: None,
            hnsw_ef: None,
            exact: false,
            with_payload: true,
        }
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn diversity(mut self, diversity: Diversity) -> Self {
        self.diversity = Some(diversity);
        self
    }

    pub fn hnsw_ef(mut self, ef: usize) -> Self {
        self.hnsw_ef = (ef > 0).then_some(ef);
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.with_payload = false;
        self
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn diversity_params(&self) -> Option<&Diversity> {
        self.diversity.as_ref()
    }

    /// Result count to request from the backend, over-fetching for diversity.
    pub fn fetch_limit(&self) -> usize {
        match &self.diversity {
            Some(d) if d.enabled => self.limit.saturating_mul(d.over_fetch.max(1)),
            _ => self.limit,
        }
    }
}

/// Keep only rows within `threshold` distance of `vector`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDistance {
    vector: Vec<f32>,
    metric: DistanceMetric,
    threshold: f32,
}

impl VectorDistance {
    pub fn new(vector: Vec<f32>, threshold: f32) -> Self {
        Self {
            vector,
            metric: DistanceMetric::default(),
            threshold,
        }
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<FilterJson>,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<SearchParams>,
}

#[derive(Debug, Serialize)]
struct SearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    hnsw_ef: Option<usize>,
    exact: bool,
}

#[derive(Debug, Default, Serialize)]
struct FilterJson {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    must: Vec<Clause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    must_not: Vec<Clause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    should: Vec<Clause>,
}

impl FilterJson {
    fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Clause {
    Field(FieldCondition),
    IsNull { is_null: KeyRef },
    Nested(FilterJson),
}

#[derive(Debug, Serialize)]
struct KeyRef {
    key: String,
}

#[derive(Debug, Serialize)]
struct FieldCondition {
    key: String,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    match_: Option<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<Range>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Match {
    Value { value: serde_json::Value },
    Any { any: Vec<serde_json::Value> },
}

#[derive(Debug, Default, Serialize)]
struct Range {
    #[serde(skip_serializing_if = "Option::is_none")]
    gt: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gte: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lt: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lte: Option<serde_json::Value>,
}

/// Where a translated node lands in its enclosing filter.
enum Part {
    Must(Clause),
    MustNot(Clause),
}

impl Part {
    /// Standalone form, used as one alternative of a `should` list.
    fn into_clause(self) -> Clause {
        match self {
            Part::Must(c) => c,
            Part::MustNot(c) => Clause::Nested(FilterJson {
                must_not: vec![c],
                ..FilterJson::default()
            }),
        }
    }
}

/// Compiles a [`Query`] to a similarity-backend request body.
#[derive(Debug, Clone, Default)]
pub struct VectorJsonCompiler;

impl VectorJsonCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, query: &Query) -> Result<String> {
        let value = self.compile_value(query)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Same as [`compile`](Self::compile) but returns the JSON tree.
    pub fn compile_value(&self, query: &Query) -> Result<serde_json::Value> {
        let search_count = count_ops(&query.conds, Op::VectorSearch);
        if search_count > 1 {
            warn!(count = search_count, "multiple vector searches, using the first");
        }
        let search = query.vector_search().map(|(_, s)| s);

        let cursor = query.cursor();
        let mut filter = translate_list(&query.conds, false);
        if let Some(Part::Must(bound)) = cursor.as_ref().and_then(translate_node) {
            filter = with_cursor(bound, filter);
        }
        let filter = (!filter.is_empty()).then_some(filter);

        let score_threshold = find(&query.conds, &|p| p.op == Op::VectorDistance).and_then(|p| {
            match &p.value {
                Some(Operand::Distance(d)) => Some(d.threshold()),
                _ => None,
            }
        });

        let limit = match (search, query.page()) {
            (Some(s), _) => Some(s.fetch_limit() as u64),
            (None, Some(page)) => Some(page.rows()),
            (None, None) => query.limit(),
        };
        let offset = match query.page() {
            Some(_) if cursor.is_some() => None,
            Some(page) if page.offset() > 0 => Some(page.offset()),
            Some(_) => None,
            None => query.offset(),
        };

        let params = search.and_then(|s| {
            (s.hnsw_ef.is_some() || s.exact).then(|| SearchParams {
                hnsw_ef: s.hnsw_ef,
                exact: s.exact,
            })
        });

        let request = SearchRequest {
            vector: search.map(|s| s.vector.clone()),
            limit,
            offset,
            filter,
            with_payload: search.map_or(true, |s| s.with_payload),
            score_threshold,
            params,
        };

        let mut value = serde_json::to_value(&request)?;
        if let serde_json::Value::Object(map) = &mut value {
            let mut extensions = Vec::new();
            collect_extensions(&query.conds, &mut extensions);
            for (key, ext) in extensions {
                map.insert(key, ext);
            }
        }

        debug!(
            limit = limit.unwrap_or_default(),
            has_vector = search.is_some(),
            "compiled vector request"
        );
        Ok(value)
    }
}

fn count_ops(preds: &[Predicate], op: Op) -> usize {
    let mut n = 0;
    for p in preds {
        p.walk(&mut |node| {
            if node.op == op {
                n += 1;
            }
        });
    }
    n
}

fn collect_extensions(preds: &[Predicate], out: &mut Vec<(String, serde_json::Value)>) {
    for p in preds {
        p.walk(&mut |node| {
            if let (Op::Extension, Some(Operand::Json(v))) = (node.op, &node.value) {
                out.push((node.key.clone(), v.clone()));
            }
        });
    }
}

/// Translate one level of the tree. In an `Or` group every member is an
/// alternative. Otherwise bare OR markers split the level into AND-chains,
/// matching SQL precedence: `a OR b AND c` is `a OR (b AND c)`.
fn translate_list(preds: &[Predicate], alternatives: bool) -> FilterJson {
    let mut filter = FilterJson::default();

    if alternatives {
        let mut should: Vec<Clause> = preds
            .iter()
            .filter(|p| !p.is_connective())
            .filter_map(translate_node)
            .map(Part::into_clause)
            .collect();
        match should.len() {
            0 => {}
            1 => filter.must.push(should.remove(0)),
            _ => filter.should = should,
        }
        return filter;
    }

    let mut chains: Vec<Vec<Part>> = Vec::new();
    let mut pending_or = false;
    for p in preds {
        if p.is_connective() {
            pending_or = true;
            continue;
        }
        let Some(part) = translate_node(p) else {
            continue;
        };
        match chains.last_mut() {
            // A group is always AND-joined to its left neighbour.
            Some(chain) if !(pending_or && !p.op.is_group()) => chain.push(part),
            _ => chains.push(vec![part]),
        }
        pending_or = false;
    }

    if chains.len() == 1 {
        return conjunction(chains.remove(0));
    }
    filter.should = chains
        .into_iter()
        .map(|mut chain| {
            if chain.len() == 1 {
                chain.remove(0).into_clause()
            } else {
                Clause::Nested(conjunction(chain))
            }
        })
        .collect();
    filter
}

/// AND the cursor bound onto the whole filter. Alternatives are nested so
/// the bound applies to every one of them.
fn with_cursor(bound: Clause, filter: FilterJson) -> FilterJson {
    if filter.should.is_empty() {
        let mut filter = filter;
        filter.must.insert(0, bound);
        return filter;
    }
    FilterJson {
        must: vec![bound, Clause::Nested(filter)],
        ..FilterJson::default()
    }
}

fn conjunction(parts: Vec<Part>) -> FilterJson {
    let mut filter = FilterJson::default();
    for part in parts {
        match part {
            Part::Must(c) => filter.must.push(c),
            Part::MustNot(c) => filter.must_not.push(c),
        }
    }
    filter
}

fn translate_node(p: &Predicate) -> Option<Part> {
    let field = |match_: Option<Match>, range: Option<Range>| FieldCondition {
        key: p.key.clone(),
        match_,
        range,
    };

    match p.op {
        Op::And | Op::Or => {
            let nested = translate_list(&p.subs, p.op == Op::Or);
            if nested.is_empty() {
                None
            } else {
                Some(Part::Must(Clause::Nested(nested)))
            }
        }
        Op::Eq => {
            let value = p.scalar()?.to_json();
            Some(Part::Must(Clause::Field(field(Some(Match::Value { value }), None))))
        }
        Op::In | Op::NotIn => {
            let any = match p.scalar()?.to_json() {
                serde_json::Value::Array(items) => items,
                single => vec![single],
            };
            let clause = Clause::Field(field(Some(Match::Any { any }), None));
            if p.op == Op::In {
                Some(Part::Must(clause))
            } else {
                Some(Part::MustNot(clause))
            }
        }
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
            let bound = Some(p.scalar()?.to_json());
            let range = match p.op {
                Op::Gt => Range { gt: bound, ..Range::default() },
                Op::Gte => Range { gte: bound, ..Range::default() },
                Op::Lt => Range { lt: bound, ..Range::default() },
                _ => Range { lte: bound, ..Range::default() },
            };
            Some(Part::Must(Clause::Field(field(None, Some(range)))))
        }
        Op::IsNull => Some(Part::Must(Clause::IsNull {
            is_null: KeyRef { key: p.key.clone() },
        })),
        Op::NonNull => Some(Part::MustNot(Clause::IsNull {
            is_null: KeyRef { key: p.key.clone() },
        })),
        Op::VectorSearch | Op::VectorDistance | Op::Extension | Op::OrMarker => None,
        Op::Ne | Op::Like | Op::LikeLeft | Op::NotLike | Op::Raw | Op::SubQuery => {
            warn!(key = %p.key, op = %p.op, "operator not supported by vector backend, dropped");
            None
        }
    }
}
