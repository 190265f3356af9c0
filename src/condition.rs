use crate::query::Query;
use crate::value::Value;
use crate::vector::{VectorDistance, VectorSearch};
use std::fmt;

/// Operator tag of a predicate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `LIKE '%v%'`
    Like,
    /// `LIKE 'v%'`
    LikeLeft,
    NotLike,
    In,
    NotIn,
    IsNull,
    NonNull,
    /// Raw SQL fragment with positional arguments.
    Raw,
    /// Parenthesized group joined internally by AND.
    And,
    /// Parenthesized group joined internally by OR.
    Or,
    /// Bare OR connective between two flat siblings.
    OrMarker,
    /// `<key> (SELECT ...)`, where key carries the left side and operator.
    SubQuery,
    VectorSearch,
    VectorDistance,
    /// Backend-specific key/value merged into the vector request.
    Extension,
}

impl Op {
    pub fn is_group(self) -> bool {
        matches!(self, Op::And | Op::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Op::Eq | Op::Ne | Op::Gt | Op::Gte | Op::Lt | Op::Lte)
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Op::Like | Op::LikeLeft | Op::NotLike)
    }

    pub fn is_set(self) -> bool {
        matches!(self, Op::In | Op::NotIn)
    }

    /// Nodes that never render in the WHERE clause of the relational form.
    pub fn is_backend_only(self) -> bool {
        matches!(self, Op::VectorSearch | Op::Extension)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Eq => write!(f, "="),
            Op::Ne => write!(f, "<>"),
            Op::Gt => write!(f, ">"),
            Op::Gte => write!(f, ">="),
            Op::Lt => write!(f, "<"),
            Op::Lte => write!(f, "<="),
            Op::Like | Op::LikeLeft => write!(f, "LIKE"),
            Op::NotLike => write!(f, "NOT LIKE"),
            Op::In => write!(f, "IN"),
            Op::NotIn => write!(f, "NOT IN"),
            Op::IsNull => write!(f, "IS NULL"),
            Op::NonNull => write!(f, "IS NOT NULL"),
            Op::Raw => write!(f, "RAW"),
            Op::And => write!(f, "AND"),
            Op::Or | Op::OrMarker => write!(f, "OR"),
            Op::SubQuery => write!(f, "SUBQUERY"),
            Op::VectorSearch => write!(f, "VECTOR_SEARCH"),
            Op::VectorDistance => write!(f, "VECTOR_DISTANCE"),
            Op::Extension => write!(f, "EXTENSION"),
        }
    }
}

/// Payload of a predicate node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// Positional arguments of a raw fragment.
    Args(Vec<Value>),
    SubQuery(Box<Query>),
    Search(Box<VectorSearch>),
    Distance(VectorDistance),
    Json(serde_json::Value),
}

/// Atomic unit of the condition tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub op: Op,
    pub key: String,
    pub value: Option<Operand>,
    /// Populated only for `And` / `Or` groups.
    pub subs: Vec<Predicate>,
}

impl Predicate {
    pub fn new(op: Op, key: impl Into<String>, value: Option<Operand>) -> Self {
        Self {
            op,
            key: key.into(),
            value,
            subs: Vec::new(),
        }
    }

    pub fn value(op: Op, key: impl Into<String>, value: Value) -> Self {
        Self::new(op, key, Some(Operand::Value(value)))
    }

    pub fn group(op: Op, subs: Vec<Predicate>) -> Self {
        Self {
            op,
            key: String::new(),
            value: None,
            subs,
        }
    }

    pub fn or_marker() -> Self {
        Self::new(Op::OrMarker, "", None)
    }

    /// A bare connective carries no key, no value and no children.
    pub fn is_connective(&self) -> bool {
        self.op == Op::OrMarker && self.key.is_empty() && self.value.is_none() && self.subs.is_empty()
    }

    pub fn scalar(&self) -> Option<&Value> {
        match &self.value {
            Some(Operand::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Visit every node of the subtree rooted here, depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Predicate)) {
        visit(self);
        for sub in &self.subs {
            sub.walk(visit);
        }
    }
}

/// True if the list holds at least one node that is not a bare connective.
pub fn has_content(preds: &[Predicate]) -> bool {
    preds.iter().any(|p| !p.is_connective())
}

/// Depth-first search across a node list.
pub fn find<'a>(preds: &'a [Predicate], pred: &dyn Fn(&Predicate) -> bool) -> Option<&'a Predicate> {
    for p in preds {
        if pred(p) {
            return Some(p);
        }
        if let Some(found) = find(&p.subs, pred) {
            return Some(found);
        }
    }
    None
}
