//! Predicate values and the elision rules applied to them.
//!
//! Every value handed to a condition builder passes through one of the
//! `Value::into_*` normalizers before a predicate node is created. A value
//! that normalizes to [`Normalized::Absent`] silently drops the predicate;
//! this is how callers pass optional filter fields straight through without
//! checking them first.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt;

/// Canonical textual form of time values.
const NON_FINITE: &str = "NaN and infinite floats have no SQL or JSON form";

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A predicate or assignment value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Time(NaiveDateTime),
    List(Vec<Value>),
    /// Embedding or query vector.
    Vector(Vec<f32>),
    /// Nested structure, passed through untouched.
    Json(serde_json::Value),
}

/// Outcome of normalizing a candidate value for a given operator role.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Present(Value),
    Absent,
    /// The value kind cannot be used in this position at all.
    Invalid(&'static str),
}

impl Normalized {
    pub fn is_absent(&self) -> bool {
        matches!(self, Normalized::Absent)
    }

    pub fn present(self) -> Option<Value> {
        match self {
            Normalized::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Time(_) => "time",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Json(_) => "json",
        }
    }

    /// True for the values treated as "not set": null, empty text, any
    /// numeric zero and `false`.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::UInt(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Time(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Vector(v) => v.is_empty(),
            Value::Json(j) => j.is_null(),
        }
    }

    /// Normalize for a scalar comparison (`=`, `<>`, `>`, `<`, `>=`, `<=`).
    pub fn into_scalar(self) -> Normalized {
        match self {
            Value::Time(t) => Normalized::Present(Value::Text(format_time(&t))),
            Value::List(_) | Value::Vector(_) | Value::Json(_) => {
                Normalized::Invalid("scalar comparison requires a scalar value")
            }
            Value::Float(f) if !f.is_finite() => Normalized::Invalid(NON_FINITE),
            v if v.is_zero() => Normalized::Absent,
            v => Normalized::Present(v),
        }
    }

    /// Normalize for a pattern match. Only text is accepted.
    pub fn into_pattern(self) -> Normalized {
        match self {
            Value::Null => Normalized::Absent,
            Value::Text(s) if s.is_empty() => Normalized::Absent,
            Value::Text(s) => Normalized::Present(Value::Text(s)),
            _ => Normalized::Invalid("pattern match requires a text value"),
        }
    }

    /// Normalize for set membership. A lone scalar becomes a one-element
    /// list. Null and empty-text elements are dropped; if nothing is left the
    /// whole predicate is absent. Numeric zero stays a legal member.
    pub fn into_list(self) -> Normalized {
        let items = match self {
            Value::List(items) => items,
            Value::Vector(_) | Value::Json(_) => {
                return Normalized::Invalid("set membership requires scalar members");
            }
            scalar => vec![scalar],
        };

        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Null => {}
                Value::Text(s) if s.is_empty() => {}
                Value::Time(t) => kept.push(Value::Text(format_time(&t))),
                Value::Float(f) if !f.is_finite() => return Normalized::Invalid(NON_FINITE),
                Value::List(_) | Value::Vector(_) | Value::Json(_) => {
                    return Normalized::Invalid("set membership requires scalar members");
                }
                other => kept.push(other),
            }
        }

        if kept.is_empty() {
            Normalized::Absent
        } else {
            Normalized::Present(Value::List(kept))
        }
    }

    /// Normalize an assignment in INSERT/UPDATE. Same elision as scalar
    /// comparisons, but nested JSON is allowed and serialized to text.
    pub fn into_assignment(self) -> Normalized {
        match self {
            Value::Json(j) if j.is_null() => Normalized::Absent,
            Value::Json(j) => Normalized::Present(Value::Text(j.to_string())),
            Value::Vector(v) if v.is_empty() => Normalized::Absent,
            Value::Vector(v) => Normalized::Present(Value::Vector(v)),
            other => other.into_scalar(),
        }
    }

    /// Convert to JSON for the similarity backend request.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(n) => J::from(*n),
            Value::UInt(n) => J::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::Text(s) => J::String(s.clone()),
            Value::Time(t) => J::String(format_time(t)),
            Value::List(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Vector(v) => J::Array(
                v.iter()
                    .map(|f| {
                        serde_json::Number::from_f64(f64::from(*f))
                            .map(J::Number)
                            .unwrap_or(J::Null)
                    })
                    .collect(),
            ),
            Value::Json(j) => j.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_value(self))
    }
}

pub fn format_time(t: &NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Format a value as an SQL literal.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Int(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote(s),
        Value::Time(t) => quote(&format_time(t)),
        Value::List(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Vector(v) => quote(&vector_literal(v)),
        Value::Json(j) => quote(&j.to_string()),
    }
}

/// `[0.1,0.2,...]`, the textual form pgvector accepts.
pub fn vector_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Time(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Time(v.naive_local())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::List(v.iter().cloned().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            J::String(s) => Value::Text(s),
            J::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            obj @ J::Object(_) => Value::Json(obj),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_numbers_are_absent() {
        for v in [
            Value::from(0i8),
            Value::from(0i16),
            Value::from(0i32),
            Value::from(0i64),
            Value::from(0u8),
            Value::from(0u32),
            Value::from(0usize),
            Value::from(0.0f32),
            Value::from(-0.0f64),
        ] {
            assert!(v.into_scalar().is_absent());
        }
    }

    #[test]
    fn test_empty_string_is_absent() {
        assert!(Value::from("").into_scalar().is_absent());
        assert!(Value::from("").into_pattern().is_absent());
        assert_eq!(
            Value::from("x").into_scalar(),
            Normalized::Present(Value::Text("x".to_string()))
        );
    }

    #[test]
    fn test_false_is_absent_for_comparisons() {
        assert!(Value::from(false).into_scalar().is_absent());
        assert_eq!(Value::from(true).into_scalar(), Normalized::Present(Value::Bool(true)));
    }

    #[test]
    fn test_option_unwraps_and_reapplies() {
        let none: Option<i32> = None;
        assert!(Value::from(none).into_scalar().is_absent());
        assert!(Value::from(Some(0i32)).into_scalar().is_absent());
        assert_eq!(Value::from(Some(7i32)).into_scalar(), Normalized::Present(Value::Int(7)));
    }

    #[test]
    fn test_time_never_absent_and_formatted() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(
            Value::from(t).into_scalar(),
            Normalized::Present(Value::Text("2024-03-09 08:05:00".to_string()))
        );

        let epoch = NaiveDateTime::default();
        assert!(!Value::from(epoch).into_scalar().is_absent());
    }

    #[test]
    fn test_list_rules() {
        assert!(Value::from(Vec::<i64>::new()).into_list().is_absent());
        assert!(Value::List(vec![Value::Null]).into_list().is_absent());
        assert!(Value::from(vec![""]).into_list().is_absent());
        assert_eq!(
            Value::from(vec![0i64, 3]).into_list(),
            Normalized::Present(Value::List(vec![Value::Int(0), Value::Int(3)]))
        );
        assert_eq!(
            Value::from("a").into_list(),
            Normalized::Present(Value::List(vec![Value::Text("a".to_string())]))
        );
    }

    #[test]
    fn test_invalid_kinds() {
        assert!(matches!(
            Value::from(vec![1, 2]).into_scalar(),
            Normalized::Invalid(_)
        ));
        assert!(matches!(Value::from(5).into_pattern(), Normalized::Invalid(_)));
    }

    #[test]
    fn test_non_finite_floats_are_invalid() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(Value::Float(f).into_scalar(), Normalized::Invalid(_)));
            assert!(matches!(
                Value::from(vec![1.5, f]).into_list(),
                Normalized::Invalid(_)
            ));
            assert!(matches!(Value::Float(f).into_assignment(), Normalized::Invalid(_)));
        }
        assert!(matches!(Value::Float(-0.0).into_scalar(), Normalized::Absent));
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(serde_json::json!({"a": 1}));
        assert_eq!(v.kind(), "json");
        assert_eq!(Value::from(serde_json::json!(3)), Value::Int(3));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
    }

    #[test]
    fn test_format_value_string_escaping() {
        let value = Value::from("O'Reilly");
        assert_eq!(format_value(&value), "'O''Reilly'");
        assert_eq!(format_value(&Value::Bool(true)), "TRUE");
        assert_eq!(format_value(&Value::Vector(vec![0.5, 1.0])), "'[0.5,1]'");
    }
}
