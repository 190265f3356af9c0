//! tx2-sift - Condition-Tree Query Compiler
//!
//! tx2-sift builds one backend-agnostic query description from optional,
//! possibly-empty filter inputs and compiles it either to SQL text with
//! positional arguments or to a JSON request for a vector similarity engine.
//!
//! # Architecture
//!
//! - **Condition Tree**: Predicates, AND/OR groups and bare OR markers
//! - **Value Normalization**: Zero values silently drop their predicate
//! - **Query Description**: Sources, joins, sorting, paging, aggregates
//! - **Join Optimizer**: Unreferenced inner joins are removed at build time
//! - **Emitters**: SQL with `?`/`$n` placeholders, or vector-search JSON
//!
//! # Example
//!
//! ```rust
//! use tx2_sift::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let category = "electronics";
//! let brand = "";
//!
//! let query = QueryBuilder::new()
//!     .select(vec!["id", "title"])
//!     .from("products")
//!     .eq("category", category)
//!     .eq("brand", brand) // empty input: no predicate
//!     .lt("max_score", 0.9)
//!     .sort_desc("id")
//!     .page(2)
//!     .rows(20)
//!     .build()?;
//!
//! let compiled = query.to_sql();
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT id, title FROM products WHERE category = ? AND max_score < ? ORDER BY id DESC LIMIT 20 OFFSET 20"
//! );
//! assert_eq!(compiled.args.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Philosophy
//!
//! tx2-sift is a query compiler, NOT a database client:
//!
//! - Nothing is executed and no connection is ever opened
//! - Absent inputs mean "no filter", never "filter on empty"
//! - Programmer mistakes surface as [`QueryError::Misuse`] at build time

pub mod builder;
pub mod condition;
pub mod config;
pub mod error;
pub mod hook;
pub mod mutation;
pub mod optimize;
pub mod query;
pub mod source;
pub mod sql;
pub mod value;
pub mod vector;

pub use builder::{CondBuilder, Conditions};
pub use condition::{Op, Operand, Predicate};
pub use config::{Dialect, PaginationStyle, PlaceholderStyle};
pub use error::{QueryError, Result};
pub use hook::{HookRegistry, Interceptor, Metadata};
pub use mutation::{Delete, DeleteBuilder, Insert, InsertBuilder, Update, UpdateBuilder};
pub use query::{
    Aggregate, AggregateFunc, Page, Query, QueryBuilder, Sort, SortDirection, UnionKind,
};
pub use source::{JoinOn, JoinType, Source, Table};
pub use sql::{Compiled, CompiledSelect, SqlCompiler};
pub use value::{Normalized, Value};
pub use vector::{
    DistanceMetric, Diversity, DiversityStrategy, VectorDistance, VectorJsonCompiler, VectorSearch,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::builder::{CondBuilder, Conditions};
    pub use crate::config::Dialect;
    pub use crate::error::{QueryError, Result};
    pub use crate::mutation::{DeleteBuilder, InsertBuilder, UpdateBuilder};
    pub use crate::query::{AggregateFunc, Page, Query, QueryBuilder, SortDirection};
    pub use crate::source::{JoinOn, JoinType, Table};
    pub use crate::sql::SqlCompiler;
    pub use crate::value::Value;
    pub use crate::vector::{DistanceMetric, Diversity, VectorDistance, VectorSearch};
}
