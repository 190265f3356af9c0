use serde_json::json;
use std::sync::Arc;
use tx2_sift::hook::{HookRegistry, Interceptor, Metadata};
use tx2_sift::prelude::*;
use tx2_sift::UnionKind;

struct Product;

impl Table for Product {
    fn table_name(&self) -> &str {
        "t_product"
    }
}

#[test]
fn test_zero_and_empty_inputs_vanish() {
    let query = QueryBuilder::new()
        .from("products")
        .eq("name", "")
        .eq("category", "electronics")
        .gt("min_score", 0.0)
        .lt("max_score", 0.9)
        .build()
        .unwrap();

    let compiled = query.to_sql();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM products WHERE category = ? AND max_score < ?"
    );
    assert_eq!(
        compiled.args,
        vec![Value::from("electronics"), Value::from(0.9)]
    );
}

#[test]
fn test_nested_groups_of_absent_values_vanish() {
    let query = QueryBuilder::new()
        .from("posts")
        .eq("state", 1)
        .and_group(|g| g.or_group(|o| o.eq("tag", "").gt("count", 0)))
        .build()
        .unwrap();

    assert!(query.conditions().iter().all(|p| !p.op.is_group()));
    assert_eq!(query.to_sql().sql, "SELECT * FROM posts WHERE state = ?");
}

#[test]
fn test_empty_in_list() {
    let query = QueryBuilder::new()
        .from("posts")
        .in_("id", Vec::<i64>::new())
        .build()
        .unwrap();
    assert_eq!(query.to_sql().sql, "SELECT * FROM posts");

    let err = QueryBuilder::new()
        .from("posts")
        .in_required("id", Vec::<i64>::new())
        .build()
        .unwrap_err();
    assert!(err.is_misuse());
}

#[test]
fn test_sql_and_vector_filters_agree() {
    let query = QueryBuilder::new()
        .of(&Product)
        .vector_search("embedding", VectorSearch::new(vec![0.1, 0.2], 10))
        .eq("category", "electronics")
        .gte("stock", 3)
        .is_null("deleted_at")
        .build()
        .unwrap();

    let compiled = query.to_sql();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM t_product WHERE category = ? AND stock >= ? AND deleted_at IS NULL"
    );
    assert_eq!(compiled.args, vec![Value::from("electronics"), Value::Int(3)]);

    let body: serde_json::Value = serde_json::from_str(&query.to_vector_json().unwrap()).unwrap();
    assert_eq!(
        body["filter"]["must"],
        json!([
            {"key": "category", "match": {"value": "electronics"}},
            {"key": "stock", "range": {"gte": 3}},
            {"is_null": {"key": "deleted_at"}}
        ])
    );
}

#[test]
fn test_diversity_over_fetch() {
    let search = VectorSearch::new(vec![0.3; 4], 20).diversity(Diversity::min_distance(0.2));
    assert_eq!(search.fetch_limit(), 100);

    let query = QueryBuilder::new()
        .from("docs")
        .vector_search("embedding", search)
        .build()
        .unwrap();

    let body: serde_json::Value = serde_json::from_str(&query.to_vector_json().unwrap()).unwrap();
    assert_eq!(body["limit"], json!(100));

    let relational = SqlCompiler::default().compile_vector_search(&query).unwrap();
    assert!(relational.sql.ends_with("ORDER BY distance LIMIT 100"));
}

#[test]
fn test_pagination_precedence() {
    let query = QueryBuilder::new()
        .from("posts")
        .limit(50)
        .page(2)
        .rows(20)
        .build()
        .unwrap();
    assert_eq!(query.to_sql().sql, "SELECT * FROM posts LIMIT 20 OFFSET 20");
}

#[test]
fn test_join_elimination_end_to_end() {
    let query = QueryBuilder::new()
        .select(vec!["p.id", "p.title"])
        .from("posts p")
        .inner_join("users u", JoinOn::on(|o| o.x("u.id = p.user_id")))
        .left_join("stats s", JoinOn::on(|o| o.x("s.post_id = p.id")))
        .eq("p.state", "live")
        .build()
        .unwrap();

    assert_eq!(
        query.to_sql().sql,
        "SELECT p.id AS c0, p.title AS c1 FROM posts p LEFT JOIN stats s ON s.post_id = p.id WHERE p.state = ?"
    );
}

#[test]
fn test_quoted_join_reference_survives_elimination() {
    let query = QueryBuilder::new()
        .select(vec!["c.id", "\"d\".\"name\""])
        .from("cat c")
        .inner_join("dog d", JoinOn::on(|o| o.x("d.cat_id = c.id")))
        .build()
        .unwrap();

    assert_eq!(
        query.to_sql().sql,
        "SELECT c.id AS c0, \"d\".\"name\" AS c1 FROM cat c INNER JOIN dog d ON d.cat_id = c.id"
    );
}

#[test]
fn test_non_ascii_columns_end_to_end() {
    let query = QueryBuilder::new()
        .select(vec!["a日本語xx", "DISTINCT 名前"])
        .from("t")
        .eq("名前", "ねこ")
        .build()
        .unwrap();

    let compiled = query.to_sql();
    assert_eq!(
        compiled.sql,
        "SELECT a日本語xx, DISTINCT 名前 AS c0 FROM t WHERE 名前 = ?"
    );
    assert_eq!(compiled.args, vec![Value::from("ねこ")]);
}

#[test]
fn test_cursor_paging_in_both_forms() {
    let query = QueryBuilder::new()
        .from("posts")
        .vector_search("embedding", VectorSearch::new(vec![0.5, 0.5], 20))
        .eq("state", "live")
        .sort_asc("id")
        .page(4)
        .rows(20)
        .last(300)
        .build()
        .unwrap();

    let compiled = query.to_sql();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM posts WHERE id > ? AND state = ? ORDER BY id ASC LIMIT 20"
    );
    assert_eq!(compiled.args, vec![Value::Int(300), Value::from("live")]);

    let body: serde_json::Value = serde_json::from_str(&query.to_vector_json().unwrap()).unwrap();
    assert_eq!(
        body["filter"]["must"],
        json!([
            {"key": "id", "range": {"gt": 300}},
            {"key": "state", "match": {"value": "live"}}
        ])
    );
    assert!(body.get("offset").is_none());
}

#[test]
fn test_huge_page_number_saturates() {
    let query = QueryBuilder::new()
        .from("posts")
        .page(1_000_000_000_000_000)
        .rows(100_000)
        .build()
        .unwrap();
    assert_eq!(
        query.to_sql().sql,
        format!("SELECT * FROM posts LIMIT 100000 OFFSET {}", u64::MAX)
    );
}

#[test]
fn test_postgres_dialect_end_to_end() {
    let dialect = Dialect::from_json(r#"{"name": "pg", "placeholder": "dollar"}"#).unwrap();
    let compiler = SqlCompiler::new(dialect);

    let query = QueryBuilder::new()
        .with("recent", |q| q.from("orders").gt("total", 10))
        .select(vec!["user_id"])
        .from("recent")
        .eq("region", "eu")
        .union(UnionKind::Distinct, |q| q.select(vec!["user_id"]).from("vip").eq("tier", 2))
        .build()
        .unwrap();

    let compiled = compiler.compile_select(&query);
    assert_eq!(
        compiled.sql,
        "WITH recent AS (SELECT * FROM orders WHERE total > $1) SELECT user_id FROM recent WHERE region = $2 UNION SELECT user_id FROM vip WHERE tier = $3"
    );
    assert_eq!(compiled.args.len(), 3);
}

#[test]
fn test_count_shares_filters() {
    let query = QueryBuilder::new()
        .from("posts")
        .like("title", "rust")
        .sort_desc("created_at")
        .page(4)
        .rows(25)
        .build()
        .unwrap();

    let compiler = SqlCompiler::default();
    let page = compiler.compile_select(&query);
    let count = compiler.compile_count(&query);
    assert_eq!(count.sql, "SELECT COUNT(*) FROM posts WHERE title LIKE ?");
    assert_eq!(count.args, page.args);
}

#[test]
fn test_mutations() {
    let insert = InsertBuilder::of(&Product)
        .set("name", "lamp")
        .set("price", 0)
        .build()
        .unwrap()
        .to_sql();
    assert_eq!(insert.sql, "INSERT INTO t_product (name) VALUES (?)");

    let update = UpdateBuilder::of(&Product)
        .set("price", 12.5)
        .eq("id", 7)
        .eq("owner", "")
        .build()
        .unwrap()
        .to_sql();
    assert_eq!(update.sql, "UPDATE t_product SET price = ? WHERE id = ?");

    let delete = DeleteBuilder::of(&Product)
        .in_("id", vec![1, 2, 3])
        .build()
        .unwrap()
        .to_sql();
    assert_eq!(delete.sql, "DELETE FROM t_product WHERE id IN (1, 2, 3)");
}

struct TraceTag;

impl Interceptor for TraceTag {
    fn name(&self) -> &str {
        "trace"
    }

    fn before_build(&self, meta: &mut Metadata) -> Result<()> {
        meta.trace_id = Some("req-42".to_string());
        Ok(())
    }
}

#[test]
fn test_hooks_with_builder() {
    let registry = HookRegistry::new();
    registry.register(Arc::new(TraceTag));

    let query = QueryBuilder::new()
        .from("posts")
        .eq("id", 1)
        .build_with(&registry)
        .unwrap();
    assert_eq!(query.metadata().trace_id.as_deref(), Some("req-42"));

    assert!(registry.unregister("trace"));
    let query = QueryBuilder::new().from("posts").build_with(&registry).unwrap();
    assert_eq!(query.metadata().trace_id, None);
}

#[test]
fn test_misuse_is_sticky() {
    let err = QueryBuilder::new()
        .from("posts")
        .in_required("id", Vec::<i64>::new())
        .eq("state", 1)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Misuse(_)));
}
