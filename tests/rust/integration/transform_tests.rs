//! Transforms over fetched rows: async enrichment, failure, caller filters.

use std::sync::Arc;

use graphorm::query_planner::{scalars, RequestedField, RequestedNode};
use graphorm::sql_builder::{qualified, QueryBuilder, SortOrder};
use graphorm::transform::{JsonMap, Transform, TransformError, TransformFuture};
use graphorm::type_catalog::{FieldMapping, FilterFn, TypeMapping, TypeRegistry};
use graphorm::{Context, GraphOrm, GraphOrmError};
use serde_json::{json, Value};

use super::fixtures::{engine, storage};

#[tokio::test]
async fn test_async_lookup_enriches_value() {
    let orm = engine();
    let request = RequestedNode::new("Post", scalars(&["title", "source"])).with_filter("id", json!("p1"));
    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(result[0]["source"]["name"], json!("Full source"));
    assert_eq!(result[0]["source"]["id"], json!("s_full"));
}

fn shout<'a>(value: Value, ctx: &'a Context, _parent: &'a JsonMap) -> TransformFuture<'a> {
    Box::pin(async move {
        let text = value
            .as_str()
            .ok_or_else(|| TransformError::unexpected("string", &value))?;
        let user = ctx.storage().find_one_by("user", "id", ctx.user_param()).await?;
        let by = user
            .and_then(|row| row.get("name").cloned())
            .unwrap_or(Value::Null);
        Ok(json!({ "text": text.to_uppercase(), "by": by }))
    })
}

fn shouting_registry(fail: bool) -> TypeRegistry {
    let failing = Transform::sync(|_, _, _| Err(TransformError::Failed("not allowed".into())));
    let title = if fail {
        FieldMapping::plain().transform(failing)
    } else {
        FieldMapping::plain().transform(Transform::from_async(shout))
    };
    TypeRegistry::builder()
        .register("Post", TypeMapping::new().table("post").field("title", title))
        .register("User", TypeMapping::new().table("user"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_async_transform_reads_storage() {
    let orm = GraphOrm::new(Arc::new(shouting_registry(false)), Arc::new(storage()));
    let request = RequestedNode::new("Post", scalars(&["title"])).with_filter("id", json!("p1"));
    let result = orm.query(&orm.context().with_user("u2"), &request).await.unwrap();
    assert_eq!(result[0]["title"], json!({ "text": "HELLO", "by": "Bob" }));
}

#[tokio::test]
async fn test_failing_transform_fails_the_request() {
    let orm = GraphOrm::new(Arc::new(shouting_registry(true)), Arc::new(storage()));
    let request = RequestedNode::new("Post", scalars(&["id", "title"]));
    match orm.query(&orm.context(), &request).await {
        Err(GraphOrmError::Transform { type_name, field, source }) => {
            assert_eq!(type_name, "Post");
            assert_eq!(field, "title");
            assert_eq!(source, TransformError::Failed("not allowed".into()));
        }
        other => panic!("expected a transform error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transforms_run_inside_single_relations() {
    let orm = engine();
    let request = RequestedNode::new(
        "Comment",
        vec![RequestedField::nested("post", scalars(&["createdAt", "views"]))],
    )
    .with_filter("id", json!("c1"));
    let result = orm.query(&orm.context().with_user("u1"), &request).await.unwrap();
    assert_eq!(
        result[0]["post"],
        json!({ "createdAt": "2024-03-01T10:00:00.000Z", "views": 10 })
    );
}

fn titled_hello<'s>(_ctx: &Context, alias: &str, qb: QueryBuilder<'s>) -> QueryBuilder<'s> {
    qb.and_where_with(
        &format!("{} = :title", qualified(alias, "title")),
        [("title", json!("Hello"))],
    )
}

#[tokio::test]
async fn test_caller_filter_is_conjoined_with_type_filter() {
    let orm = engine();
    let filter: FilterFn = Arc::new(titled_hello);
    let request = RequestedNode::new("Post", scalars(&["title"])).with_order("id", SortOrder::Asc);

    let statement_sql = orm.compile_sql(&orm.context(), &request).unwrap().sql;
    assert!(statement_sql.contains("\"deleted\" = 0"));

    let result = orm.query_with(&orm.context(), &request, Some(filter)).await.unwrap();
    assert_eq!(Value::Array(result), json!([{ "title": "Hello" }]));
}
