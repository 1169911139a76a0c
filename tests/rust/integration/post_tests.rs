//! Root requests on Post: redaction, hidden required columns, JSON columns
//! and single relations.

use graphorm::query_planner::{scalars, RequestedField, RequestedNode};
use graphorm::sql_builder::SortOrder;
use graphorm::GraphOrmError;
use serde_json::{json, Value};

use super::fixtures::engine;

fn post(id: &str, fields: Vec<RequestedField>) -> RequestedNode {
    RequestedNode::new("Post", fields).with_filter("id", json!(id))
}

#[tokio::test]
async fn test_anonymous_caller_sees_tags_but_not_bookmark() {
    let orm = engine();
    let result = orm
        .query(&orm.context(), &post("p1", scalars(&["tags", "bookmarked"])))
        .await
        .unwrap();

    assert_eq!(Value::Array(result), json!([{ "tags": ["a", "b", "c"], "bookmarked": null }]));
}

#[tokio::test]
async fn test_bookmark_is_per_caller() {
    let orm = engine();
    let request = post("p1", scalars(&["bookmarked"]));

    let owner = orm.query(&orm.context().with_user("u1"), &request).await.unwrap();
    assert_eq!(owner[0]["bookmarked"], json!(true));

    let other = orm.query(&orm.context().with_user("u2"), &request).await.unwrap();
    assert_eq!(other[0]["bookmarked"], json!(false));
}

#[tokio::test]
async fn test_required_columns_are_fetched_but_hidden() {
    let orm = engine();
    let request = post("p1", scalars(&["title", "views"]));

    let statement = orm.compile_sql(&orm.context(), &request).unwrap();
    assert!(statement.sql.contains("post_1.\"authorId\" AS \"authorId\""));

    // `views` is only visible to the author, which needs the hidden authorId.
    let author = orm.query(&orm.context().with_user("u1"), &request).await.unwrap();
    assert_eq!(Value::Array(author), json!([{ "title": "Hello", "views": 10 }]));

    let reader = orm.query(&orm.context().with_user("u2"), &request).await.unwrap();
    assert_eq!(reader[0]["views"], Value::Null);
    assert!(reader[0].get("authorId").is_none());
    assert!(reader[0].get("id").is_none());
}

#[tokio::test]
async fn test_type_filter_excludes_deleted_rows() {
    let orm = engine();
    let request = RequestedNode::new("Post", scalars(&["title"])).with_order("id", SortOrder::Asc);
    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(Value::Array(result), json!([{ "title": "Hello" }, { "title": "Broken" }]));
}

#[tokio::test]
async fn test_json_and_date_columns() {
    let orm = engine();
    let result = orm
        .query(&orm.context(), &post("p1", scalars(&["toc", "createdAt"])))
        .await
        .unwrap();
    assert_eq!(result[0]["toc"], json!([{ "title": "intro" }]));
    assert_eq!(result[0]["createdAt"], json!("2024-03-01T10:00:00.000Z"));
}

#[tokio::test]
async fn test_unparsable_json_is_a_data_integrity_error() {
    let orm = engine();
    let err = orm
        .query(&orm.context(), &post("p2", scalars(&["toc"])))
        .await
        .unwrap_err();
    match err {
        GraphOrmError::DataIntegrity { type_name, field, .. } => {
            assert_eq!(type_name, "Post");
            assert_eq!(field, "toc");
        }
        other => panic!("expected a data integrity error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_relation_and_same_user_redaction() {
    let orm = engine();
    let request = post(
        "p1",
        vec![RequestedField::nested("author", scalars(&["name", "email"]))],
    );

    let own = orm.query(&orm.context().with_user("u1"), &request).await.unwrap();
    assert_eq!(own[0]["author"], json!({ "name": "Alice", "email": "alice@example.com" }));

    let foreign = orm.query(&orm.context().with_user("u2"), &request).await.unwrap();
    assert_eq!(foreign[0]["author"], json!({ "name": "Alice", "email": null }));
}

#[tokio::test]
async fn test_same_request_twice_is_byte_identical() {
    let orm = engine();
    let ctx = orm.context().with_user("u1");
    let request = RequestedNode::new(
        "Post",
        vec![
            RequestedField::scalar("title"),
            RequestedField::scalar("tags"),
            RequestedField::scalar("bookmarked"),
            RequestedField::nested("author", scalars(&["name"])),
            RequestedField::nested(
                "comments",
                vec![
                    RequestedField::scalar("content"),
                    RequestedField::nested("children", scalars(&["content"])),
                ],
            ),
        ],
    )
    .with_filter("id", json!("p1"));

    let first = serde_json::to_string(&orm.query(&ctx, &request).await.unwrap()).unwrap();
    let second = serde_json::to_string(&orm.query(&ctx, &request).await.unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unknown_type_is_a_configuration_error() {
    let orm = engine();
    let err = orm
        .query(&orm.context(), &RequestedNode::new("Nope", scalars(&["id"])))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_alias_applies_its_own_transform() {
    let orm = engine();
    let request = post(
        "p1",
        vec![RequestedField::nested("premiumAuthor", scalars(&["name"]))],
    );

    let free = orm.query(&orm.context().with_user("u2"), &request).await.unwrap();
    assert_eq!(Value::Array(free), json!([{ "premiumAuthor": null }]));

    let premium = orm
        .query(&orm.context().with_user("u2").with_premium(true), &request)
        .await
        .unwrap();
    assert_eq!(premium[0]["premiumAuthor"], json!({ "name": "Alice" }));
}

#[tokio::test]
async fn test_alias_json_decoration_parses_target_column() {
    let orm = engine();
    let result = orm
        .query(&orm.context(), &post("p1", scalars(&["tocText", "tocData"])))
        .await
        .unwrap();
    assert_eq!(result[0]["tocText"], json!("[{\"title\":\"intro\"}]"));
    assert_eq!(result[0]["tocData"], json!([{ "title": "intro" }]));
}

#[tokio::test]
async fn test_raw_select_with_colon_in_string_literal() {
    let orm = engine();
    let request = post("p1", scalars(&["urn"]));

    let statement = orm.compile_sql(&orm.context(), &request).unwrap();
    assert!(statement.sql.contains("'urn:post:' || post_1.\"id\""));
    assert!(statement.param("post").is_none());

    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(Value::Array(result), json!([{ "urn": "urn:post:p1" }]));
}
