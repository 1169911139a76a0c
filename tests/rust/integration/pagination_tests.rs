//! Many-relations: bounded follow-up statements, page info and cursors.

use graphorm::query_planner::{scalars, RequestedField, RequestedNode};
use graphorm::sql_builder::SortOrder;
use graphorm::type_catalog::decode_time_cursor;
use serde_json::{json, Value};

use super::fixtures::engine;

fn members_request() -> RequestedNode {
    RequestedNode::new(
        "Source",
        vec![
            RequestedField::scalar("id"),
            RequestedField::nested("members", scalars(&["userId", "role"])),
        ],
    )
    .with_order("id", SortOrder::Asc)
}

#[tokio::test]
async fn test_full_page_has_next_page() {
    let orm = engine();
    let result = orm.query(&orm.context(), &members_request()).await.unwrap();
    assert_eq!(result.len(), 2);

    let full = &result[0];
    assert_eq!(full["id"], json!("s_full"));
    let edges = full["members"]["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 50);
    assert_eq!(full["members"]["pageInfo"]["hasNextPage"], json!(true));
    assert_eq!(full["members"]["pageInfo"]["hasPreviousPage"], json!(false));
    assert!(edges.iter().all(|edge| edge["node"]["role"] != json!("blocked")));
    assert_eq!(edges[0]["node"]["userId"], json!("m1"));
    assert_eq!(full["members"]["pageInfo"]["startCursor"], edges[0]["cursor"]);
    assert_eq!(full["members"]["pageInfo"]["endCursor"], edges[49]["cursor"]);

    let short = &result[1];
    assert_eq!(short["id"], json!("s_short"));
    assert_eq!(short["members"]["edges"].as_array().unwrap().len(), 49);
    assert_eq!(short["members"]["pageInfo"]["hasNextPage"], json!(false));
}

#[tokio::test]
async fn test_children_are_ordered_with_increasing_cursors() {
    let orm = engine();
    let request = RequestedNode::new(
        "Comment",
        vec![
            RequestedField::scalar("content"),
            RequestedField::nested("children", scalars(&["id", "content"])),
        ],
    )
    .with_filter("id", json!("c1"));

    let result = orm.query(&orm.context(), &request).await.unwrap();
    let children = &result[0]["children"];
    let edges = children["edges"].as_array().unwrap();

    let ids: Vec<&Value> = edges.iter().map(|edge| &edge["node"]["id"]).collect();
    assert_eq!(ids, vec![&json!("c3"), &json!("c2")]);

    let cursors: Vec<i64> = edges
        .iter()
        .map(|edge| decode_time_cursor(edge["cursor"].as_str().unwrap()).unwrap())
        .collect();
    assert_eq!(cursors, vec![1_709_377_200_000, 1_709_380_800_000]);
    assert!(cursors[0] < cursors[1]);
    assert_eq!(children["pageInfo"]["hasNextPage"], json!(false));
}

#[tokio::test]
async fn test_leaf_comments_get_empty_pages() {
    let orm = engine();
    let request = RequestedNode::new(
        "Comment",
        vec![
            RequestedField::scalar("id"),
            RequestedField::nested("children", scalars(&["id"])),
        ],
    )
    .with_order("id", SortOrder::Asc);

    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(result.len(), 3);
    for comment in &result[1..] {
        assert_eq!(comment["children"]["edges"], json!([]));
        assert_eq!(comment["children"]["pageInfo"]["hasNextPage"], json!(false));
        assert_eq!(comment["children"]["pageInfo"]["startCursor"], Value::Null);
    }
}

#[tokio::test]
async fn test_unpaginated_relation_is_a_plain_array() {
    let orm = engine();
    let request = RequestedNode::new(
        "Post",
        vec![RequestedField::nested(
            "comments",
            vec![
                RequestedField::scalar("content"),
                RequestedField::nested("author", scalars(&["name"])),
            ],
        )],
    )
    .with_filter("id", json!("p1"));

    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(
        result[0]["comments"],
        json!([
            { "content": "First!", "author": { "name": "Bob" } },
            { "content": "Earlier reply", "author": { "name": "Bob" } },
            { "content": "Later reply", "author": { "name": "Alice" } }
        ])
    );
}

#[tokio::test]
async fn test_relation_limit_tighter_than_page_reports_more() {
    let orm = engine();
    let request = RequestedNode::new(
        "Source",
        vec![RequestedField::nested("firstMembers", scalars(&["userId"]))],
    )
    .with_filter("id", json!("s_full"));

    let result = orm.query(&orm.context(), &request).await.unwrap();
    let members = &result[0]["firstMembers"];
    assert_eq!(members["edges"].as_array().unwrap().len(), 3);
    assert_eq!(members["pageInfo"]["hasNextPage"], json!(true));
}
