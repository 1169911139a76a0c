//! Declarative catalog end to end, plus statement-level alias guarantees.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use graphorm::query_planner::{scalars, RequestedField, RequestedNode};
use graphorm::type_catalog::{ConfigurationError, TypeCatalogConfig};
use graphorm::GraphOrm;
use serde_json::json;

use super::fixtures::{engine, storage};

const CATALOG: &str = r#"
types:
  User:
    table: user
    required_columns: [id]
    fields:
      email: { transform: null_if_not_same_user }
  Source:
    table: source
    fields:
      members:
        relation:
          type: SourceMember
          many: true
          condition: '{child}."sourceId" = {parent}."id" AND {child}."role" != ''blocked'''
          sort: createdAt
        pagination: { limit: 50, cursor_column: createdAt }
  SourceMember:
    table: source_member
    key: [sourceId, userId]
  Post:
    table: post
    required_columns: [id, authorId]
    filter: '{alias}."deleted" = 0'
    fields:
      tags: { column: tagsStr, transform: split_comma }
      bookmarked:
        exists: { table: bookmark, parent_column: postId }
        transform: null_if_not_logged_in
      toc: { json: true }
      tocLength: { raw_select: '{alias}."toc"', transform: array_length }
      author:
        relation: { type: User, parent_column: authorId, child_column: id }
      writer:
        alias: { field: author }
      comments:
        relation: { type: Comment, many: true, parent_column: id, child_column: postId, sort: createdAt, limit: 2 }
  Comment:
    table: comment
    fields:
      createdAt: { transform: to_date }
"#;

fn yaml_engine() -> GraphOrm {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CATALOG.as_bytes()).unwrap();
    let registry = TypeCatalogConfig::from_yaml_file(file.path())
        .unwrap()
        .build_registry()
        .unwrap();
    GraphOrm::new(Arc::new(registry), Arc::new(storage()))
}

#[tokio::test]
async fn test_yaml_catalog_end_to_end() {
    let orm = yaml_engine();
    let request = RequestedNode::new(
        "Post",
        vec![
            RequestedField::scalar("tags"),
            RequestedField::scalar("bookmarked"),
            RequestedField::scalar("tocLength"),
            RequestedField::nested("writer", scalars(&["name", "email"])),
            RequestedField::nested("comments", scalars(&["content", "createdAt"])),
        ],
    )
    .with_filter("id", json!("p1"));

    let result = orm.query(&orm.context().with_user("u1"), &request).await.unwrap();
    assert_eq!(
        result[0],
        json!({
            "tags": ["a", "b", "c"],
            "bookmarked": true,
            "tocLength": 1,
            "writer": { "name": "Alice", "email": "alice@example.com" },
            "comments": [
                { "content": "First!", "createdAt": "2024-03-02T10:00:00.000Z" },
                { "content": "Earlier reply", "createdAt": "2024-03-02T11:00:00.000Z" }
            ]
        })
    );
}

#[tokio::test]
async fn test_yaml_condition_relation_pages() {
    let orm = yaml_engine();
    let request = RequestedNode::new(
        "Source",
        vec![
            RequestedField::scalar("name"),
            RequestedField::nested("members", scalars(&["userId"])),
        ],
    )
    .with_filter("id", json!("s_short"));

    let result = orm.query(&orm.context(), &request).await.unwrap();
    let members = &result[0]["members"];
    assert_eq!(members["edges"].as_array().unwrap().len(), 49);
    assert_eq!(members["pageInfo"]["hasNextPage"], json!(false));
}

#[test]
fn test_yaml_catalog_rejects_conflicting_sources() {
    let yaml = r#"
types:
  Post:
    fields:
      title: { column: title, exists: { table: bookmark, parent_column: postId } }
"#;
    let err = TypeCatalogConfig::from_yaml_str(yaml)
        .unwrap()
        .build_registry()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::ConflictingValueSources { .. }));
}

#[test]
fn test_depth_three_aliases_are_unique() {
    let orm = engine();
    let request = RequestedNode::new(
        "Comment",
        vec![
            RequestedField::nested("author", scalars(&["name"])),
            RequestedField::nested(
                "post",
                vec![
                    RequestedField::scalar("title"),
                    RequestedField::scalar("bookmarked"),
                    RequestedField::nested("author", scalars(&["name"])),
                ],
            ),
        ],
    );
    let statement = orm.compile_sql(&orm.context().with_user("u1"), &request).unwrap();

    let unique: HashSet<&String> = statement.aliases.iter().collect();
    assert_eq!(unique.len(), statement.aliases.len());
    // comment, author user, post, bookmark exists, post author user
    assert_eq!(statement.aliases.len(), 5);
    assert_eq!(statement.param("userId"), Some(&json!("u1")));
}

#[tokio::test]
async fn test_depth_three_request_executes() {
    let orm = engine();
    let request = RequestedNode::new(
        "Comment",
        vec![RequestedField::nested(
            "post",
            vec![
                RequestedField::scalar("title"),
                RequestedField::nested("author", scalars(&["name"])),
            ],
        )],
    )
    .with_filter("id", json!("c2"));

    let result = orm.query(&orm.context(), &request).await.unwrap();
    assert_eq!(
        result[0],
        json!({ "post": { "title": "Hello", "author": { "name": "Alice" } } })
    );
}
