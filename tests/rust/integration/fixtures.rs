//! Shared fixture: a small publishing schema in an in-memory SQLite database.
//!
//! Types: User, Source, SourceMember, Post, Comment. Source `s_full` has 50
//! visible members (plus blocked ones), `s_short` has 49.

use std::sync::Arc;

use graphorm::query_planner::ExistsByUser;
use graphorm::sql_builder::{qualified, SortOrder};
use graphorm::transform::{
    lookup, null_if_not_logged_in, null_if_not_same_user, null_if_not_same_user_by, premium_only,
    split_comma, to_date,
};
use graphorm::type_catalog::{
    FieldMapping, JoinStrategy, PaginationConfig, RelationMapping, TypeMapping, TypeRegistry,
};
use graphorm::{GraphOrm, SqliteStorage};
use serde_json::json;

pub const SCHEMA: &str = r#"
CREATE TABLE "user" (id TEXT PRIMARY KEY, name TEXT, email TEXT);
CREATE TABLE "source" (id TEXT PRIMARY KEY, name TEXT, private INTEGER DEFAULT 0);
CREATE TABLE "source_member" (
    sourceId TEXT, userId TEXT, role TEXT, createdAt TEXT,
    PRIMARY KEY (sourceId, userId)
);
CREATE TABLE "post" (
    id TEXT PRIMARY KEY, title TEXT, tagsStr TEXT, authorId TEXT, sourceId TEXT,
    toc TEXT, views INTEGER, createdAt TEXT, deleted INTEGER DEFAULT 0
);
CREATE TABLE "comment" (
    id TEXT PRIMARY KEY, postId TEXT, parentId TEXT, userId TEXT, content TEXT, createdAt TEXT
);
CREATE TABLE "bookmark" (userId TEXT, postId TEXT);

INSERT INTO "user" VALUES ('u1', 'Alice', 'alice@example.com'), ('u2', 'Bob', 'bob@example.com');
INSERT INTO "source" VALUES ('s_full', 'Full source', 0), ('s_short', 'Short source', 1);

INSERT INTO "source_member" (sourceId, userId, role, createdAt)
WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 50)
SELECT 's_full', 'm' || i, 'member', datetime('2024-01-01', '+' || i || ' minutes') FROM n;
INSERT INTO "source_member" (sourceId, userId, role, createdAt)
WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 49)
SELECT 's_short', 'm' || i, 'member', datetime('2024-01-01', '+' || i || ' minutes') FROM n;
INSERT INTO "source_member" VALUES
    ('s_full', 'b1', 'blocked', '2023-12-31 00:00:00'),
    ('s_full', 'b2', 'blocked', '2023-12-31 00:01:00'),
    ('s_short', 'b1', 'blocked', '2023-12-31 00:00:00');

INSERT INTO "post" VALUES
    ('p1', 'Hello', 'a,b,c', 'u1', 's_full', '[{"title":"intro"}]', 10, '2024-03-01 10:00:00', 0),
    ('p2', 'Broken', '', 'u2', 's_short', '{broken', 3, '2024-03-01 11:00:00', 0),
    ('p3', 'Gone', 'x', 'u1', 's_full', NULL, 0, '2024-03-01 12:00:00', 1);

INSERT INTO "comment" VALUES
    ('c1', 'p1', NULL, 'u2', 'First!', '2024-03-02 10:00:00'),
    ('c2', 'p1', 'c1', 'u1', 'Later reply', '2024-03-02 12:00:00'),
    ('c3', 'p1', 'c1', 'u2', 'Earlier reply', '2024-03-02 11:00:00');

INSERT INTO "bookmark" VALUES ('u1', 'p1');
"#;

pub fn storage() -> SqliteStorage {
    let storage = SqliteStorage::memory().expect("in-memory database");
    storage.execute_batch(SCHEMA).expect("fixture schema");
    storage
}

pub fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .register(
            "User",
            TypeMapping::new()
                .table("user")
                .required(["id"])
                .field("email", FieldMapping::plain().transform(null_if_not_same_user())),
        )
        .register(
            "Source",
            TypeMapping::new().table("source").field(
                "members",
                FieldMapping::relation(
                    RelationMapping::many(
                        "SourceMember",
                        JoinStrategy::custom(|_ctx, source, member, qb| {
                            qb.where_(format!(
                                "{} = {}",
                                qualified(member, "sourceId"),
                                qualified(source, "id")
                            ))
                            .and_where_with(
                                &format!("{} != :blockedRole", qualified(member, "role")),
                                [("blockedRole", json!("blocked"))],
                            )
                        }),
                    )
                    .sort("createdAt", SortOrder::Asc),
                )
                .paginate(PaginationConfig::new(50)),
            )
            .field(
                "firstMembers",
                FieldMapping::relation(
                    RelationMapping::many(
                        "SourceMember",
                        JoinStrategy::custom(|_ctx, source, member, qb| {
                            qb.where_(format!(
                                "{} = {}",
                                qualified(member, "sourceId"),
                                qualified(source, "id")
                            ))
                            .limit(3)
                        }),
                    )
                    .sort("createdAt", SortOrder::Asc),
                )
                .paginate(PaginationConfig::new(50)),
            ),
        )
        .register(
            "SourceMember",
            TypeMapping::new()
                .table("source_member")
                .key(["sourceId", "userId"])
                .field(
                    "user",
                    FieldMapping::relation(RelationMapping::one(
                        "User",
                        JoinStrategy::columns("userId", "id"),
                    )),
                ),
        )
        .register(
            "Post",
            TypeMapping::new()
                .table("post")
                .required(["id", "authorId"])
                .filter(|_ctx, alias, qb| qb.where_(format!("{} = 0", qualified(alias, "deleted"))))
                .field("tags", FieldMapping::column("tagsStr").transform(split_comma()))
                .field(
                    "bookmarked",
                    ExistsByUser::new("bookmark", "postId")
                        .into_field()
                        .transform(null_if_not_logged_in()),
                )
                .field("toc", FieldMapping::plain().json())
                .field("tocText", FieldMapping::column("toc"))
                .field("tocData", FieldMapping::alias("tocText", None).json())
                .field("urn", FieldMapping::raw("'urn:post:' || {alias}.\"id\""))
                .field("views", FieldMapping::plain().transform(null_if_not_same_user_by("authorId")))
                .field("createdAt", FieldMapping::plain().transform(to_date()))
                .field("source", FieldMapping::column("sourceId").transform(lookup("source", "id")))
                .field(
                    "author",
                    FieldMapping::relation(RelationMapping::one(
                        "User",
                        JoinStrategy::columns("authorId", "id"),
                    )),
                )
                .field("premiumAuthor", FieldMapping::alias("author", None).transform(premium_only()))
                .field(
                    "comments",
                    FieldMapping::relation(
                        RelationMapping::many("Comment", JoinStrategy::columns("id", "postId"))
                            .sort("createdAt", SortOrder::Asc),
                    ),
                ),
        )
        .register(
            "Comment",
            TypeMapping::new()
                .table("comment")
                .required(["id"])
                .field(
                    "author",
                    FieldMapping::relation(RelationMapping::one(
                        "User",
                        JoinStrategy::columns("userId", "id"),
                    )),
                )
                .field(
                    "post",
                    FieldMapping::relation(RelationMapping::one(
                        "Post",
                        JoinStrategy::columns("postId", "id"),
                    )),
                )
                .field(
                    "children",
                    FieldMapping::relation(
                        RelationMapping::many("Comment", JoinStrategy::columns("id", "parentId"))
                            .sort("createdAt", SortOrder::Asc),
                    )
                    .paginate(PaginationConfig::new(10)),
                ),
        )
        .build()
        .expect("fixture registry")
}

pub fn engine() -> GraphOrm {
    GraphOrm::new(Arc::new(registry()), Arc::new(storage()))
}
