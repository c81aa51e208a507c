/// Repository tests
///
/// Query input dispatch, counting and pagination through the per-kind
/// facade.
/// Run with: cargo test --test repository_tests

mod common;

use std::sync::Arc;

use common::{TestPost, TestUser, UserQuery, memory_client, numbered_users, seeded_users, test_posts};
use chrono::{TimeZone, Utc};
use kindstore::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[tokio::test]
async fn test_untyped_crud_through_trait() {
    let repo: Box<dyn Repository> = Box::new(BaseRepository::new(memory_client(), "notes"));
    let ctx = Context::background();
    assert_eq!(repo.kind(), "notes");

    let key = repo
        .create(&ctx, None, Entity::new().with("text", "hello"))
        .await
        .unwrap();
    let id = key.identifier().unwrap();

    assert!(repo.exists(&ctx, &id).await.unwrap());
    repo.update(&ctx, &id, Entity::new().with("text", "bye"))
        .await
        .unwrap();
    let note = repo.get_by_id(&ctx, &id).await.unwrap();
    assert_eq!(note.get("text"), Some(&Value::from("bye")));

    repo.delete(&ctx, &id).await.unwrap();
    assert!(!repo.exists(&ctx, &id).await.unwrap());
}

#[tokio::test]
async fn test_query_with_map_input() {
    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    let input = FieldMap::new()
        .with("status", "active")
        .with("age>= ", 28)
        .with("order_by", "age")
        .with("limit", 10);
    let (rows, page) = users.query(&ctx, input.into()).await.unwrap();

    let ages: Vec<Value> = rows.iter().filter_map(|e| e.get("age").cloned()).collect();
    assert_eq!(ages, vec![Value::from(28), Value::from(30)]);
    assert_eq!(page.total, 2);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_query_with_json_map() {
    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    let mut found: Vec<TestUser> = Vec::new();
    let page = users
        .query_typed(&ctx, json!({"status": "active", "limit": 2}).into(), &mut found)
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(page.has_more);
}

#[tokio::test]
async fn test_query_with_spec_by_value_and_reference() {
    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    let spec = QueryBuilder::new("ignored")
        .where_("status", "active")
        .order_desc("age")
        .limit(1)
        .into_spec();

    let mut oldest: Vec<TestUser> = Vec::new();
    users
        .query_typed(&ctx, (&spec).into(), &mut oldest)
        .await
        .unwrap();
    assert_eq!(oldest[0].name, "John Doe");

    let (rows, page) = users.query(&ctx, spec.into()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(page.has_more);
}

#[tokio::test]
async fn test_query_with_record_input() {
    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    let example = UserQuery {
        status: "active".into(),
        age: 25,
        ..UserQuery::default()
    };

    let mut found: Vec<TestUser> = Vec::new();
    users
        .query_typed(&ctx, QueryInput::from_record(&example), &mut found)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Jane Smith");

    let everyone = QueryInput::from_record(&UserQuery::default());
    assert_eq!(users.count(&ctx, everyone).await.unwrap(), 4);
}

#[tokio::test]
async fn test_count_variants() {
    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    let by_map = FieldMap::new().with("status", "active");
    assert_eq!(users.count(&ctx, by_map.into()).await.unwrap(), 3);

    let by_filters = vec![FilterCondition::new("age", FilterOperator::LessThan, 30)];
    assert_eq!(users.count(&ctx, by_filters.into()).await.unwrap(), 2);

    let capped = FieldMap::new().with("limit", 1);
    assert_eq!(users.count(&ctx, capped.into()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_paginate_pages() {
    let client = memory_client();
    let users = BaseRepository::new(client, "users");
    let ctx = Context::background();
    users
        .bulk_create(&ctx, &numbered_users(25), 10)
        .await
        .unwrap();
    let filters = FieldMap::new().with("status", "active");

    let mut first: Vec<TestUser> = Vec::new();
    let page = users
        .paginate(&ctx, &filters, 1, 10, &mut first)
        .await
        .unwrap();
    assert_eq!(page.total, 10);
    assert!(page.has_more);

    let mut third: Vec<TestUser> = Vec::new();
    let page = users
        .paginate(&ctx, &filters, 3, 10, &mut third)
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_paginate_page_zero_uses_negative_offset() {
    assert_eq!(Executor::page_offset(0, 10), -10);

    let users = seeded_users(memory_client()).await;
    let ctx = Context::background();

    // A negative offset is treated as no offset, so page 0 repeats page 1
    let mut zero: Vec<TestUser> = Vec::new();
    users
        .paginate(&ctx, &FieldMap::new(), 0, 10, &mut zero)
        .await
        .unwrap();
    let mut one: Vec<TestUser> = Vec::new();
    users
        .paginate(&ctx, &FieldMap::new(), 1, 10, &mut one)
        .await
        .unwrap();
    assert_eq!(zero, one);
}

#[tokio::test]
async fn test_cursor_query_through_repository() {
    let users = BaseRepository::new(memory_client(), "users");
    let ctx = Context::background();
    users
        .bulk_create(&ctx, &numbered_users(5), 5)
        .await
        .unwrap();

    let mut first: Vec<TestUser> = Vec::new();
    let page = users
        .query_with_cursor(
            &ctx,
            FieldMap::new().with("order_by", "age").with("limit", 3).into(),
            &mut first,
        )
        .await
        .unwrap();
    let token = page.next_cursor.unwrap();

    let mut rest: Vec<TestUser> = Vec::new();
    users
        .query_with_cursor(
            &ctx,
            FieldMap::new()
                .with("order_by", "age")
                .with("limit", 3)
                .with("cursor", token.as_str())
                .into(),
            &mut rest,
        )
        .await
        .unwrap();

    let ages: Vec<i64> = first.iter().chain(rest.iter()).map(|u| u.age).collect();
    assert_eq!(ages, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_typed_helpers_and_bulk_delete() {
    let client = memory_client();
    let posts = BaseRepository::new(Arc::clone(&client), "posts");
    let ctx = Context::background();

    for (id, post) in test_posts() {
        posts
            .insert(&ctx, Some(&Identifier::from(id)), &post)
            .await
            .unwrap();
    }

    let post: TestPost = posts.get(&ctx, &Identifier::from("post3")).await.unwrap();
    assert_eq!(post.title, "Jane's Post");

    let published: Vec<TestPost> = posts
        .find_where(&ctx, &FieldMap::new().with("published", true))
        .await
        .unwrap();
    assert_eq!(published.len(), 2);

    let first: TestPost = posts
        .find_one(&ctx, &FieldMap::new().with("user_id", "user2"))
        .await
        .unwrap();
    assert_eq!(first.title, "Jane's Post");

    let deleted = posts
        .bulk_delete(&ctx, &FieldMap::new().with("user_id", "user1"))
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining: Vec<TestPost> = posts.find_all(&ctx).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(Arc::ptr_eq(posts.client(), &client));
}

#[tokio::test]
async fn test_ancestor_in_spec() {
    let client = memory_client();
    let ctx = Context::background();
    let owner = Key::name_key("users", "user1", None);
    for title in ["a", "b"] {
        client
            .put(
                &ctx,
                Key::incomplete_key("posts", Some(owner.clone())),
                Entity::new().with("title", title),
            )
            .await
            .unwrap();
    }
    client
        .put(&ctx, Key::incomplete_key("posts", None), Entity::new().with("title", "c"))
        .await
        .unwrap();

    let posts = BaseRepository::new(client, "posts");
    let spec = QueryBuilder::new("posts").ancestor("users", "user1").into_spec();
    assert_eq!(posts.count(&ctx, spec.into()).await.unwrap(), 2);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    body: String,
}

#[tokio::test]
async fn test_date_like_text_round_trips_and_filters() {
    let notes = BaseRepository::new(memory_client(), "notes");
    let ctx = Context::background();
    let original = Note {
        body: "2024-01-15T10:30:00+02:00".into(),
    };

    let key = notes.insert(&ctx, None, &original).await.unwrap();
    let loaded: Note = notes.get(&ctx, &key.identifier().unwrap()).await.unwrap();
    assert_eq!(loaded, original);

    let exact: Vec<Note> = notes
        .find_where(&ctx, &FieldMap::new().with("body", original.body.as_str()))
        .await
        .unwrap();
    assert_eq!(exact, vec![original.clone()]);

    // The same text still falls inside a range of instants
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
    let in_range = FilterBuilder::new().date_range("body", start, end).build();
    assert_eq!(notes.count(&ctx, in_range.into()).await.unwrap(), 1);
}
