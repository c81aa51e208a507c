//! Shared fixtures and store doubles for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use kindstore::core::{Context, Entity, Key, Result, StoreError};
use kindstore::filter_record;
use kindstore::store::{
    Cursor, CursorCodec, InMemoryStore, NativeQuery, ResultIterator, StoreClient, TransactionWork,
};
use kindstore::{BaseRepository, Identifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUser {
    pub email: String,
    pub name: String,
    pub age: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPost {
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// Query-by-example record: unset fields are left out of the filter.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub email: String,
    pub status: String,
    pub age: i64,
    pub created_at: Option<DateTime<Utc>>,
}

filter_record!(UserQuery {
    email,
    status,
    age,
    created_at,
});

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// (id, user): john 30 active, jane 25 active, bob 35 inactive, alice 28 active
pub fn test_users() -> Vec<(&'static str, TestUser)> {
    let now = base_time();
    let user = |email: &str, name: &str, age: i64, status: &str, hours_ago: i64| TestUser {
        email: email.to_string(),
        name: name.to_string(),
        age,
        status: status.to_string(),
        created_at: now - Duration::hours(hours_ago),
    };
    vec![
        ("user1", user("john@example.com", "John Doe", 30, "active", 24)),
        ("user2", user("jane@example.com", "Jane Smith", 25, "active", 12)),
        ("user3", user("bob@example.com", "Bob Wilson", 35, "inactive", 48)),
        ("user4", user("alice@example.com", "Alice Brown", 28, "active", 0)),
    ]
}

pub fn test_posts() -> Vec<(&'static str, TestPost)> {
    let now = base_time();
    let post = |user_id: &str, title: &str, published: bool, hours_ago: i64| TestPost {
        user_id: user_id.to_string(),
        title: title.to_string(),
        content: format!("Content of {}", title.to_lowercase()),
        published,
        created_at: now - Duration::hours(hours_ago),
    };
    vec![
        ("post1", post("user1", "First Post", true, 24)),
        ("post2", post("user1", "Second Post", false, 12)),
        ("post3", post("user2", "Jane's Post", true, 6)),
    ]
}

/// `n` numbered users, `age` = index, all active.
pub fn numbered_users(n: usize) -> Vec<TestUser> {
    (0..n)
        .map(|i| TestUser {
            email: format!("user{}@example.com", i),
            name: format!("User {}", i),
            age: i as i64,
            status: "active".to_string(),
            created_at: base_time() + Duration::minutes(i as i64),
        })
        .collect()
}

pub fn memory_client() -> Arc<dyn StoreClient> {
    Arc::new(InMemoryStore::new())
}

pub async fn seeded_users(client: Arc<dyn StoreClient>) -> BaseRepository {
    let users = BaseRepository::new(client, "users");
    let ctx = Context::background();
    for (id, user) in test_users() {
        users
            .insert(&ctx, Some(&Identifier::from(id)), &user)
            .await
            .unwrap();
    }
    users
}

/// Wraps an [`InMemoryStore`], recording multi-put batch sizes and delete
/// calls, and optionally failing one multi-put call.
pub struct RecordingStore {
    inner: InMemoryStore,
    put_batches: Mutex<Vec<usize>>,
    /// 1-based index of the multi-put call to fail
    fail_put_batch: Option<usize>,
    delete_calls: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            put_batches: Mutex::new(Vec::new()),
            fail_put_batch: None,
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_put_batch(batch: usize) -> Self {
        Self {
            fail_put_batch: Some(batch),
            ..Self::new()
        }
    }

    pub fn put_batches(&self) -> Vec<usize> {
        self.put_batches.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub async fn stored(&self, kind: &str) -> usize {
        self.inner.count(kind).await
    }
}

impl CursorCodec for RecordingStore {
    fn encode_cursor(&self, cursor: &Cursor) -> String {
        self.inner.encode_cursor(cursor)
    }

    fn decode_cursor(&self, token: &str) -> Result<Cursor> {
        self.inner.decode_cursor(token)
    }
}

#[async_trait]
impl StoreClient for RecordingStore {
    async fn get(&self, ctx: &Context, key: &Key) -> Result<Entity> {
        self.inner.get(ctx, key).await
    }

    async fn get_multi(&self, ctx: &Context, keys: &[Key]) -> Result<Vec<Entity>> {
        self.inner.get_multi(ctx, keys).await
    }

    async fn put(&self, ctx: &Context, key: Key, entity: Entity) -> Result<Key> {
        self.inner.put(ctx, key, entity).await
    }

    async fn put_multi(
        &self,
        ctx: &Context,
        keys: Vec<Key>,
        entities: Vec<Entity>,
    ) -> Result<Vec<Key>> {
        let call = {
            let mut batches = self.put_batches.lock().unwrap();
            batches.push(keys.len());
            batches.len()
        };
        if self.fail_put_batch == Some(call) {
            return Err(StoreError::Backend(format!("injected failure on batch {}", call)));
        }
        self.inner.put_multi(ctx, keys, entities).await
    }

    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ctx, key).await
    }

    async fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_multi(ctx, keys).await
    }

    async fn run(&self, ctx: &Context, query: &NativeQuery) -> Result<Box<dyn ResultIterator>> {
        self.inner.run(ctx, query).await
    }

    async fn get_all(&self, ctx: &Context, query: &NativeQuery) -> Result<Vec<(Key, Entity)>> {
        self.inner.get_all(ctx, query).await
    }

    async fn run_in_transaction<'w>(&self, ctx: &Context, work: TransactionWork<'w>) -> Result<()> {
        self.inner.run_in_transaction(ctx, work).await
    }
}
