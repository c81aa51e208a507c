use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    Cursor, CursorCodec, NativeFilter, NativeQuery, ResultIterator, StoreClient, Transaction,
    TransactionWork,
};
use crate::config::StoreConfig;
use crate::core::{Context, Entity, Key, Result, StoreError, Value};
use crate::query::FilterOperator;

type KindTable = BTreeMap<Key, Entity>;

/// Store that keeps every kind in memory.
///
/// Implements the full [`StoreClient`] contract: filters, orders, offsets,
/// cursors, projections, ancestors and atomic transactions.
pub struct InMemoryStore {
    config: StoreConfig,
    /// Entities grouped by kind, each kind ordered by key
    kinds: RwLock<HashMap<String, KindTable>>,
    next_id: AtomicI64,
    open: AtomicBool,
}

/// Resume point: the last row read and the values it was ordered by.
/// `key` is `None` before the first row.
#[derive(Default, Serialize, Deserialize)]
struct CursorPayload {
    key: Option<Key>,
    order_values: Vec<Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            kinds: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            open: AtomicBool::new(true),
        }
    }

    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Releases the client. Every later call fails with `NotInitialized`.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        debug!("[{}] store closed", self.config.to_url());
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of entities stored under a kind.
    pub async fn count(&self, kind: &str) -> usize {
        self.kinds.read().await.get(kind).map_or(0, BTreeMap::len)
    }

    pub async fn clear(&self) {
        self.kinds.write().await.clear();
    }

    fn ensure_ready(&self, ctx: &Context) -> Result<()> {
        if !self.is_open() {
            return Err(StoreError::NotInitialized);
        }
        ctx.check()
    }

    fn check_batch(&self, len: usize) -> Result<()> {
        if len > self.config.max_batch_size {
            return Err(StoreError::InvalidArgument(format!(
                "batch of {} entities exceeds the limit of {}",
                len, self.config.max_batch_size
            )));
        }
        Ok(())
    }

    fn complete(&self, key: Key) -> Key {
        if key.is_complete() {
            key
        } else {
            key.with_id(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn select(&self, kinds: &HashMap<String, KindTable>, query: &NativeQuery) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = kinds
            .get(query.kind())
            .into_iter()
            .flat_map(|table| table.iter())
            .filter(|(key, _)| query.ancestor_key().is_none_or(|a| key.has_ancestor(a)))
            .filter(|(_, entity)| query.filters().iter().all(|f| matches_filter(entity, f)))
            .filter(|(_, entity)| {
                query
                    .orders()
                    .iter()
                    .all(|order| entity.get(order_field(order).0).is_some())
            })
            .map(|(key, entity)| Row {
                key: key.clone(),
                order_values: order_values(query.orders(), entity),
                entity: entity.clone(),
            })
            .collect();

        // Tables iterate in key order, which is already the unordered stream order
        if !query.orders().is_empty() {
            rows.sort_by(|a, b| compare_rows(query.orders(), a, &b.order_values, &b.key));
        }

        if !query.projection().is_empty() {
            for row in rows.iter_mut() {
                row.entity = row.entity.project(query.projection());
            }
        }

        if query.is_distinct() {
            let mut seen: Vec<Entity> = Vec::new();
            rows.retain(|row| {
                if seen.contains(&row.entity) {
                    false
                } else {
                    seen.push(row.entity.clone());
                    true
                }
            });
        }

        // Resume strictly after the cursor row, wherever it now sits
        if let Some(cursor) = query.start_cursor() {
            let after = cursor_payload(cursor)?;
            if let Some(key) = &after.key {
                rows.retain(|row| {
                    compare_rows(query.orders(), row, &after.order_values, key)
                        == CmpOrdering::Greater
                });
            }
        }

        let skip = query.get_offset().unwrap_or(0);
        let take = query.get_limit().unwrap_or(usize::MAX);
        let mut rows: Vec<Row> = rows.into_iter().skip(skip).take(take).collect();

        if query.is_keys_only() {
            for row in rows.iter_mut() {
                row.entity = Entity::new();
            }
        }

        Ok(rows)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct Row {
    key: Key,
    order_values: Vec<Value>,
    entity: Entity,
}

fn order_field(order: &str) -> (&str, bool) {
    match order.strip_prefix('-') {
        Some(field) => (field, true),
        None => (order, false),
    }
}

fn order_values(orders: &[String], entity: &Entity) -> Vec<Value> {
    orders
        .iter()
        .map(|order| entity.get(order_field(order).0).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Stream order: each order field in turn, then the key.
fn compare_rows(orders: &[String], row: &Row, values: &[Value], key: &Key) -> CmpOrdering {
    for ((order, x), y) in orders.iter().zip(&row.order_values).zip(values) {
        let ord = x.total_cmp(y);
        let ord = if order_field(order).1 { ord.reverse() } else { ord };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    row.key.cmp(key)
}

fn matches_filter(entity: &Entity, filter: &NativeFilter) -> bool {
    match entity.get(&filter.field) {
        None => filter.operator == FilterOperator::Equal && filter.value.is_null(),
        // Multi-valued properties match if any element does
        Some(Value::Array(items)) if !matches!(filter.value, Value::Array(_)) => items
            .iter()
            .any(|item| compare_with(item, filter.operator, &filter.value)),
        Some(value) => compare_with(value, filter.operator, &filter.value),
    }
}

fn compare_with(left: &Value, operator: FilterOperator, right: &Value) -> bool {
    match operator {
        FilterOperator::Equal => left == right,
        FilterOperator::NotEqual => left != right,
        FilterOperator::LessThan => left.compare(right) == Some(CmpOrdering::Less),
        FilterOperator::LessThanOrEqual => {
            matches!(left.compare(right), Some(CmpOrdering::Less | CmpOrdering::Equal))
        }
        FilterOperator::GreaterThan => left.compare(right) == Some(CmpOrdering::Greater),
        FilterOperator::GreaterThanOrEqual => {
            matches!(left.compare(right), Some(CmpOrdering::Greater | CmpOrdering::Equal))
        }
    }
}

fn payload_cursor(payload: &CursorPayload) -> Result<Cursor> {
    rmp_serde::to_vec(payload)
        .map(Cursor::from_bytes)
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn cursor_payload(cursor: &Cursor) -> Result<CursorPayload> {
    rmp_serde::from_slice::<CursorPayload>(cursor.as_bytes())
        .map_err(|e| StoreError::CursorDecode(e.to_string()))
}

fn require_complete(key: &Key) -> Result<()> {
    if key.is_complete() {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!("incomplete key {}", key)))
    }
}

impl CursorCodec for InMemoryStore {
    fn encode_cursor(&self, cursor: &Cursor) -> String {
        URL_SAFE_NO_PAD.encode(cursor.as_bytes())
    }

    fn decode_cursor(&self, token: &str) -> Result<Cursor> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|e| StoreError::CursorDecode(e.to_string()))?;
        let cursor = Cursor::from_bytes(bytes);
        cursor_payload(&cursor)?;
        Ok(cursor)
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get(&self, ctx: &Context, key: &Key) -> Result<Entity> {
        self.ensure_ready(ctx)?;
        require_complete(key)?;

        let kinds = self.kinds.read().await;
        kinds
            .get(key.kind())
            .and_then(|table| table.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NoSuchEntity(key.to_string()))
    }

    async fn get_multi(&self, ctx: &Context, keys: &[Key]) -> Result<Vec<Entity>> {
        self.ensure_ready(ctx)?;
        self.check_batch(keys.len())?;

        let kinds = self.kinds.read().await;
        keys.iter()
            .map(|key| {
                require_complete(key)?;
                kinds
                    .get(key.kind())
                    .and_then(|table| table.get(key))
                    .cloned()
                    .ok_or_else(|| StoreError::NoSuchEntity(key.to_string()))
            })
            .collect()
    }

    async fn put(&self, ctx: &Context, key: Key, entity: Entity) -> Result<Key> {
        self.ensure_ready(ctx)?;

        let key = self.complete(key);
        let mut kinds = self.kinds.write().await;
        kinds
            .entry(key.kind().to_string())
            .or_default()
            .insert(key.clone(), entity);

        trace!("[{}] put {}", ctx.request_id(), key);
        Ok(key)
    }

    async fn put_multi(
        &self,
        ctx: &Context,
        keys: Vec<Key>,
        entities: Vec<Entity>,
    ) -> Result<Vec<Key>> {
        self.ensure_ready(ctx)?;
        if keys.len() != entities.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} keys for {} entities",
                keys.len(),
                entities.len()
            )));
        }
        self.check_batch(keys.len())?;

        let keys: Vec<Key> = keys.into_iter().map(|key| self.complete(key)).collect();
        let mut kinds = self.kinds.write().await;
        for (key, entity) in keys.iter().zip(entities) {
            kinds
                .entry(key.kind().to_string())
                .or_default()
                .insert(key.clone(), entity);
        }

        debug!("[{}] put_multi wrote {} entities", ctx.request_id(), keys.len());
        Ok(keys)
    }

    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()> {
        self.ensure_ready(ctx)?;
        require_complete(key)?;

        let mut kinds = self.kinds.write().await;
        if let Some(table) = kinds.get_mut(key.kind()) {
            table.remove(key);
        }

        trace!("[{}] delete {}", ctx.request_id(), key);
        Ok(())
    }

    async fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> Result<()> {
        self.ensure_ready(ctx)?;
        self.check_batch(keys.len())?;
        keys.iter().try_for_each(require_complete)?;

        let mut kinds = self.kinds.write().await;
        for key in keys {
            if let Some(table) = kinds.get_mut(key.kind()) {
                table.remove(key);
            }
        }

        debug!("[{}] delete_multi removed up to {} entities", ctx.request_id(), keys.len());
        Ok(())
    }

    async fn run(&self, ctx: &Context, query: &NativeQuery) -> Result<Box<dyn ResultIterator>> {
        self.ensure_ready(ctx)?;

        let kinds = self.kinds.read().await;
        let rows = self.select(&kinds, query)?;
        Ok(Box::new(MemoryResultIterator {
            rows: rows.into(),
            start: query.start_cursor().cloned(),
            last: None,
        }))
    }

    async fn get_all(&self, ctx: &Context, query: &NativeQuery) -> Result<Vec<(Key, Entity)>> {
        self.ensure_ready(ctx)?;

        let kinds = self.kinds.read().await;
        Ok(self
            .select(&kinds, query)?
            .into_iter()
            .map(|row| (row.key, row.entity))
            .collect())
    }

    async fn run_in_transaction<'w>(&self, ctx: &Context, work: TransactionWork<'w>) -> Result<()> {
        self.ensure_ready(ctx)?;

        let mut kinds = self.kinds.write().await;
        let mut tx = MemoryTransaction {
            kinds: &*kinds,
            next_id: &self.next_id,
            pending: Vec::new(),
        };
        let outcome = work(&mut tx);
        let MemoryTransaction { pending, .. } = tx;

        match outcome {
            Ok(()) => {
                let applied = pending.len();
                for mutation in pending {
                    match mutation {
                        Mutation::Put(key, entity) => {
                            kinds
                                .entry(key.kind().to_string())
                                .or_default()
                                .insert(key, entity);
                        }
                        Mutation::Delete(key) => {
                            if let Some(table) = kinds.get_mut(key.kind()) {
                                table.remove(&key);
                            }
                        }
                    }
                }
                debug!("[{}] transaction committed {} mutations", ctx.request_id(), applied);
                Ok(())
            }
            Err(err) => {
                debug!("[{}] transaction rolled back: {}", ctx.request_id(), err);
                Err(err)
            }
        }
    }
}

struct MemoryResultIterator {
    rows: VecDeque<Row>,
    /// Cursor the query started from, returned until a row is read
    start: Option<Cursor>,
    last: Option<CursorPayload>,
}

#[async_trait]
impl ResultIterator for MemoryResultIterator {
    async fn next(&mut self) -> Result<Option<(Key, Entity)>> {
        Ok(self.rows.pop_front().map(|row| {
            self.last = Some(CursorPayload {
                key: Some(row.key.clone()),
                order_values: row.order_values,
            });
            (row.key, row.entity)
        }))
    }

    fn cursor(&self) -> Result<Cursor> {
        match (&self.last, &self.start) {
            (Some(last), _) => payload_cursor(last),
            (None, Some(start)) => Ok(start.clone()),
            (None, None) => payload_cursor(&CursorPayload::default()),
        }
    }
}

enum Mutation {
    Put(Key, Entity),
    Delete(Key),
}

struct MemoryTransaction<'a> {
    kinds: &'a HashMap<String, KindTable>,
    next_id: &'a AtomicI64,
    pending: Vec<Mutation>,
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, key: &Key) -> Result<Entity> {
        require_complete(key)?;

        // Reads see the transaction's own writes first
        for mutation in self.pending.iter().rev() {
            match mutation {
                Mutation::Put(k, entity) if k == key => return Ok(entity.clone()),
                Mutation::Delete(k) if k == key => {
                    return Err(StoreError::NoSuchEntity(key.to_string()));
                }
                _ => {}
            }
        }

        self.kinds
            .get(key.kind())
            .and_then(|table| table.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NoSuchEntity(key.to_string()))
    }

    fn put(&mut self, key: Key, entity: Entity) -> Result<Key> {
        let key = if key.is_complete() {
            key
        } else {
            key.with_id(self.next_id.fetch_add(1, Ordering::SeqCst))
        };
        self.pending.push(Mutation::Put(key.clone(), entity));
        Ok(key)
    }

    fn delete(&mut self, key: Key) -> Result<()> {
        require_complete(&key)?;
        self.pending.push(Mutation::Delete(key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::background()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, age, status) in [
            ("ann", 31, "active"),
            ("bob", 25, "inactive"),
            ("cid", 42, "active"),
            ("dee", 19, "active"),
        ] {
            store
                .put(
                    &ctx(),
                    Key::name_key("users", name, None),
                    Entity::new().with("age", age as i64).with("status", status),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_put_assigns_ids_to_incomplete_keys() {
        let store = InMemoryStore::new();
        let a = store.put(&ctx(), Key::incomplete_key("t", None), Entity::new()).await.unwrap();
        let b = store.put(&ctx(), Key::incomplete_key("t", None), Entity::new()).await.unwrap();

        assert!(a.is_complete() && b.is_complete());
        assert_ne!(a, b);
        assert_eq!(store.count("t").await, 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .get(&ctx(), &Key::name_key("users", "ghost", None))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_filters_and_descending_order() {
        let store = seeded().await;
        let query = NativeQuery::new("users")
            .filter("status", FilterOperator::Equal, Value::from("active"))
            .filter("age", FilterOperator::GreaterThanOrEqual, Value::from(20_i64))
            .order("-age");

        let rows = store.get_all(&ctx(), &query).await.unwrap();
        let ages: Vec<_> = rows.iter().map(|(_, e)| e.get("age").cloned()).collect();
        assert_eq!(ages, vec![Some(Value::from(42_i64)), Some(Value::from(31_i64))]);
    }

    #[tokio::test]
    async fn test_cursor_resumes_after_last_row() {
        let store = seeded().await;
        let query = NativeQuery::new("users").order("age").limit(2);

        let mut it = store.run(&ctx(), &query).await.unwrap();
        while it.next().await.unwrap().is_some() {}
        let token = store.encode_cursor(&it.cursor().unwrap());

        let resumed = NativeQuery::new("users")
            .order("age")
            .start(store.decode_cursor(&token).unwrap());
        let rows = store.get_all(&ctx(), &resumed).await.unwrap();
        let names: Vec<_> = rows.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["users(\"ann\")", "users(\"cid\")"]);
    }

    #[tokio::test]
    async fn test_cursor_survives_writes_between_pages() {
        let store = seeded().await;
        let query = NativeQuery::new("users").order("age").limit(2);

        let mut it = store.run(&ctx(), &query).await.unwrap();
        while it.next().await.unwrap().is_some() {}
        let token = store.encode_cursor(&it.cursor().unwrap());

        // Insert ahead of the cursor and delete the cursor row itself
        store
            .put(
                &ctx(),
                Key::name_key("users", "eve", None),
                Entity::new().with("age", 18_i64),
            )
            .await
            .unwrap();
        store
            .delete(&ctx(), &Key::name_key("users", "bob", None))
            .await
            .unwrap();

        let resumed = NativeQuery::new("users")
            .order("age")
            .start(store.decode_cursor(&token).unwrap());
        let rows = store.get_all(&ctx(), &resumed).await.unwrap();
        let names: Vec<_> = rows.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["users(\"ann\")", "users(\"cid\")"]);
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.decode_cursor("%%%"),
            Err(StoreError::CursorDecode(_))
        ));
        assert!(matches!(
            store.decode_cursor("AAAA"),
            Err(StoreError::CursorDecode(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_store_is_not_initialized() {
        let store = InMemoryStore::new();
        store.close();

        let err = store.get_all(&ctx(), &NativeQuery::new("users")).await.unwrap_err();
        assert_eq!(err, StoreError::NotInitialized);
    }

    #[tokio::test]
    async fn test_batch_limit_is_enforced() {
        let store = InMemoryStore::with_config(StoreConfig::new("p").max_batch_size(1)).unwrap();
        let err = store
            .put_multi(
                &ctx(),
                vec![Key::incomplete_key("t", None), Key::incomplete_key("t", None)],
                vec![Entity::new(), Entity::new()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_failed_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let result = store
            .run_in_transaction(
                &ctx(),
                Box::new(|tx: &mut dyn Transaction| {
                    tx.put(Key::name_key("t", "a", None), Entity::new())?;
                    Err(StoreError::Backend("abort".into()))
                }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.count("t").await, 0);
    }

    #[tokio::test]
    async fn test_array_property_matches_any_element() {
        let store = InMemoryStore::new();
        store
            .put(
                &ctx(),
                Key::name_key("posts", "p1", None),
                Entity::new().with("tags", vec!["rust", "db"]),
            )
            .await
            .unwrap();

        let query = NativeQuery::new("posts")
            .filter("tags", FilterOperator::Equal, Value::from("rust"))
            .filter("tags", FilterOperator::Equal, Value::from("db"));
        assert_eq!(store.get_all(&ctx(), &query).await.unwrap().len(), 1);
    }
}
