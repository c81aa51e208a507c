//! Boundary to the underlying document store.
//!
//! Everything above this module talks to the store only through
//! [`StoreClient`]; [`InMemoryStore`] is the bundled implementation.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::core::{Context, Entity, Key, Result, Value};
use crate::query::FilterOperator;

/// Opaque position in an ordered result stream. Only the store that issued a
/// cursor can interpret its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The store's own string codec for cursors.
pub trait CursorCodec {
    fn encode_cursor(&self, cursor: &Cursor) -> String;
    fn decode_cursor(&self, token: &str) -> Result<Cursor>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

/// A query in the store's native shape.
///
/// Orders are property names, with a leading `-` for descending.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeQuery {
    kind: String,
    filters: Vec<NativeFilter>,
    orders: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    start: Option<Cursor>,
    projection: Vec<String>,
    distinct: bool,
    keys_only: bool,
    ancestor: Option<Key>,
}

impl NativeQuery {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        self.filters.push(NativeFilter {
            field: field.into(),
            operator,
            value,
        });
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.orders.push(order.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn start(mut self, cursor: Cursor) -> Self {
        self.start = Some(cursor);
        self
    }

    pub fn project(mut self, fields: Vec<String>) -> Self {
        self.projection = fields;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn ancestor(mut self, key: Key) -> Self {
        self.ancestor = Some(key);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn filters(&self) -> &[NativeFilter] {
        &self.filters
    }

    pub fn orders(&self) -> &[String] {
        &self.orders
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn start_cursor(&self) -> Option<&Cursor> {
        self.start.as_ref()
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }
}

/// Lazily walks the results of [`StoreClient::run`].
#[async_trait]
pub trait ResultIterator: Send {
    /// Next result, or `None` when the stream is exhausted. Entities are
    /// empty for keys-only queries.
    async fn next(&mut self) -> Result<Option<(Key, Entity)>>;

    /// Position just after the last result returned by `next`.
    fn cursor(&self) -> Result<Cursor>;
}

/// Handle passed to a unit of work run by [`StoreClient::run_in_transaction`].
pub trait Transaction {
    fn get(&self, key: &Key) -> Result<Entity>;
    fn put(&mut self, key: Key, entity: Entity) -> Result<Key>;
    fn delete(&mut self, key: Key) -> Result<()>;
}

pub type TransactionWork<'w> = Box<dyn FnOnce(&mut dyn Transaction) -> Result<()> + Send + 'w>;

#[async_trait]
pub trait StoreClient: CursorCodec + Send + Sync {
    async fn get(&self, ctx: &Context, key: &Key) -> Result<Entity>;

    async fn get_multi(&self, ctx: &Context, keys: &[Key]) -> Result<Vec<Entity>>;

    /// Writes an entity, replacing any existing one. Returns the complete key.
    async fn put(&self, ctx: &Context, key: Key, entity: Entity) -> Result<Key>;

    async fn put_multi(
        &self,
        ctx: &Context,
        keys: Vec<Key>,
        entities: Vec<Entity>,
    ) -> Result<Vec<Key>>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()>;

    async fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> Result<()>;

    async fn run(&self, ctx: &Context, query: &NativeQuery) -> Result<Box<dyn ResultIterator>>;

    async fn get_all(&self, ctx: &Context, query: &NativeQuery) -> Result<Vec<(Key, Entity)>>;

    /// Runs `work` atomically: its writes are applied only if it returns `Ok`.
    async fn run_in_transaction<'w>(&self, ctx: &Context, work: TransactionWork<'w>) -> Result<()>;
}
