//! Per-kind facade over [`Executor`] and [`QueryBuilder`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{Context, Entity, Identifier, Key, Result};
use crate::executor::Executor;
use crate::query::{FieldMap, PaginationResult, QueryBuilder, QueryInput};
use crate::store::{StoreClient, Transaction};

/// Uniform operations on one kind, over untyped entities.
#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> &str;

    async fn get_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Entity>;

    /// `None` generates an id.
    async fn create(&self, ctx: &Context, id: Option<&Identifier>, entity: Entity) -> Result<Key>;

    async fn update(&self, ctx: &Context, id: &Identifier, entity: Entity) -> Result<Key>;

    async fn delete(&self, ctx: &Context, id: &Identifier) -> Result<()>;

    async fn exists(&self, ctx: &Context, id: &Identifier) -> Result<bool>;

    async fn count(&self, ctx: &Context, input: QueryInput<'_>) -> Result<usize>;

    async fn query(
        &self,
        ctx: &Context,
        input: QueryInput<'_>,
    ) -> Result<(Vec<Entity>, PaginationResult)>;
}

/// Binds an executor and the query builder to a single kind.
///
/// Holds no mutable state; clone it or share it freely.
#[derive(Clone)]
pub struct BaseRepository {
    kind: String,
    executor: Executor,
    client: Arc<dyn StoreClient>,
}

impl BaseRepository {
    pub fn new(client: Arc<dyn StoreClient>, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            executor: Executor::new(Arc::clone(&client)),
            client,
        }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn builder(&self, input: QueryInput<'_>) -> QueryBuilder {
        QueryBuilder::from_spec(self.kind.as_str(), input.into_spec())
    }

    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, id: &Identifier) -> Result<T> {
        self.executor.get_by_id(ctx, &self.kind, id).await
    }

    pub async fn insert<T: Serialize + Sync + ?Sized>(
        &self,
        ctx: &Context,
        id: Option<&Identifier>,
        record: &T,
    ) -> Result<Key> {
        self.executor.create(ctx, &self.kind, id, record).await
    }

    /// Replaces the entity at `id`; concurrent writers are not detected.
    pub async fn save<T: Serialize + Sync + ?Sized>(
        &self,
        ctx: &Context,
        id: &Identifier,
        record: &T,
    ) -> Result<Key> {
        self.executor.update(ctx, &self.kind, id, record).await
    }

    /// Runs any query input and appends typed results to `dest`.
    pub async fn query_typed<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        input: QueryInput<'_>,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        self.builder(input)
            .execute(ctx, self.client.as_ref(), dest)
            .await
    }

    /// Like [`query_typed`](Self::query_typed) but streams and returns a
    /// resumption cursor.
    pub async fn query_with_cursor<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        input: QueryInput<'_>,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        self.builder(input)
            .execute_with_cursor(ctx, self.client.as_ref(), dest)
            .await
    }

    pub async fn get_multi<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        ids: &[Identifier],
    ) -> Result<Vec<T>> {
        self.executor.get_multi(ctx, &self.kind, ids).await
    }

    pub async fn create_multi<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        ids: &[Option<Identifier>],
        records: &[T],
    ) -> Result<Vec<Key>> {
        self.executor.create_multi(ctx, &self.kind, ids, records).await
    }

    pub async fn update_multi<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        ids: &[Identifier],
        records: &[T],
    ) -> Result<Vec<Key>> {
        self.executor.update_multi(ctx, &self.kind, ids, records).await
    }

    pub async fn delete_multi(&self, ctx: &Context, ids: &[Identifier]) -> Result<()> {
        self.executor.delete_multi(ctx, &self.kind, ids).await
    }

    pub async fn find_all<T: DeserializeOwned + Send>(&self, ctx: &Context) -> Result<Vec<T>> {
        self.executor.find_all(ctx, &self.kind).await
    }

    pub async fn find_where<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        filters: &FieldMap,
    ) -> Result<Vec<T>> {
        self.executor.find_where(ctx, &self.kind, filters).await
    }

    pub async fn find_one<T: DeserializeOwned>(&self, ctx: &Context, filters: &FieldMap) -> Result<T> {
        self.executor.find_one(ctx, &self.kind, filters).await
    }

    /// 1-based pages; see [`Executor::page_offset`].
    pub async fn paginate<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        filters: &FieldMap,
        page: i64,
        page_size: i64,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        self.executor
            .paginate(ctx, &self.kind, filters, page, page_size, dest)
            .await
    }

    pub async fn transaction<'w, F>(&self, ctx: &Context, work: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<()> + Send + 'w,
    {
        self.executor.transaction(ctx, work).await
    }

    pub async fn bulk_create<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        records: &[T],
        batch_size: usize,
    ) -> Result<Vec<Key>> {
        self.executor
            .bulk_create(ctx, &self.kind, records, batch_size)
            .await
    }

    pub async fn bulk_delete(&self, ctx: &Context, filters: &FieldMap) -> Result<usize> {
        self.executor.bulk_delete(ctx, &self.kind, filters).await
    }
}

#[async_trait]
impl Repository for BaseRepository {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn get_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Entity> {
        self.executor.get_entity(ctx, &self.kind, id).await
    }

    async fn create(&self, ctx: &Context, id: Option<&Identifier>, entity: Entity) -> Result<Key> {
        self.executor.put_entity(ctx, &self.kind, id, entity).await
    }

    async fn update(&self, ctx: &Context, id: &Identifier, entity: Entity) -> Result<Key> {
        self.executor
            .put_entity(ctx, &self.kind, Some(id), entity)
            .await
    }

    async fn delete(&self, ctx: &Context, id: &Identifier) -> Result<()> {
        self.executor.delete(ctx, &self.kind, id).await
    }

    async fn exists(&self, ctx: &Context, id: &Identifier) -> Result<bool> {
        self.executor.exists(ctx, &self.kind, id).await
    }

    /// Counts with the full query, so a map's `limit` caps the count.
    async fn count(&self, ctx: &Context, input: QueryInput<'_>) -> Result<usize> {
        self.builder(input).count(ctx, self.client.as_ref()).await
    }

    async fn query(
        &self,
        ctx: &Context,
        input: QueryInput<'_>,
    ) -> Result<(Vec<Entity>, PaginationResult)> {
        let (rows, pagination) = self
            .builder(input)
            .execute_entities(ctx, self.client.as_ref())
            .await?;
        let entities = rows.into_iter().map(|(_, entity)| entity).collect();
        Ok((entities, pagination))
    }
}
