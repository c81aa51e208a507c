//! Per-call CRUD and bulk operations over a [`StoreClient`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{Context, Entity, Identifier, Key, Result, StoreError};
use crate::query::{FieldMap, FilterCondition, PaginationResult, QueryBuilder, normalize_map};
use crate::store::{StoreClient, Transaction};

/// Stateless operations parameterized by kind.
///
/// Holds nothing but the client handle, so one executor can be shared by any
/// number of concurrent callers. Every call passes the caller's [`Context`]
/// straight through to the store.
#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn StoreClient>,
}

impl Executor {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// `offset = (page - 1) * page_size`. Pages start at 1; a page of zero or
    /// less yields a negative offset, which queries treat as unset.
    pub fn page_offset(page: i64, page_size: i64) -> i64 {
        page.saturating_sub(1).saturating_mul(page_size)
    }

    pub async fn get_entity(&self, ctx: &Context, kind: &str, id: &Identifier) -> Result<Entity> {
        self.client.get(ctx, &Key::resolve(kind, id)).await
    }

    pub async fn get_by_id<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        kind: &str,
        id: &Identifier,
    ) -> Result<T> {
        self.get_entity(ctx, kind, id).await?.to_typed()
    }

    /// Fails with the first missing entity's `NoSuchEntity`.
    pub async fn get_multi<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        kind: &str,
        ids: &[Identifier],
    ) -> Result<Vec<T>> {
        let keys: Vec<Key> = ids.iter().map(|id| Key::resolve(kind, id)).collect();
        let entities = self.client.get_multi(ctx, &keys).await?;
        entities
            .iter()
            .enumerate()
            .map(|(i, entity)| entity.to_typed().map_err(|e| e.at_index(i)))
            .collect()
    }

    /// Writes `entity` under `id`, or under a generated id when `id` is `None`.
    /// An existing entity is replaced, not merged.
    pub async fn put_entity(
        &self,
        ctx: &Context,
        kind: &str,
        id: Option<&Identifier>,
        entity: Entity,
    ) -> Result<Key> {
        self.client.put(ctx, Key::resolve_new(kind, id), entity).await
    }

    pub async fn create<T: Serialize + Sync + ?Sized>(
        &self,
        ctx: &Context,
        kind: &str,
        id: Option<&Identifier>,
        record: &T,
    ) -> Result<Key> {
        let entity = Entity::from_typed(record)?;
        self.put_entity(ctx, kind, id, entity).await
    }

    pub async fn create_multi<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        kind: &str,
        ids: &[Option<Identifier>],
        records: &[T],
    ) -> Result<Vec<Key>> {
        if ids.len() != records.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} ids for {} entities",
                ids.len(),
                records.len()
            )));
        }

        let keys = ids
            .iter()
            .map(|id| Key::resolve_new(kind, id.as_ref()))
            .collect();
        let entities = records
            .iter()
            .enumerate()
            .map(|(i, record)| Entity::from_typed(record).map_err(|e| e.at_index(i)))
            .collect::<Result<Vec<_>>>()?;

        self.client.put_multi(ctx, keys, entities).await
    }

    /// Same as [`create`](Self::create). There is no version check: the last
    /// concurrent writer wins.
    pub async fn update<T: Serialize + Sync + ?Sized>(
        &self,
        ctx: &Context,
        kind: &str,
        id: &Identifier,
        record: &T,
    ) -> Result<Key> {
        self.create(ctx, kind, Some(id), record).await
    }

    /// Same as [`create_multi`](Self::create_multi), with the same
    /// last-writer-wins caveat as [`update`](Self::update).
    pub async fn update_multi<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        kind: &str,
        ids: &[Identifier],
        records: &[T],
    ) -> Result<Vec<Key>> {
        let ids: Vec<Option<Identifier>> = ids.iter().cloned().map(Some).collect();
        self.create_multi(ctx, kind, &ids, records).await
    }

    /// Deleting a missing entity succeeds.
    pub async fn delete(&self, ctx: &Context, kind: &str, id: &Identifier) -> Result<()> {
        self.client.delete(ctx, &Key::resolve(kind, id)).await
    }

    pub async fn delete_multi(&self, ctx: &Context, kind: &str, ids: &[Identifier]) -> Result<()> {
        let keys: Vec<Key> = ids.iter().map(|id| Key::resolve(kind, id)).collect();
        self.client.delete_multi(ctx, &keys).await
    }

    /// Reads the whole entity; only not-found maps to `false`.
    pub async fn exists(&self, ctx: &Context, kind: &str, id: &Identifier) -> Result<bool> {
        match self.get_entity(ctx, kind, id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn count(
        &self,
        ctx: &Context,
        kind: &str,
        filters: Vec<FilterCondition>,
    ) -> Result<usize> {
        QueryBuilder::new(kind)
            .filters(filters)
            .count(ctx, self.client.as_ref())
            .await
    }

    pub async fn find_all<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        kind: &str,
    ) -> Result<Vec<T>> {
        let mut found = Vec::new();
        QueryBuilder::new(kind)
            .execute(ctx, self.client.as_ref(), &mut found)
            .await?;
        Ok(found)
    }

    /// Every map key is a filter here; reserved pagination keys get no
    /// special treatment.
    pub async fn find_where<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        kind: &str,
        filters: &FieldMap,
    ) -> Result<Vec<T>> {
        let mut found = Vec::new();
        QueryBuilder::new(kind)
            .filters(normalize_map(filters))
            .execute(ctx, self.client.as_ref(), &mut found)
            .await?;
        Ok(found)
    }

    /// First match, or `NoSuchEntity` when nothing matches.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        kind: &str,
        filters: &FieldMap,
    ) -> Result<T> {
        let query = QueryBuilder::new(kind)
            .filters(normalize_map(filters))
            .limit(1)
            .build(self.client.as_ref());

        let mut results = self.client.run(ctx, &query).await?;
        match results.next().await? {
            Some((_, entity)) => entity.to_typed(),
            None => Err(StoreError::NoSuchEntity(format!("{} matching filters", kind))),
        }
    }

    /// One page of matches. See [`page_offset`](Self::page_offset).
    pub async fn paginate<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        kind: &str,
        filters: &FieldMap,
        page: i64,
        page_size: i64,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        QueryBuilder::new(kind)
            .filters(normalize_map(filters))
            .limit(page_size)
            .offset(Self::page_offset(page, page_size))
            .execute(ctx, self.client.as_ref(), dest)
            .await
    }

    /// Hands `work` to the store's transaction runner.
    pub async fn transaction<'w, F>(&self, ctx: &Context, work: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<()> + Send + 'w,
    {
        self.client.run_in_transaction(ctx, Box::new(work)).await
    }

    /// Writes `records` in batches of `batch_size` under generated ids.
    ///
    /// Batches go out one after another and the first failure stops the
    /// run. Batches already written stay written.
    pub async fn bulk_create<T: Serialize + Sync>(
        &self,
        ctx: &Context,
        kind: &str,
        records: &[T],
        batch_size: usize,
    ) -> Result<Vec<Key>> {
        if batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(records.len());
        for (batch, chunk) in records.chunks(batch_size).enumerate() {
            let ids = vec![None; chunk.len()];
            match self.create_multi(ctx, kind, &ids, chunk).await {
                Ok(written) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        kind,
                        batch,
                        size = written.len(),
                        "bulk create batch written"
                    );
                    keys.extend(written);
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        kind,
                        batch,
                        written = keys.len(),
                        error = %err,
                        "bulk create aborted"
                    );
                    return Err(err);
                }
            }
        }

        Ok(keys)
    }

    /// Deletes every entity matching `filters` and returns how many matched.
    pub async fn bulk_delete(&self, ctx: &Context, kind: &str, filters: &FieldMap) -> Result<usize> {
        let query = QueryBuilder::new(kind)
            .filters(normalize_map(filters))
            .keys_only()
            .build(self.client.as_ref());

        let keys: Vec<Key> = self
            .client
            .get_all(ctx, &query)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        self.client.delete_multi(ctx, &keys).await?;
        tracing::debug!(
            request_id = %ctx.request_id(),
            kind,
            deleted = keys.len(),
            "bulk delete"
        );
        Ok(keys.len())
    }
}
