use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::types::{
    AncestorParam, FilterCondition, FilterOperator, OrderCondition, OrderDirection,
    PaginationResult, QuerySpec,
};
use crate::core::{Context, Entity, Identifier, Key, Result, Value};
use crate::store::{Cursor, CursorCodec, NativeQuery, StoreClient};

/// Fluent construction and execution of one query against a kind.
///
/// Builders are consumed and returned by every setter. `filter`, `order` and
/// `select` accumulate; `limit`, `offset`, `cursor` and `ancestor` keep the
/// last value set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    kind: String,
    spec: QuerySpec,
}

impl QueryBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            spec: QuerySpec::default(),
        }
    }

    /// Starts from an existing specification.
    pub fn from_spec(kind: impl Into<String>, spec: QuerySpec) -> Self {
        Self {
            kind: kind.into(),
            spec,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.spec
            .filters
            .push(FilterCondition::new(field, operator, value));
        self
    }

    /// Appends already normalized conditions in order.
    pub fn filters(mut self, filters: impl IntoIterator<Item = FilterCondition>) -> Self {
        self.spec.filters.extend(filters);
        self
    }

    /// Equality filter.
    pub fn where_(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOperator::Equal, value)
    }

    /// One equality filter per value.
    ///
    /// The store has no `IN` operator and filters are AND-ed, so more than one
    /// distinct value matches nothing unless the property is multi-valued.
    pub fn where_in<V: Into<Value>>(
        self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        values
            .into_iter()
            .fold(self, |builder, value| builder.where_(field, value))
    }

    /// Approximates a prefix match with `field >= value`, which also matches
    /// every greater string.
    pub fn where_like(self, field: impl Into<String>, value: &str) -> Self {
        self.filter(field, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn order(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.spec.orders.push(OrderCondition::new(field, direction));
        self
    }

    pub fn order_asc(self, field: impl Into<String>) -> Self {
        self.order(field, OrderDirection::Asc)
    }

    pub fn order_desc(self, field: impl Into<String>) -> Self {
        self.order(field, OrderDirection::Desc)
    }

    /// Zero or less leaves the query unbounded.
    pub fn limit(mut self, limit: i64) -> Self {
        self.spec.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.spec.offset = offset;
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.spec.cursor = Some(cursor.into());
        self
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.spec.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.spec.keys_only = true;
        self
    }

    pub fn ancestor(mut self, kind: impl Into<String>, id: impl Into<Identifier>) -> Self {
        self.spec.ancestor = Some(AncestorParam {
            kind: kind.into(),
            id: id.into(),
        });
        self
    }

    pub fn get_kind(&self) -> &str {
        &self.kind
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    /// Translates the accumulated specification into a native query.
    ///
    /// A cursor the store cannot decode is dropped and the query starts from
    /// the beginning.
    pub fn build<C: CursorCodec + ?Sized>(&self, codec: &C) -> NativeQuery {
        let spec = &self.spec;
        let mut query = NativeQuery::new(self.kind.as_str());

        for filter in &spec.filters {
            query = query.filter(filter.field.as_str(), filter.operator, filter.value.clone());
        }

        for order in &spec.orders {
            query = query.order(order.native());
        }

        if spec.limit > 0 {
            query = query.limit(spec.limit as usize);
        }

        if spec.offset > 0 {
            query = query.offset(spec.offset as usize);
        }

        if let Some(token) = spec.cursor.as_deref().filter(|token| !token.is_empty()) {
            match codec.decode_cursor(token) {
                Ok(cursor) => query = query.start(cursor),
                Err(err) => warn!("ignoring cursor for kind {}: {}", self.kind, err),
            }
        }

        if !spec.select.is_empty() {
            query = query.project(spec.select.clone());
        }

        if spec.distinct {
            query = query.distinct();
        }

        if spec.keys_only {
            query = query.keys_only();
        }

        if let Some(ancestor) = &spec.ancestor {
            query = query.ancestor(Key::resolve(&ancestor.kind, &ancestor.id));
        }

        query
    }

    /// Runs the query and appends every result to `dest`.
    ///
    /// `has_more` is true whenever the page is exactly full, so a last page
    /// of exactly `limit` results still reports more.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        client: &dyn StoreClient,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        let rows = client.get_all(ctx, &self.build(client)).await?;
        let count = rows.len();

        dest.reserve(count);
        for (i, (_, entity)) in rows.into_iter().enumerate() {
            dest.push(entity.to_typed().map_err(|e| e.at_index(i))?);
        }

        debug!("[{}] {} query returned {}", ctx.request_id(), self.kind, count);
        Ok(PaginationResult::from_count(count, self.spec.limit))
    }

    /// Like [`execute`](Self::execute) but keeps entities untyped.
    pub async fn execute_entities(
        &self,
        ctx: &Context,
        client: &dyn StoreClient,
    ) -> Result<(Vec<(Key, Entity)>, PaginationResult)> {
        let rows = client.get_all(ctx, &self.build(client)).await?;
        let pagination = PaginationResult::from_count(rows.len(), self.spec.limit);
        Ok((rows, pagination))
    }

    /// Streams results one at a time and returns a resumption cursor.
    ///
    /// `next_cursor` is set only when `has_more` holds and at least one result
    /// was read; it points just past the last result.
    pub async fn execute_with_cursor<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        client: &dyn StoreClient,
        dest: &mut Vec<T>,
    ) -> Result<PaginationResult> {
        let mut results = client.run(ctx, &self.build(client)).await?;

        let mut count = 0;
        let mut last_cursor: Option<Cursor> = None;
        while let Some((_, entity)) = results.next().await? {
            dest.push(entity.to_typed().map_err(|e| e.at_index(count))?);
            count += 1;
            last_cursor = Some(results.cursor()?);
        }

        let mut pagination = PaginationResult::from_count(count, self.spec.limit);
        if pagination.has_more {
            pagination.next_cursor = last_cursor.map(|cursor| client.encode_cursor(&cursor));
        }
        Ok(pagination)
    }

    /// Number of matching keys, read with a keys-only copy of this query.
    pub async fn count(&self, ctx: &Context, client: &dyn StoreClient) -> Result<usize> {
        let counting = self.clone().keys_only();
        let keys = client.get_all(ctx, &counting.build(client)).await?;
        Ok(keys.len())
    }

    /// Decodes a cursor token, failing on anything the store did not issue.
    pub fn decode_cursor<C: CursorCodec + ?Sized>(codec: &C, token: &str) -> Result<Cursor> {
        codec.decode_cursor(token)
    }

    pub fn encode_cursor<C: CursorCodec + ?Sized>(codec: &C, cursor: &Cursor) -> String {
        codec.encode_cursor(cursor)
    }
}
