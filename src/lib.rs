// ============================================================================
// kindstore Library
// ============================================================================

//! Query building and repository layer over a kind-based document store.
//!
//! ```
//! use std::sync::Arc;
//!
//! use kindstore::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> kindstore::Result<()> {
//! let store: Arc<dyn StoreClient> = Arc::new(InMemoryStore::new());
//! let users = BaseRepository::new(store, "users");
//! let ctx = Context::background();
//!
//! users
//!     .create(&ctx, Some(&"ann".into()), Entity::new().with("age", 31))
//!     .await?;
//!
//! let filters = FieldMap::new().with("age>=", 18).with("limit", 10);
//! let (adults, page) = users.query(&ctx, filters.into()).await?;
//! assert_eq!(adults.len(), 1);
//! assert!(!page.has_more);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod executor;
pub mod prelude;
pub mod query;
pub mod repository;
pub mod store;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use core::{Context, Entity, Identifier, Key, KeyId, Result, StoreError, Value};
pub use executor::Executor;
pub use query::{
    FieldMap, FilterBuilder, FilterCondition, FilterOperator, FilterRecord, OrderDirection,
    PaginationResult, QueryBuilder, QueryInput, QuerySpec,
};
pub use repository::{BaseRepository, Repository};
pub use store::{InMemoryStore, StoreClient};
