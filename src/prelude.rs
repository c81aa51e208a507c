//! Everything an application usually needs in one import.

pub use crate::config::StoreConfig;
pub use crate::core::{Context, Entity, Identifier, Key, KeyId, Result, StoreError, Value};
pub use crate::executor::Executor;
pub use crate::filter_record;
pub use crate::query::{
    FieldDescriptor, FieldMap, FilterBuilder, FilterCondition, FilterOperator, FilterRecord,
    OrderDirection, PaginationResult, QueryBuilder, QueryInput, QuerySpec,
};
pub use crate::repository::{BaseRepository, Repository};
pub use crate::store::{InMemoryStore, StoreClient, Transaction};
