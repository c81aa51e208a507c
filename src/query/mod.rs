//! Query specification, filter normalization and the query builder.

pub mod builder;
pub mod filter;
pub mod params;
pub mod types;

pub use builder::QueryBuilder;
pub use filter::{
    FieldDescriptor, FilterBuilder, FilterRecord, normalize_map, normalize_record,
    parse_field_expression,
};
pub use params::{FieldMap, QueryInput, RESERVED_KEYS, spec_from_map};
pub use types::{
    AncestorParam, FilterCondition, FilterOperator, OrderCondition, OrderDirection,
    PaginationResult, QuerySpec,
};
