use std::borrow::Cow;

use log::warn;

use super::filter::{FilterRecord, normalize_map, normalize_record};
use super::types::{FilterCondition, OrderCondition, OrderDirection, QuerySpec};
use crate::core::Value;

/// Map keys that configure pagination instead of becoming filters.
pub const RESERVED_KEYS: [&str; 4] = ["limit", "offset", "cursor", "order_by"];

/// Ordered field-expression map, e.g. `{"age>=": 18, "status": "active"}`.
///
/// Entries keep insertion order so the normalized filters come out in the
/// order the caller wrote them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMap(Vec<(String, Value)>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expression: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(expression, value);
        self
    }

    pub fn insert(&mut self, expression: impl Into<String>, value: impl Into<Value>) {
        self.0.push((expression.into(), value.into()));
    }

    pub fn get(&self, expression: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(key, _)| key == expression)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(key, value)| (key, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds a map from a JSON object. Anything else gives an empty map.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(fields) => fields
                .iter()
                .map(|(key, value)| (key.clone(), Value::from_json(value.clone())))
                .collect(),
            other => {
                warn!("ignoring non-object filter input: {}", other);
                Self::default()
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Every shape a query can be described in.
#[derive(Debug, Clone)]
pub enum QueryInput<'a> {
    /// Used as is
    Spec(Cow<'a, QuerySpec>),
    /// Field expressions plus the reserved keys in [`RESERVED_KEYS`]
    Map(FieldMap),
    /// Already normalized equality filters, usually from a record
    Filters(Vec<FilterCondition>),
}

impl QueryInput<'_> {
    /// Equality filters for the set fields of `record`.
    pub fn from_record<R: FilterRecord>(record: &R) -> Self {
        QueryInput::Filters(normalize_record(record))
    }

    pub fn into_spec(self) -> QuerySpec {
        match self {
            QueryInput::Spec(spec) => spec.into_owned(),
            QueryInput::Map(map) => spec_from_map(&map),
            QueryInput::Filters(filters) => QuerySpec::with_filters(filters),
        }
    }
}

impl From<QuerySpec> for QueryInput<'_> {
    fn from(spec: QuerySpec) -> Self {
        QueryInput::Spec(Cow::Owned(spec))
    }
}

impl<'a> From<&'a QuerySpec> for QueryInput<'a> {
    fn from(spec: &'a QuerySpec) -> Self {
        QueryInput::Spec(Cow::Borrowed(spec))
    }
}

impl From<FieldMap> for QueryInput<'_> {
    fn from(map: FieldMap) -> Self {
        QueryInput::Map(map)
    }
}

impl From<Vec<FilterCondition>> for QueryInput<'_> {
    fn from(filters: Vec<FilterCondition>) -> Self {
        QueryInput::Filters(filters)
    }
}

impl From<serde_json::Value> for QueryInput<'_> {
    fn from(json: serde_json::Value) -> Self {
        QueryInput::Map(FieldMap::from_json(&json))
    }
}

/// Splits a map into pagination settings and filters.
///
/// `order_by` always sorts ascending. A reserved key holding the wrong type
/// is dropped.
pub fn spec_from_map(map: &FieldMap) -> QuerySpec {
    let mut spec = QuerySpec::new();
    let mut filters = FieldMap::new();

    for (key, value) in map.iter() {
        match (key.as_str(), value) {
            ("limit", Value::Integer(limit)) => spec.limit = *limit,
            ("offset", Value::Integer(offset)) => spec.offset = *offset,
            ("cursor", Value::Text(cursor)) => spec.cursor = Some(cursor.clone()),
            ("order_by", Value::Text(field)) => spec
                .orders
                .push(OrderCondition::new(field.as_str(), OrderDirection::Asc)),
            (reserved, other) if RESERVED_KEYS.contains(&reserved) => {
                warn!("ignoring {} with unsupported type {}", reserved, other.type_name());
            }
            _ => filters.insert(key.as_str(), value.clone()),
        }
    }

    spec.filters = normalize_map(&filters);
    spec
}
