use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Identifier, Value};

/// Comparison operators the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "!=")]
    NotEqual,
}

impl FilterOperator {
    /// Operator suffixes recognized in field expressions, in match order.
    /// Two-character operators come first so `>=` is never read as `>`.
    pub const SUFFIX_PRECEDENCE: [FilterOperator; 5] = [
        Self::GreaterThanOrEqual,
        Self::LessThanOrEqual,
        Self::GreaterThan,
        Self::LessThan,
        Self::NotEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::NotEqual => "!=",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    /// `Value::Null` expresses a null check.
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCondition {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderCondition {
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Store-native spelling: `field` or `-field`.
    pub fn native(&self) -> String {
        match self.direction {
            OrderDirection::Asc => self.field.clone(),
            OrderDirection::Desc => format!("-{}", self.field),
        }
    }
}

/// Restricts results to descendants of `kind(id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorParam {
    pub kind: String,
    pub id: Identifier,
}

/// Canonical description of one query.
///
/// Filters and orders keep the order they were added in. A `limit` or
/// `offset` of zero or less means "unset".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub filters: Vec<FilterCondition>,
    pub orders: Vec<OrderCondition>,
    pub limit: i64,
    pub offset: i64,
    pub cursor: Option<String>,
    pub select: Vec<String>,
    pub distinct: bool,
    pub keys_only: bool,
    pub ancestor: Option<AncestorParam>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: Vec<FilterCondition>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }
}

/// Outcome of one query execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginationResult {
    /// Number of entities this execution returned
    pub total: usize,
    /// `total == limit` for a positive limit. A heuristic: a page that is
    /// exactly full reports more even when nothing follows.
    pub has_more: bool,
    /// Resumption token, set only by cursor execution when `has_more`
    pub next_cursor: Option<String>,
}

impl PaginationResult {
    pub fn from_count(total: usize, limit: i64) -> Self {
        Self {
            total,
            has_more: limit > 0 && total as i64 == limit,
            next_cursor: None,
        }
    }
}
