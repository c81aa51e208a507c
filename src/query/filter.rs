//! Normalization of caller filter input into [`FilterCondition`] lists.
//!
//! Normalization never fails. Input it cannot interpret (a JSON document
//! that is not an object, a key that names no field) contributes no
//! conditions and is logged at `warn`; validating types is the caller's job.

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Utc};
use log::warn;

use super::params::FieldMap;
use super::types::{FilterCondition, FilterOperator};
use crate::core::Value;

/// Splits a field expression such as `"age>="` into its field and operator.
///
/// Operators are searched in [`FilterOperator::SUFFIX_PRECEDENCE`] order and
/// the field is the trimmed text before the first match. Expressions with no
/// operator are plain equality on the whole key.
pub fn parse_field_expression(expression: &str) -> (String, FilterOperator) {
    for operator in FilterOperator::SUFFIX_PRECEDENCE {
        if let Some(at) = expression.find(operator.as_str()) {
            return (expression[..at].trim().to_string(), operator);
        }
    }
    (expression.to_string(), FilterOperator::Equal)
}

/// Normalizes a field-expression map, keeping the map's entry order.
pub fn normalize_map(map: &FieldMap) -> Vec<FilterCondition> {
    map.iter()
        .filter_map(|(expression, value)| {
            let (field, operator) = parse_field_expression(expression);
            if field.is_empty() {
                warn!("skipping filter key {:?}: no field name", expression);
                return None;
            }
            Some(FilterCondition {
                field,
                operator,
                value: value.clone(),
            })
        })
        .collect()
}

/// Equality conditions for every set field of a record, in descriptor order.
pub fn normalize_record<R: FilterRecord>(record: &R) -> Vec<FilterCondition> {
    R::field_descriptors()
        .iter()
        .filter_map(|descriptor| {
            descriptor
                .extract(record)
                .map(|value| FilterCondition::new(descriptor.name, FilterOperator::Equal, value))
        })
        .collect()
}

/// Describes one filterable field of a record type.
pub struct FieldDescriptor<R> {
    /// Stored property name
    pub name: &'static str,
    pub value: fn(&R) -> Value,
    /// Overrides the default "zero value" test on the extracted value.
    pub is_unset: Option<fn(&R) -> bool>,
}

impl<R> FieldDescriptor<R> {
    pub fn new(name: &'static str, value: fn(&R) -> Value) -> Self {
        Self {
            name,
            value,
            is_unset: None,
        }
    }

    pub fn unset_when(mut self, predicate: fn(&R) -> bool) -> Self {
        self.is_unset = Some(predicate);
        self
    }

    /// The field's value, or `None` when the field is unset.
    pub fn extract(&self, record: &R) -> Option<Value> {
        match self.is_unset {
            Some(is_unset) if is_unset(record) => None,
            Some(_) => Some((self.value)(record)),
            None => Some((self.value)(record)).filter(|value| !value.is_zero()),
        }
    }
}

/// Record types that can be turned into equality filters.
///
/// Usually implemented with [`filter_record!`](crate::filter_record).
pub trait FilterRecord: Sized {
    fn field_descriptors() -> Vec<FieldDescriptor<Self>>;
}

/// Implements [`FilterRecord`] for a struct from a list of its fields.
///
/// Each field is stored under its identifier unless a property name is given
/// with `=> "name"`. Field types must convert into [`Value`] and be `Clone`.
///
/// ```ignore
/// filter_record!(User { email, age, created_at => "created" });
/// ```
#[macro_export]
macro_rules! filter_record {
    (@name $field:ident) => {
        stringify!($field)
    };
    (@name $field:ident, $name:literal) => {
        $name
    };
    ($record:ty { $($field:ident $(=> $name:literal)?),* $(,)? }) => {
        impl $crate::query::FilterRecord for $record {
            fn field_descriptors() -> Vec<$crate::query::FieldDescriptor<Self>> {
                vec![$(
                    $crate::query::FieldDescriptor::new(
                        $crate::filter_record!(@name $field $(, $name)?),
                        |record: &Self| $crate::core::Value::from(record.$field.clone()),
                    )
                ),*]
            }
        }
    };
}

/// Accumulates filter conditions.
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filters: Vec<FilterCondition>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, operator: FilterOperator, value: impl Into<Value>) -> Self {
        self.filters.push(FilterCondition::new(field, operator, value));
        self
    }

    pub fn equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Equal, value)
    }

    pub fn not_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::NotEqual, value)
    }

    pub fn greater_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::GreaterThan, value)
    }

    pub fn greater_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn less_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::LessThan, value)
    }

    pub fn less_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::LessThanOrEqual, value)
    }

    /// `field >= start AND field <= end`
    pub fn between(self, field: &str, start: impl Into<Value>, end: impl Into<Value>) -> Self {
        self.greater_than_or_equal(field, start)
            .less_than_or_equal(field, end)
    }

    /// Equality against `Null`; the store has no separate null operator.
    pub fn is_null(self, field: &str) -> Self {
        self.push(field, FilterOperator::Equal, Value::Null)
    }

    pub fn date_range(self, field: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.between(field, start, end)
    }

    /// Range covering the current local day.
    pub fn today(self, field: &str) -> Self {
        self.today_at(field, Local::now())
    }

    /// Range from local midnight of `now`'s day to 24 hours later.
    pub fn today_at<Tz: TimeZone>(self, field: &str, now: DateTime<Tz>) -> Self {
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        let start = now
            .timezone()
            .from_local_datetime(&midnight)
            .earliest()
            .unwrap_or_else(|| now.clone())
            .with_timezone(&Utc);
        self.date_range(field, start, start + TimeDelta::hours(24))
    }

    pub fn from_record<R: FilterRecord>(mut self, record: &R) -> Self {
        self.filters.extend(normalize_record(record));
        self
    }

    /// Every entry becomes a condition; reserved pagination keys are not
    /// special here.
    pub fn from_map(mut self, map: &FieldMap) -> Self {
        self.filters.extend(normalize_map(map));
        self
    }

    pub fn from_json(self, json: &serde_json::Value) -> Self {
        self.from_map(&FieldMap::from_json(json))
    }

    pub fn build(self) -> Vec<FilterCondition> {
        self.filters
    }
}
