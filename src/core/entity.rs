use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{Result, StoreError, Value};

/// Property bag stored under a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }

    pub fn into_properties(self) -> BTreeMap<String, Value> {
        self.properties
    }

    /// Copy holding only the named properties.
    pub fn project(&self, fields: &[String]) -> Entity {
        let properties = fields
            .iter()
            .filter_map(|name| {
                self.properties
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Entity { properties }
    }

    /// Maps a serializable record onto properties. The record must serialize
    /// to a map.
    pub fn from_typed<T: Serialize + ?Sized>(record: &T) -> Result<Entity> {
        let json = serde_json::to_value(record).map_err(|e| StoreError::TypeMismatch {
            index: None,
            message: e.to_string(),
        })?;
        match Value::from_json(json) {
            Value::Object(properties) => Ok(Entity { properties }),
            other => Err(StoreError::TypeMismatch {
                index: None,
                message: format!("entity must serialize to a map, got {}", other.type_name()),
            }),
        }
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| StoreError::TypeMismatch {
            index: None,
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.properties
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Entity {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Entity {
            properties: iter.into_iter().collect(),
        }
    }
}
