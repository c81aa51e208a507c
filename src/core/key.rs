use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Result, StoreError, Value};

/// Logical reference to one entity within a kind.
///
/// Wherever an identifier is optional (`Option<Identifier>`), `None` asks the
/// store to generate one; that is only meaningful when creating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Name(String),
    Id(i64),
}

impl Identifier {
    /// Converts a sequence of dynamic values into identifiers, reporting the
    /// position of the first value that is neither text nor an integer.
    pub fn collect(values: &[Value]) -> Result<Vec<Identifier>> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Identifier::try_from(value).map_err(|e| e.at_index(i)))
            .collect()
    }

    /// Like [`Identifier::collect`], but `Null` means "generate on create".
    pub fn collect_optional(values: &[Value]) -> Result<Vec<Option<Identifier>>> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::Null => Ok(None),
                other => Identifier::try_from(other)
                    .map(Some)
                    .map_err(|e| e.at_index(i)),
            })
            .collect()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{:?}", name),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl TryFrom<&Value> for Identifier {
    type Error = StoreError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Text(name) => Ok(Self::Name(name.clone())),
            Value::Integer(id) => Ok(Self::Id(*id)),
            other => Err(StoreError::InvalidIdentifier {
                index: None,
                found: other.type_name(),
            }),
        }
    }
}

/// The id part of a store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Not yet assigned; the store allocates an id on put.
    Incomplete,
    Id(i64),
    Name(String),
}

/// Store-native key: a kind, an id or name, and an optional parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    parent: Option<Box<Key>>,
    kind: String,
    id: KeyId,
}

impl Key {
    pub fn name_key(kind: impl Into<String>, name: impl Into<String>, parent: Option<Key>) -> Self {
        Self {
            parent: parent.map(Box::new),
            kind: kind.into(),
            id: KeyId::Name(name.into()),
        }
    }

    pub fn id_key(kind: impl Into<String>, id: i64, parent: Option<Key>) -> Self {
        Self {
            parent: parent.map(Box::new),
            kind: kind.into(),
            id: KeyId::Id(id),
        }
    }

    pub fn incomplete_key(kind: impl Into<String>, parent: Option<Key>) -> Self {
        Self {
            parent: parent.map(Box::new),
            kind: kind.into(),
            id: KeyId::Incomplete,
        }
    }

    /// Key for an existing entity: names become name keys, integers id keys.
    pub fn resolve(kind: &str, id: &Identifier) -> Self {
        match id {
            Identifier::Name(name) => Self::name_key(kind, name.as_str(), None),
            Identifier::Id(id) => Self::id_key(kind, *id, None),
        }
    }

    /// Key for a write: an absent identifier yields an incomplete key.
    pub fn resolve_new(kind: &str, id: Option<&Identifier>) -> Self {
        match id {
            Some(id) => Self::resolve(kind, id),
            None => Self::incomplete_key(kind, None),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.id, KeyId::Incomplete)
    }

    pub fn identifier(&self) -> Option<Identifier> {
        match &self.id {
            KeyId::Incomplete => None,
            KeyId::Id(id) => Some(Identifier::Id(*id)),
            KeyId::Name(name) => Some(Identifier::Name(name.clone())),
        }
    }

    /// Returns a completed copy of an incomplete key.
    pub fn with_id(&self, id: i64) -> Self {
        Self {
            parent: self.parent.clone(),
            kind: self.kind.clone(),
            id: KeyId::Id(id),
        }
    }

    /// True if `ancestor` is this key or appears in its parent chain.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            KeyId::Incomplete => write!(f, "{}(?)", self.kind),
            KeyId::Id(id) => write!(f, "{}({})", self.kind, id),
            KeyId::Name(name) => write!(f, "{}({:?})", self.kind, name),
        }
    }
}
