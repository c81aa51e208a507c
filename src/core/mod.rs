pub mod context;
pub mod entity;
pub mod error;
pub mod key;
pub mod value;

pub use context::Context;
pub use entity::Entity;
pub use error::{Result, StoreError};
pub use key::{Identifier, Key, KeyId};
pub use value::Value;
