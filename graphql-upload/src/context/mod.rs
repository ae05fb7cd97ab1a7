//! Per request data handed to the engine alongside the operation.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower::BoxError;

pub use self::extensions::ExtensionsGuard;
pub use self::extensions::ExtensionsMutex;
use crate::json_ext::Value;

mod extensions;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// The context of a request, shared by the upload handling and the engine.
///
/// Serializable entries are stored as JSON; anything else goes into the extensions.
/// Clones share the same data.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Entries,
    extensions: ExtensionsMutex,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, returning the previous one.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<Value>, BoxError>
    where
        K: Into<String>,
        V: Serialize,
    {
        let value = serde_json_bytes::to_value(value)?;
        Ok(self.entries.insert(key.into(), value))
    }

    /// Reads a value back into its type.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, BoxError>
    where
        K: AsRef<str>,
        V: DeserializeOwned,
    {
        self.entries
            .get(key.as_ref())
            .map(|value| serde_json_bytes::from_value(value.value().clone()))
            .transpose()
            .map_err(Into::into)
    }

    pub fn contains_key<K: AsRef<str>>(&self, key: K) -> bool {
        self.entries.contains_key(key.as_ref())
    }

    /// Data that is not serializable.
    pub fn extensions(&self) -> &ExtensionsMutex {
        &self.extensions
    }
}
