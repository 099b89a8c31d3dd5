//! Immutable key-value carrier threaded through a chain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hybridci_shared::{HybridCiError, Result};

type Value = Arc<dyn Any + Send + Sync>;

/// Copy-on-write bag of typed values.
///
/// [`Context::insert`] never touches the receiver: it returns a new context
/// sharing every existing value (values sit behind `Arc`, so only the key map
/// is copied). Lookups are typed; a key holding a value of another type reads
/// as absent.
#[derive(Clone, Default)]
pub struct Context {
    values: Arc<HashMap<String, Value>>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new context with `key` bound to `value`.
    #[must_use]
    pub fn insert<T>(&self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        let mut values = (*self.values).clone();
        values.insert(key.into(), Arc::new(value));
        Self {
            values: Arc::new(values),
        }
    }

    /// Typed lookup of an optional key.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Typed lookup of a key an earlier stage must have inserted.
    pub fn require<T: Any>(&self, key: &str) -> Result<&T> {
        self.get(key).ok_or_else(|| HybridCiError::missing_key(key))
    }

    /// Whether `key` is bound, regardless of value type.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Bound keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_leaves_receiver_untouched() {
        let base = Context::new().insert("raw", String::from("a: 1"));
        let next = base.insert("valid", true);

        assert!(!base.contains("valid"));
        assert_eq!(base.len(), 1);
        assert_eq!(next.get::<bool>("valid"), Some(&true));
        assert_eq!(next.get::<String>("raw").map(String::as_str), Some("a: 1"));
    }

    #[test]
    fn rebinding_a_key_yields_new_context() {
        let first = Context::new().insert("n", 1_u32);
        let second = first.insert("n", 2_u32);
        assert_eq!(first.get::<u32>("n"), Some(&1));
        assert_eq!(second.get::<u32>("n"), Some(&2));
    }

    #[test]
    fn typed_lookup_rejects_wrong_type() {
        let ctx = Context::new().insert("n", 7_u64);
        assert!(ctx.get::<String>("n").is_none());
        assert!(ctx.contains("n"));
        let err = ctx.require::<String>("n").unwrap_err();
        assert!(matches!(err, HybridCiError::MissingKey { ref key } if key == "n"));
    }

    #[test]
    fn require_missing_key() {
        let ctx = Context::new();
        assert!(ctx.is_empty());
        assert!(ctx.require::<bool>("valid").is_err());
    }

    #[test]
    fn debug_lists_sorted_keys() {
        let ctx = Context::new().insert("b", 1_u8).insert("a", 2_u8);
        assert_eq!(format!("{ctx:?}"), r#"Context { keys: ["a", "b"] }"#);
    }
}
