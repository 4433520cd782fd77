//! Typed attachments scoped to one unit of work.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Caller-defined resources attached to a unit of work.
///
/// Values are stored by key and retrieved by type. A lookup with the wrong
/// type returns `None`. Everything is dropped when the unit of work reaches
/// CLEANUP.
#[derive(Default)]
pub struct Resources {
    entries: HashMap<String, Box<dyn Any + Send>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value, returning the previous value if it had the same type.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.entries
            .insert(key.into(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Get the value under `key`, inserting `init()` first if it is absent.
    ///
    /// Returns `None` if a value of a different type is already stored.
    pub fn get_or_insert_with<T, F>(&mut self, key: impl Into<String>, init: F) -> Option<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        self.entries
            .entry(key.into())
            .or_insert_with(|| Box::new(init()))
            .downcast_mut::<T>()
    }

    /// Detach a value. A value of another type is left in place.
    pub fn remove<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        if !self.entries.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.entries
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Resources").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup() {
        let mut resources = Resources::new();
        resources.insert("tx", 42u32);

        assert_eq!(resources.get::<u32>("tx"), Some(&42));
        assert_eq!(resources.get::<String>("tx"), None);

        *resources.get_mut::<u32>("tx").unwrap() += 1;
        assert_eq!(resources.get::<u32>("tx"), Some(&43));
    }

    #[test]
    fn get_or_insert_with_only_initializes_once() {
        let mut resources = Resources::new();
        resources
            .get_or_insert_with("events", Vec::<String>::new)
            .unwrap()
            .push("a".into());
        resources
            .get_or_insert_with("events", || vec!["ignored".to_string()])
            .unwrap()
            .push("b".into());

        assert_eq!(
            resources.get::<Vec<String>>("events").unwrap(),
            &vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn remove_with_wrong_type_keeps_value() {
        let mut resources = Resources::new();
        resources.insert("k", "v".to_string());

        assert_eq!(resources.remove::<u32>("k"), None);
        assert!(resources.contains("k"));
        assert_eq!(resources.remove::<String>("k"), Some("v".to_string()));
        assert!(resources.is_empty());
    }
}
