//! Immutable key/value metadata attached to messages.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known metadata key carrying the id of the message that caused this one.
pub const CORRELATION_ID: &str = "correlation-id";

/// Message metadata.
///
/// Cloning is cheap: the underlying map is shared. Every "mutating" method
/// returns a new `Metadata` and leaves the original untouched, so a message
/// that was already dispatched never observes later enrichment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Arc<BTreeMap<String, String>>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata from an existing map.
    pub fn from_map(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        Arc::make_mut(&mut copy.entries).insert(key.into(), value.into());
        copy
    }

    /// Return a copy with `key` removed.
    pub fn without(&self, key: &str) -> Self {
        if !self.contains(key) {
            return self.clone();
        }
        let mut copy = self.clone();
        Arc::make_mut(&mut copy.entries).remove(key);
        copy
    }

    /// Return a copy containing these entries plus `other`'s. Keys in `other` win.
    pub fn merged(&self, other: &Metadata) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut copy = self.clone();
        let entries = Arc::make_mut(&mut copy.entries);
        for (k, v) in other.iter() {
            entries.insert(k.to_string(), v.to_string());
        }
        copy
    }

    /// Copy the entries into an owned map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.as_ref().clone()
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self::from_map(entries)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_does_not_touch_original() {
        let original = Metadata::new().with("tenant", "acme");
        let enriched = original.with("user", "u-1");

        assert_eq!(original.len(), 1);
        assert_eq!(original.get("user"), None);
        assert_eq!(enriched.get("tenant"), Some("acme"));
        assert_eq!(enriched.get("user"), Some("u-1"));
    }

    #[test]
    fn merged_prefers_other() {
        let a: Metadata = [("k", "a"), ("only-a", "1")].into_iter().collect();
        let b: Metadata = [("k", "b")].into_iter().collect();

        let merged = a.merged(&b);
        assert_eq!(merged.get("k"), Some("b"));
        assert_eq!(merged.get("only-a"), Some("1"));
        assert_eq!(a.get("k"), Some("a"));
    }

    #[test]
    fn without_removes_key() {
        let meta = Metadata::new().with("a", "1").with("b", "2");
        let trimmed = meta.without("a");
        assert!(!trimmed.contains("a"));
        assert!(meta.contains("a"));
        assert_eq!(trimmed.iter().collect::<Vec<_>>(), vec![("b", "2")]);
    }
}
