//! Flat registry of known records, keyed by logical path.

use indexmap::IndexMap;

use crate::record::RecordId;

/// Mapping from logical path to the record currently registered there.
///
/// Overwriting a path keeps its position; removing it shifts later entries
/// down, so iteration follows first-insertion order of the surviving paths.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, RecordId>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record at `path`, returning the previous one.
    pub fn put(&mut self, path: impl Into<String>, id: RecordId) -> Option<RecordId> {
        self.entries.insert(path.into(), id)
    }

    /// Remove the record at `path`, if any.
    pub fn remove(&mut self, path: &str) -> Option<RecordId> {
        self.entries.shift_remove(path)
    }

    /// Look up the record at `path`.
    pub fn get(&self, path: &str) -> Option<RecordId> {
        self.entries.get(path).copied()
    }

    /// Registered record ids.
    pub fn values(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.entries.values().copied()
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no path is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_keeps_position() {
        let mut registry = Registry::new();
        registry.put("a", RecordId::new(0));
        registry.put("b", RecordId::new(1));
        assert_eq!(registry.put("a", RecordId::new(2)), Some(RecordId::new(0)));

        let ids: Vec<_> = registry.values().collect();
        assert_eq!(ids, vec![RecordId::new(2), RecordId::new(1)]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = Registry::new();
        registry.put("a", RecordId::new(0));
        assert_eq!(registry.remove("missing"), None);
        assert_eq!(registry.remove("a"), Some(RecordId::new(0)));
        assert!(registry.is_empty());
    }
}
