//! Combined record store: arena, registry and trie kept in sync.
//!
//! The store is the single place that mutates records. Every mutation
//! invalidates the cached children along both the old and the new path, so a
//! following [`Store::snapshot`] only recomputes what changed.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::arena::RecordArena;
use crate::error::{BuildError, BuildResult};
use crate::hooks::{ConflictResolver, Hooks, RecordOrder};
use crate::record::{Record, RecordId};
use crate::registry::Registry;
use crate::trie::{PathTrie, PutOutcome, segments};

/// Renames requested by a resolver may trigger further conflicts; give up
/// after this many rounds.
const MAX_RESOLVE_DEPTH: usize = 8;

/// Reference from one snapshot entry to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum EntryRef {
    /// Index into [`Snapshot::files`].
    File(usize),
    /// Index into [`Snapshot::dirs`].
    Dir(usize),
}

/// A record together with its resolved children.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    #[serde(flatten)]
    pub record: Record,
    /// `None` when the record opted out of the tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<EntryRef>>,
}

/// Consistent view of the store consumed by generators.
///
/// Every directory appears after all of its descendant directories, so
/// references in `children` never point forward within `dirs`.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub root: SnapshotEntry,
    pub files: Vec<SnapshotEntry>,
    pub dirs: Vec<SnapshotEntry>,
    /// Extras payloads keyed by logical path.
    pub extras: IndexMap<String, Value>,
}

/// Owner of all records of one builder.
pub struct Store {
    arena: RecordArena,
    registry: Registry,
    trie: PathTrie,
    inputs: HashMap<String, RecordId>,
    root: RecordId,
    resolver: Option<Arc<dyn ConflictResolver>>,
    order: Arc<dyn RecordOrder>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.arena.len())
            .field("registered", &self.registry.len())
            .field("trie", &self.trie)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create an empty store holding only the root record.
    pub fn new(hooks: &Hooks, leading_slash: bool) -> Self {
        let mut arena = RecordArena::new();
        let root = arena.insert(Record::root());
        Self {
            arena,
            registry: Registry::new(),
            trie: PathTrie::new(root, leading_slash),
            inputs: HashMap::new(),
            root,
            resolver: hooks.resolver.clone(),
            order: Arc::clone(&hooks.order),
        }
    }

    /// Add a record. An input that is already known is updated instead.
    pub fn add(&mut self, record: Record) -> BuildResult<RecordId> {
        if self.inputs.contains_key(record.input_key()) {
            return self.update(record);
        }
        self.insert(record, 0)
    }

    /// Replace the record stored for the same input, at the same or a new path.
    pub fn update(&mut self, mut record: Record) -> BuildResult<RecordId> {
        let Some(&id) = self.inputs.get(record.input_key()) else {
            return self.insert(record, 0);
        };

        if self.arena[id].path != record.path {
            let previous = self.detach(id);
            return match self.insert(record, 0) {
                Ok(id) => Ok(id),
                Err(err) => {
                    if let Some(previous) = previous {
                        self.restore(previous);
                    }
                    Err(err)
                }
            };
        }

        record.children = None;
        record.is_root = false;
        let path = record.path.clone();
        self.arena[id] = record;
        if segments(&path).is_empty() {
            self.reset_root();
        }
        self.trie.put(&mut self.arena, id, true, None)?;
        self.trie.invalidate(&mut self.arena, &path);
        Ok(id)
    }

    /// Remove the record stored for an input. Unknown inputs are ignored.
    pub fn remove(&mut self, input: &str) -> Option<Record> {
        let id = *self.inputs.get(input)?;
        self.detach(id)
    }

    /// Record stored for an input.
    pub fn get(&self, input: &str) -> Option<&Record> {
        self.inputs.get(input).and_then(|id| self.arena.get(*id))
    }

    /// Record by id.
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.arena.get(id)
    }

    /// Record registered at a logical path.
    pub fn at_path(&self, path: &str) -> Option<&Record> {
        self.registry.get(path).and_then(|id| self.arena.get(id))
    }

    /// The permanent root record.
    pub fn root(&self) -> &Record {
        &self.arena[self.root]
    }

    /// Registered records, in registry order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.registry.values().filter_map(|id| self.arena.get(id))
    }

    /// Number of registered records.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if no record is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Read access to the trie.
    pub fn trie(&self) -> &PathTrie {
        &self.trie
    }

    /// Paths of trie nodes that still need a synthesized directory record.
    pub fn vacant_dirs(&self) -> Vec<String> {
        self.trie.vacant_paths()
    }

    /// Install a synthesized directory record at its (vacant) node.
    ///
    /// Returns false, dropping the record, if the node no longer exists or
    /// has been filled meanwhile.
    pub fn install_virtual(&mut self, mut record: Record) -> bool {
        record.is_virtual = true;
        record.is_file = false;
        record.is_root = false;
        record.children = None;
        let path = record.path.clone();
        let id = self.arena.insert(record);
        if !self.trie.install(&self.arena, id) {
            self.arena.remove(id);
            return false;
        }
        self.trie.invalidate(&mut self.arena, &path);
        true
    }

    /// Refresh stale children lists and list directory records, descendants first.
    pub fn unfold(&mut self) -> Vec<RecordId> {
        self.trie.unfold(&mut self.arena, self.order.as_ref())
    }

    /// Unfold and capture a consistent view for generators.
    pub fn snapshot(&mut self) -> Snapshot {
        let dir_ids = self.unfold();

        let mut file_ids: Vec<RecordId> = self
            .registry
            .values()
            .filter(|id| self.arena.get(*id).is_some_and(|r| r.is_file))
            .collect();
        file_ids.sort_by(|a, b| self.order.files(&self.arena[*a], &self.arena[*b]));

        let mut refs = HashMap::with_capacity(file_ids.len() + dir_ids.len());
        refs.extend(file_ids.iter().enumerate().map(|(i, id)| (*id, EntryRef::File(i))));
        refs.extend(dir_ids.iter().enumerate().map(|(i, id)| (*id, EntryRef::Dir(i))));

        let extras = self
            .records()
            .filter_map(|r| r.extra.as_ref().map(|e| (r.path.clone(), e.clone())))
            .collect();

        Snapshot {
            root: self.entry(self.root, &refs),
            files: file_ids.iter().map(|id| self.entry(*id, &refs)).collect(),
            dirs: dir_ids.iter().map(|id| self.entry(*id, &refs)).collect(),
            extras,
        }
    }

    fn entry(&self, id: RecordId, refs: &HashMap<RecordId, EntryRef>) -> SnapshotEntry {
        let record = &self.arena[id];
        let children = record.tree.then(|| {
            // A file mapped onto the root path lists the root's children.
            let ids = if record.is_file && segments(&record.path).is_empty() {
                self.arena[self.root].children()
            } else {
                record.children()
            };
            ids.unwrap_or_default()
                .iter()
                .filter(|c| self.arena.get(**c).is_some_and(|r| r.tree))
                .filter_map(|c| refs.get(c).copied())
                .collect()
        });
        SnapshotEntry {
            record: record.clone(),
            children,
        }
    }

    fn insert(&mut self, mut record: Record, depth: usize) -> BuildResult<RecordId> {
        record.children = None;
        record.is_root = false;
        let path = record.path.clone();
        let key = record.input_key().to_string();

        if segments(&path).is_empty() && record.is_file {
            if let Some(other) = self.at_path(&path) {
                if other.is_file {
                    return Err(BuildError::Conflict { path });
                }
            }
        }

        let id = self.arena.insert(record);
        let outcome = match self
            .trie
            .put(&mut self.arena, id, false, self.resolver.as_deref())
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.arena.remove(id);
                warn!(%path, "Conflicting record");
                return Err(err);
            }
        };

        match outcome {
            PutOutcome::Inserted | PutOutcome::MergedIntoRoot => {}
            PutOutcome::Replaced(previous) => self.discard(previous),
            PutOutcome::Resolved {
                existing,
                incoming,
                renamed,
            } => {
                let Some(record) = self.arena.remove(id) else {
                    return Err(BuildError::Conflict { path });
                };
                return self.resolve(record, existing, incoming, renamed, depth);
            }
        }

        self.registry.put(path.clone(), id);
        self.inputs.insert(key, id);
        self.trie.invalidate(&mut self.arena, &path);
        Ok(id)
    }

    fn resolve(
        &mut self,
        mut incoming: Record,
        existing: RecordId,
        incoming_path: Option<String>,
        existing_path: Option<String>,
        depth: usize,
    ) -> BuildResult<RecordId> {
        let path = incoming.path.clone();
        let current = self.arena[existing].path.clone();
        let moves_incoming = incoming_path.as_ref().is_some_and(|p| *p != path);
        let moves_existing = existing_path.as_ref().is_some_and(|p| *p != current);
        if depth >= MAX_RESOLVE_DEPTH || !(moves_incoming || moves_existing) {
            warn!(%path, depth, "Conflict left unresolved");
            return Err(BuildError::Conflict { path });
        }

        debug!(
            %path,
            incoming = ?incoming_path,
            existing = ?existing_path,
            "Resolving conflict"
        );
        // Virtual occupants are synthesized again on the next unfold if still needed.
        let detached = self.detach(existing).filter(|r| !r.is_virtual);
        if let Some(p) = incoming_path {
            incoming.path = p;
        }

        let mut moved = None;
        if let Some(original) = &detached {
            let mut record = original.clone();
            if let Some(p) = existing_path {
                record.path = p;
            }
            match self.insert(record, depth + 1) {
                Ok(id) => moved = Some(id),
                Err(err) => {
                    self.restore(original.clone());
                    return Err(err);
                }
            }
        }

        match self.insert(incoming, depth + 1) {
            Ok(id) => Ok(id),
            Err(err) => {
                // Undo the move so only the incoming mutation fails.
                if let Some(id) = moved {
                    self.detach(id);
                }
                if let Some(original) = detached {
                    self.restore(original);
                }
                Err(err)
            }
        }
    }

    /// Put a detached record back at its own path after a failed mutation.
    ///
    /// The path was vacated by the detach, so no resolver round is needed.
    fn restore(&mut self, record: Record) {
        let path = record.path.clone();
        if let Err(err) = self.insert(record, MAX_RESOLVE_DEPTH) {
            warn!(%path, error = %err, "Failed to restore record");
        }
    }

    /// Take a record out of every structure and free it.
    fn detach(&mut self, id: RecordId) -> Option<Record> {
        let record = self.arena.get(id)?;
        let path = record.path.clone();
        let key = record.input_key().to_string();

        for pruned in self.trie.remove(&self.arena, &path, id) {
            self.arena.remove(pruned);
        }
        self.trie.invalidate(&mut self.arena, &path);
        if self.registry.get(&path) == Some(id) {
            self.registry.remove(&path);
        }
        if self.inputs.get(&key) == Some(&id) {
            self.inputs.remove(&key);
        }
        if segments(&path).is_empty() {
            self.reset_root();
        }
        self.arena.remove(id)
    }

    /// Free a record displaced from its trie node.
    fn discard(&mut self, id: RecordId) {
        let Some(record) = self.arena.remove(id) else {
            return;
        };
        if record.is_virtual {
            return;
        }
        debug!(path = %record.path, "Replaced directory record");
        if self.registry.get(&record.path) == Some(id) {
            self.registry.remove(&record.path);
        }
        let key = record.input_key();
        if self.inputs.get(key) == Some(&id) {
            self.inputs.remove(key);
        }
    }

    fn reset_root(&mut self) {
        if let Some(root) = self.arena.get_mut(self.root) {
            root.reset_root();
        }
    }
}
