//! Path trie with cached-subtree invalidation.
//!
//! Each node stands for one path segment and optionally holds the record
//! occupying that path. Directory records cache their children lists; any
//! mutation beneath a node drops the caches along the path, and [`PathTrie::unfold`]
//! recomputes exactly the stale ones.

use std::cmp::Ordering;

use compact_str::CompactString;
use indexmap::IndexMap;
use tracing::trace;

use crate::arena::RecordArena;
use crate::error::{BuildError, BuildResult};
use crate::hooks::{ConflictResolver, RecordOrder, Resolution};
use crate::record::RecordId;

/// Split a logical path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// What [`PathTrie::put`] did with the incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The node was vacant, or already held this record.
    Inserted,
    /// The previous occupant was displaced and is no longer in the trie.
    Replaced(RecordId),
    /// The record maps to the root path; its properties were merged into the root.
    MergedIntoRoot,
    /// The resolver asked for a rename. Nothing was placed.
    Resolved {
        existing: RecordId,
        incoming: Option<String>,
        renamed: Option<String>,
    },
}

#[derive(Debug, Default)]
struct TrieNode {
    record: Option<RecordId>,
    children: IndexMap<CompactString, TrieNode>,
}

impl TrieNode {
    fn vacant_paths(&self, prefix: &str, path: &mut Vec<CompactString>, out: &mut Vec<String>) {
        for (segment, child) in &self.children {
            path.push(segment.clone());
            if child.record.is_none() {
                out.push(join_path(prefix, path));
            }
            child.vacant_paths(prefix, path, out);
            path.pop();
        }
    }

    fn unfold(&self, arena: &mut RecordArena, order: &dyn RecordOrder, dirs: &mut Vec<RecordId>) {
        // Vacant nodes sort after occupied ones and keep insertion order.
        let mut subtrees: Vec<(usize, &TrieNode)> = self.children.values().enumerate().collect();
        subtrees.sort_by(|(i, a), (j, b)| match (a.record, b.record) {
            (Some(a), Some(b)) => order.dirs(&arena[a], &arena[b]),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => i.cmp(j),
        });
        for (_, child) in subtrees {
            child.unfold(arena, order, dirs);
        }

        let Some(id) = self.record else {
            return;
        };
        if arena[id].children.is_none() {
            let mut children: Vec<RecordId> =
                self.children.values().filter_map(|c| c.record).collect();
            children.sort_by(|a, b| order.children(&arena[*a], &arena[*b]));
            trace!(path = %arena[id].path, count = children.len(), "Recomputed children");
            arena[id].children = Some(children);
        }
        let record = &arena[id];
        if !record.is_file && !record.is_root {
            dirs.push(id);
        }
    }
}

/// Outcome of removing a record below some node.
enum Removal {
    NotFound,
    Found { prune: bool },
}

fn remove_below(
    node: &mut TrieNode,
    segs: &[&str],
    id: RecordId,
    arena: &RecordArena,
    pruned: &mut Vec<RecordId>,
) -> Removal {
    let Some((head, rest)) = segs.split_first() else {
        if node.record != Some(id) {
            return Removal::NotFound;
        }
        node.record = None;
        return Removal::Found {
            prune: node.children.is_empty(),
        };
    };

    let Some(child) = node.children.get_mut(*head) else {
        return Removal::NotFound;
    };
    match remove_below(child, rest, id, arena, pruned) {
        Removal::NotFound => return Removal::NotFound,
        Removal::Found { prune: false } => {}
        Removal::Found { prune: true } => {
            if let Some(child) = node.children.shift_remove(*head) {
                pruned.extend(child.record);
            }
        }
    }

    // Real records hold their node; only empty or virtual ones may go.
    let holds_real = node
        .record
        .is_some_and(|r| arena.get(r).is_some_and(|r| !r.is_virtual));
    Removal::Found {
        prune: node.children.is_empty() && !holds_real,
    }
}

fn join_path(prefix: &str, segments: &[CompactString]) -> String {
    let mut path = String::from(prefix);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            path.push('/');
        }
        path.push_str(segment);
    }
    path
}

/// Hierarchy of records keyed by path segments.
///
/// The root node always exists and always holds the root record.
#[derive(Debug)]
pub struct PathTrie {
    root: TrieNode,
    prefix: &'static str,
}

impl PathTrie {
    /// Create a trie whose root node holds `root`.
    ///
    /// `leading_slash` controls how synthesized paths are spelled.
    pub fn new(root: RecordId, leading_slash: bool) -> Self {
        Self {
            root: TrieNode {
                record: Some(root),
                children: IndexMap::new(),
            },
            prefix: if leading_slash { "/" } else { "" },
        }
    }

    /// Id of the root record.
    pub fn root(&self) -> Option<RecordId> {
        self.root.record
    }

    /// Place record `id` at its path, creating intermediate nodes on demand.
    ///
    /// When the node is already occupied by another record:
    /// - a root occupant absorbs the incoming record's properties;
    /// - otherwise a configured resolver is consulted, and a rename request
    ///   is returned without touching the trie;
    /// - otherwise an existing file fails with [`BuildError::Conflict`] unless
    ///   `allow_replace` is set;
    /// - otherwise the occupant is replaced.
    pub fn put(
        &mut self,
        arena: &mut RecordArena,
        id: RecordId,
        allow_replace: bool,
        resolver: Option<&dyn ConflictResolver>,
    ) -> BuildResult<PutOutcome> {
        let path = arena[id].path.clone();
        let mut node = &mut self.root;
        for segment in segments(&path) {
            node = node.children.entry(CompactString::from(segment)).or_default();
        }

        let Some(existing) = node.record else {
            node.record = Some(id);
            return Ok(PutOutcome::Inserted);
        };
        if existing == id {
            return Ok(PutOutcome::Inserted);
        }

        if arena[existing].is_root {
            let incoming = arena[id].clone();
            arena[existing].merge_into_root(&incoming);
            return Ok(PutOutcome::MergedIntoRoot);
        }

        if let Some(resolver) = resolver {
            if let Resolution::Rename { incoming, existing: renamed } =
                resolver.resolve(&arena[id], &arena[existing])
            {
                return Ok(PutOutcome::Resolved {
                    existing,
                    incoming,
                    renamed,
                });
            }
        }

        if !allow_replace && arena[existing].is_file {
            return Err(BuildError::Conflict { path });
        }

        node.record = Some(id);
        Ok(PutOutcome::Replaced(existing))
    }

    /// Drop the cached children of every record on the way to `path`.
    ///
    /// The node at `path` itself is left alone.
    pub fn invalidate(&self, arena: &mut RecordArena, path: &str) {
        let mut node = &self.root;
        for segment in segments(path) {
            if let Some(id) = node.record {
                if let Some(record) = arena.get_mut(id) {
                    record.children = None;
                }
            }
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return,
            }
        }
    }

    /// Remove record `id` from its node and prune branches left empty.
    ///
    /// Pruning walks back toward the root and stops at the first node that
    /// holds a real record or still has other children. Returns the ids of
    /// virtual records that were pruned along the way; they are no longer
    /// reachable and may be freed. Unknown paths are ignored.
    pub fn remove(&mut self, arena: &RecordArena, path: &str, id: RecordId) -> Vec<RecordId> {
        let segs = segments(path);
        let mut pruned = Vec::new();
        if segs.is_empty() {
            return pruned;
        }
        remove_below(&mut self.root, &segs, id, arena, &mut pruned);
        pruned
    }

    /// Paths of nodes that hold no record, parents before children.
    pub fn vacant_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root
            .vacant_paths(self.prefix, &mut Vec::new(), &mut out);
        out
    }

    /// Place a synthesized record at its node if that node is still vacant.
    pub fn install(&mut self, arena: &RecordArena, id: RecordId) -> bool {
        let mut node = &mut self.root;
        for segment in segments(&arena[id].path) {
            match node.children.get_mut(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        if node.record.is_some() {
            return false;
        }
        node.record = Some(id);
        true
    }

    /// Refresh every stale children list.
    ///
    /// Vacant nodes are expected to have been filled with
    /// [`install`](Self::install) first; any left over contribute no record
    /// and are visited after their occupied siblings. Returns all
    /// directory records (real and virtual, without the root) with each one
    /// listed after all of its descendants.
    pub fn unfold(&self, arena: &mut RecordArena, order: &dyn RecordOrder) -> Vec<RecordId> {
        let mut dirs = Vec::new();
        self.root.unfold(arena, order, &mut dirs);
        dirs
    }

    /// Check whether a node exists for `path`.
    pub fn contains_path(&self, path: &str) -> bool {
        let mut node = &self.root;
        for segment in segments(path) {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    /// Id of the record occupying `path`.
    pub fn get(&self, path: &str) -> Option<RecordId> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        node.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{DefaultOrder, PathOrder};
    use crate::record::Record;

    fn setup() -> (RecordArena, PathTrie) {
        let mut arena = RecordArena::new();
        let root = arena.insert(Record::root());
        (arena, PathTrie::new(root, false))
    }

    fn add(arena: &mut RecordArena, trie: &mut PathTrie, record: Record) -> RecordId {
        let id = arena.insert(record);
        trie.put(arena, id, false, None).unwrap();
        id
    }

    fn fill(arena: &mut RecordArena, trie: &mut PathTrie) {
        for path in trie.vacant_paths() {
            let id = arena.insert(Record::virtual_dir(path));
            assert!(trie.install(arena, id));
        }
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("foo/bar"), vec!["foo", "bar"]);
        assert_eq!(segments("/foo//bar/"), vec!["foo", "bar"]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_conflicting_files() {
        let (mut arena, mut trie) = setup();
        add(&mut arena, &mut trie, Record::file("a/b"));
        let other = arena.insert(Record::file("a/b"));
        let err = trie.put(&mut arena, other, false, None).unwrap_err();
        assert!(matches!(err, BuildError::Conflict { ref path } if path == "a/b"));

        assert!(matches!(
            trie.put(&mut arena, other, true, None),
            Ok(PutOutcome::Replaced(_))
        ));
    }

    #[test]
    fn test_file_replaces_virtual_dir() {
        let (mut arena, mut trie) = setup();
        add(&mut arena, &mut trie, Record::file("a/b"));
        fill(&mut arena, &mut trie);
        let virtual_a = trie.get("a").unwrap();
        assert!(arena[virtual_a].is_virtual);

        let file = arena.insert(Record::file("a"));
        let outcome = trie.put(&mut arena, file, false, None).unwrap();
        assert_eq!(outcome, PutOutcome::Replaced(virtual_a));
        assert_eq!(trie.get("a"), Some(file));
    }

    #[test]
    fn test_root_merge() {
        let (mut arena, mut trie) = setup();
        let index = arena.insert(Record::file("").with_prop("title", "Home"));
        let outcome = trie.put(&mut arena, index, false, None).unwrap();
        assert_eq!(outcome, PutOutcome::MergedIntoRoot);
        let root = trie.root().unwrap();
        assert_eq!(arena[root].props["title"], "Home");
        assert!(arena[root].is_root);
    }

    #[test]
    fn test_unfold_synthesizes_in_post_order() {
        let (mut arena, mut trie) = setup();
        let file = add(&mut arena, &mut trie, Record::file("foo/bar/baz"));
        assert_eq!(trie.vacant_paths(), vec!["foo", "foo/bar"]);
        fill(&mut arena, &mut trie);

        let dirs = trie.unfold(&mut arena, &DefaultOrder);
        let paths: Vec<_> = dirs.iter().map(|id| arena[*id].path.as_str()).collect();
        assert_eq!(paths, vec!["foo/bar", "foo"]);
        assert_eq!(arena[dirs[0]].children(), Some(&[file][..]));
        assert_eq!(arena[dirs[1]].children(), Some(&[dirs[0]][..]));
    }

    #[test]
    fn test_unfold_with_vacant_nodes() {
        let (mut arena, mut trie) = setup();
        for path in ["d/e/x", "c/x", "b/x", "a/x"] {
            add(&mut arena, &mut trie, Record::file(path));
        }
        for path in ["c", "a", "d/e"] {
            let id = arena.insert(Record::virtual_dir(path));
            assert!(trie.install(&arena, id));
        }

        let dirs = trie.unfold(&mut arena, &PathOrder);
        let paths: Vec<_> = dirs.iter().map(|id| arena[*id].path.as_str()).collect();
        assert_eq!(paths, vec!["a", "c", "d/e"]);
    }

    #[test]
    fn test_invalidate_only_touches_ancestors() {
        let (mut arena, mut trie) = setup();
        add(&mut arena, &mut trie, Record::file("a/x"));
        add(&mut arena, &mut trie, Record::file("b/y"));
        fill(&mut arena, &mut trie);
        trie.unfold(&mut arena, &DefaultOrder);

        trie.invalidate(&mut arena, "a/x");
        let a = trie.get("a").unwrap();
        let b = trie.get("b").unwrap();
        assert!(arena[a].children().is_none());
        assert!(arena[trie.root().unwrap()].children().is_none());
        assert!(arena[b].children().is_some());
    }

    #[test]
    fn test_remove_prunes_empty_branch() {
        let (mut arena, mut trie) = setup();
        let baz = add(&mut arena, &mut trie, Record::file("foo/bar/baz"));
        fill(&mut arena, &mut trie);

        let pruned = trie.remove(&arena, "foo/bar/baz", baz);
        assert_eq!(pruned.len(), 2);
        assert!(!trie.contains_path("foo"));
        assert!(trie.vacant_paths().is_empty());
    }

    #[test]
    fn test_remove_stops_at_non_empty_ancestor() {
        let (mut arena, mut trie) = setup();
        let a = add(&mut arena, &mut trie, Record::file("foo/a"));
        add(&mut arena, &mut trie, Record::file("foo/b"));
        fill(&mut arena, &mut trie);

        let pruned = trie.remove(&arena, "foo/a", a);
        assert!(pruned.is_empty());
        assert!(trie.contains_path("foo"));
        assert!(!trie.contains_path("foo/a"));
    }

    #[test]
    fn test_remove_stops_at_real_file() {
        let (mut arena, mut trie) = setup();
        add(&mut arena, &mut trie, Record::file("a"));
        let c = add(&mut arena, &mut trie, Record::file("a/b/c"));
        fill(&mut arena, &mut trie);

        let pruned = trie.remove(&arena, "a/b/c", c);
        assert_eq!(pruned.len(), 1);
        assert!(trie.contains_path("a"));
        assert!(!trie.contains_path("a/b"));
    }

    #[test]
    fn test_remove_keeps_node_with_children() {
        let (mut arena, mut trie) = setup();
        let a = add(&mut arena, &mut trie, Record::file("a"));
        add(&mut arena, &mut trie, Record::file("a/b"));

        assert!(trie.remove(&arena, "a", a).is_empty());
        assert!(trie.contains_path("a/b"));
        assert_eq!(trie.vacant_paths(), vec!["a"]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let (mut arena, mut trie) = setup();
        let a = add(&mut arena, &mut trie, Record::file("a"));
        assert!(trie.remove(&arena, "missing/path", a).is_empty());
        assert!(trie.remove(&arena, "a", RecordId::new(99)).is_empty());
        assert_eq!(trie.get("a"), Some(a));
    }

    #[test]
    fn test_leading_slash_vacant_paths() {
        let mut arena = RecordArena::new();
        let root = arena.insert(Record::root());
        let mut trie = PathTrie::new(root, true);
        add(&mut arena, &mut trie, Record::file("/foo/bar"));
        assert_eq!(trie.vacant_paths(), vec!["/foo"]);
    }
}
