//! Record types: the normalized form of one file or directory.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identifier for a record within a [`RecordArena`](crate::RecordArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub usize);

impl RecordId {
    /// Create a new RecordId from a slot index.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of filesystem entry an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// A raw add/update/remove event, as supplied by a watcher or directory reader.
///
/// `path` is relative to the watched directory and uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathEvent {
    pub path: String,
    pub kind: EntryKind,
}

impl PathEvent {
    /// Create a new path event.
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Create an event for a regular file.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, EntryKind::File)
    }

    /// Create an event for a directory.
    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(path, EntryKind::Directory)
    }

    /// Check if this event refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

fn default_true() -> bool {
    true
}

/// The authoritative data for one file or directory at a logical path.
///
/// Records are produced by the parse hook from a [`PathEvent`], or synthesized
/// as virtual directories when some descendant path needs a parent that no
/// event ever mentioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Logical, slash-separated path. Unique among file records.
    pub path: String,
    /// Path of the originating event, relative to the watched directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<String>,
    /// Absolute location of the originating file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<PathBuf>,
    /// Extension stripped from `relative` to form `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// When false, changes to this record do not dirty the routes and tree outputs.
    #[serde(default = "default_true")]
    pub rebuild: bool,
    /// When false, changes to this record do not dirty the extras output.
    #[serde(default = "default_true")]
    pub rebuild_extras: bool,
    /// When false, the record is left out of generated children lists.
    #[serde(default = "default_true")]
    pub tree: bool,
    /// Payload emitted into the extras output, keyed by `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Caller-set properties, available to the format hook.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub props: IndexMap<String, Value>,
    /// Cached children, `None` while stale.
    #[serde(skip)]
    pub(crate) children: Option<Vec<RecordId>>,
}

impl Record {
    /// Create a record with default flags.
    pub fn new(path: impl Into<String>, is_file: bool) -> Self {
        Self {
            path: path.into(),
            relative: None,
            absolute: None,
            extension: None,
            is_file,
            is_root: false,
            is_virtual: false,
            title: None,
            rebuild: true,
            rebuild_extras: true,
            tree: true,
            extra: None,
            props: IndexMap::new(),
            children: None,
        }
    }

    /// Create a file record.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, true)
    }

    /// Create a (real) directory record.
    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(path, false)
    }

    /// Create a synthesized directory record.
    ///
    /// The title is derived from the last path segment, with runs of `_`
    /// turned into a single space.
    pub fn virtual_dir(path: impl Into<String>) -> Self {
        let mut record = Self::new(path, false);
        record.is_virtual = true;
        record.title = Some(title_from_segment(record.segment()));
        record
    }

    /// Create the permanent root record.
    pub fn root() -> Self {
        let mut record = Self::new("", false);
        record.is_root = true;
        record
    }

    /// Set the originating relative path.
    pub fn with_relative(mut self, relative: impl Into<String>) -> Self {
        self.relative = Some(relative.into());
        self
    }

    /// Set the absolute location.
    pub fn with_absolute(mut self, absolute: impl Into<PathBuf>) -> Self {
        self.absolute = Some(absolute.into());
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set a caller property.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Set the extras payload.
    pub fn with_extra(mut self, extra: impl Into<Value>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Opt in or out of routes/tree regeneration.
    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Opt in or out of extras regeneration.
    pub fn with_rebuild_extras(mut self, rebuild_extras: bool) -> Self {
        self.rebuild_extras = rebuild_extras;
        self
    }

    /// Opt in or out of generated children lists.
    pub fn with_tree(mut self, tree: bool) -> Self {
        self.tree = tree;
        self
    }

    /// Key under which the builder tracks this record's originating input.
    ///
    /// Records without a relative path (usually hand-built ones) are keyed
    /// by their logical path.
    pub fn input_key(&self) -> &str {
        self.relative.as_deref().unwrap_or(&self.path)
    }

    /// Last segment of the logical path.
    pub fn segment(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Check if this record is a directory (real, virtual or root).
    pub fn is_directory(&self) -> bool {
        !self.is_file
    }

    /// Cached children, if they have been computed since the last invalidation.
    pub fn children(&self) -> Option<&[RecordId]> {
        self.children.as_deref()
    }

    /// Merge the properties of a record mapped onto the root path.
    ///
    /// Only properties are taken; the root keeps its identity and children.
    pub(crate) fn merge_into_root(&mut self, other: &Record) {
        self.props
            .extend(other.props.iter().map(|(k, v)| (k.clone(), v.clone())));
        if other.extra.is_some() {
            self.extra.clone_from(&other.extra);
        }
        if other.title.is_some() {
            self.title.clone_from(&other.title);
        }
    }

    /// Drop properties previously merged into the root.
    pub(crate) fn reset_root(&mut self) {
        self.props.clear();
        self.extra = None;
        self.title = None;
    }
}

/// Human title for a path segment.
pub(crate) fn title_from_segment(segment: &str) -> String {
    let mut title = String::with_capacity(segment.len());
    let mut in_run = false;
    for c in segment.chars() {
        if c == '_' {
            if !in_run {
                title.push(' ');
            }
            in_run = true;
        } else {
            title.push(c);
            in_run = false;
        }
    }
    title
}
