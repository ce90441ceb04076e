//! Entry-list and tree object graphs.

use indexmap::IndexMap;
use routix_core::{EntryRef, FormatHook, Record, Snapshot};
use serde::Serialize;
use serde_json::Value;

/// One file of the entry list.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub index: usize,
    pub path: String,
    /// Module specifier of the lazy import.
    pub import: String,
    pub props: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntryRef>,
}

/// One directory of the entry list.
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub index: usize,
    pub path: String,
    pub props: IndexMap<String, Value>,
    /// `None` when the directory opted out of the tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<EntryRef>>,
}

/// Flat list of files and, when a tree is produced, directories.
#[derive(Debug, Clone, Serialize)]
pub struct EntryList {
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirs: Option<Vec<DirEntry>>,
}

/// The root of the directory tree.
#[derive(Debug, Clone, Serialize)]
pub struct DirTree {
    pub props: IndexMap<String, Value>,
    pub children: Vec<EntryRef>,
}

fn import_specifier(record: &Record) -> String {
    match (&record.absolute, &record.relative) {
        (Some(absolute), _) => absolute.to_string_lossy().replace('\\', "/"),
        (None, Some(relative)) => relative.clone(),
        (None, None) => record.path.clone(),
    }
}

/// Build the entry list.
///
/// Without dirs, files carry no children either: nothing would resolve them.
pub fn entry_list(snapshot: &Snapshot, format: &dyn FormatHook, with_dirs: bool) -> EntryList {
    let files = snapshot
        .files
        .iter()
        .enumerate()
        .map(|(index, entry)| FileEntry {
            index,
            path: entry.record.path.clone(),
            import: import_specifier(&entry.record),
            props: format.format(&entry.record),
            children: if with_dirs {
                entry.children.clone().unwrap_or_default()
            } else {
                Vec::new()
            },
        })
        .collect();

    let dirs = with_dirs.then(|| {
        snapshot
            .dirs
            .iter()
            .enumerate()
            .map(|(index, entry)| DirEntry {
                index,
                path: entry.record.path.clone(),
                props: format.format(&entry.record),
                children: entry.children.clone(),
            })
            .collect()
    });

    EntryList { files, dirs }
}

/// Build the tree root.
pub fn dir_tree(snapshot: &Snapshot, format: &dyn FormatHook) -> DirTree {
    DirTree {
        props: format.format(&snapshot.root.record),
        children: snapshot.root.children.clone().unwrap_or_default(),
    }
}
