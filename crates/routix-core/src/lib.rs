//! Core types and traits for routix.
//!
//! This crate provides the data structures shared by the rest of the
//! workspace: [`Record`]s and their arena, the [`Registry`] of known entries,
//! the [`PathTrie`] that synthesizes the directory hierarchy, and the
//! [`Store`] that keeps all three consistent. It also defines the hook traits
//! callers use to customize parsing, formatting, ordering and conflict
//! resolution.

mod arena;
mod config;
mod error;
mod hooks;
mod record;
mod registry;
mod store;
mod trie;

pub use arena::RecordArena;
pub use config::{BuildConfig, BuildConfigBuilder};
pub use error::{BuildError, BuildResult, ScanError};
pub use hooks::{
    BoxFuture, ConflictResolver, DefaultOrder, FormatHook, HookError, Hooks, IdentityParse,
    ParseFn, ParseHook, Parsed, PathOrder, PropsFormat, RecordOrder, Resolution, parse_fn,
};
pub use record::{EntryKind, PathEvent, Record, RecordId};
pub use registry::Registry;
pub use store::{EntryRef, Snapshot, SnapshotEntry, Store};
pub use trie::{PathTrie, PutOutcome, segments};
