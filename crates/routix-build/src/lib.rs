//! Incremental build scheduler for routix.
//!
//! A [`Builder`] receives add/update/remove events, runs the parse hook on
//! each, and keeps a [`Store`](routix_core::Store) in sync. Bursts of changes
//! are debounced, in-flight parses hold the rebuild back through a latch
//! counter, and rebuilds are serialized so at most one runs at a time.
//!
//! The timing protocol itself lives in [`Scheduler`], a pure state machine
//! that the builder drives with events and whose actions it executes.

mod builder;
mod parse;
mod scheduler;
mod writer;

pub use builder::{Builder, ChangeSignal};
pub use parse::{draft_record, normalize_path};
pub use scheduler::{Action, Event, Outputs, Phase, Scheduler};
pub use writer::{FsWriter, MemoryWriter, Writer};
