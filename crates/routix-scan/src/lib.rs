//! Directory reader for routix.
//!
//! Walks the pages directory once with jwalk and turns what it finds into the
//! [`PathEvent`]s a [`Builder`](../routix_build/struct.Builder.html) consumes.
//! Only directories and files with a watched extension are reported, minus
//! anything matched by the configured ignore globs.
//!
//! # Example
//!
//! ```rust,no_run
//! use routix_scan::{BuildConfig, DirReader};
//!
//! let mut config = BuildConfig::new("src/pages");
//! config.extensions = vec![".svelte".to_string()];
//!
//! let events = DirReader::new(&config).unwrap().read().unwrap();
//! println!("Found {} entries", events.len());
//! ```

mod ignore;
mod reader;

pub use ignore::IgnoreSet;
pub use reader::DirReader;

// Re-export core types for convenience
pub use routix_core::{BuildConfig, EntryKind, PathEvent, ScanError};
