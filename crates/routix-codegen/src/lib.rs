//! Output generators for routix.
//!
//! Generators are thin consumers of a [`Snapshot`](routix_core::Snapshot):
//!
//! - **Entry list** - flat files and directories, cross-referenced by index
//! - **Tree** - the root object whose children point into the entry list
//! - **Extras** - per-path payloads collected from records
//!
//! The [`js`] module serializes these object graphs as JavaScript modules, and
//! [`Generator`] ties both together for the outputs a build has enabled.
//!
//! ```rust,ignore
//! use routix_codegen::{Generator, Target};
//!
//! let generator = Generator::new(&config);
//! for artifact in generator.render(&snapshot, &PropsFormat, &[Target::Routes])? {
//!     println!("{}: {} bytes", artifact.path.display(), artifact.contents.len());
//! }
//! ```

mod entries;
mod generator;
pub mod js;

pub use entries::{DirEntry, DirTree, EntryList, FileEntry, dir_tree, entry_list};
pub use generator::{Artifact, Generator, RenderError, Target};
pub use js::JsOptions;
