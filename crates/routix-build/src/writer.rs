//! Persistence of generated outputs.

use std::io;
use std::path::{Path, PathBuf};

use dashmap::{DashMap, DashSet};
use routix_core::BoxFuture;

/// Persists a generated output.
pub trait Writer: Send + Sync {
    fn write<'a>(&'a self, target: &'a Path, contents: String) -> BoxFuture<'a, io::Result<()>>;
}

/// Writes outputs to disk, creating parent directories as needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWriter;

impl Writer for FsWriter {
    fn write<'a>(&'a self, target: &'a Path, contents: String) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(target, contents).await
        })
    }
}

/// Keeps outputs in memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: DashMap<PathBuf, String>,
    writes: DashMap<PathBuf, usize>,
    failing: DashSet<PathBuf>,
}

impl MemoryWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last contents written to `target`.
    pub fn get(&self, target: impl AsRef<Path>) -> Option<String> {
        self.files.get(target.as_ref()).map(|c| c.value().clone())
    }

    /// Number of writes to `target` so far.
    pub fn write_count(&self, target: impl AsRef<Path>) -> usize {
        self.writes.get(target.as_ref()).map_or(0, |n| *n)
    }

    /// Total number of writes.
    pub fn total_writes(&self) -> usize {
        self.writes.iter().map(|n| *n.value()).sum()
    }

    /// Make writes to `target` fail until [`recover`](Self::recover) is called.
    pub fn fail_on(&self, target: impl Into<PathBuf>) {
        self.failing.insert(target.into());
    }

    /// Let writes to `target` succeed again.
    pub fn recover(&self, target: impl AsRef<Path>) {
        self.failing.remove(target.as_ref());
    }
}

impl Writer for MemoryWriter {
    fn write<'a>(&'a self, target: &'a Path, contents: String) -> BoxFuture<'a, io::Result<()>> {
        let result = if self.failing.contains(target) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "write refused"))
        } else {
            self.files.insert(target.to_path_buf(), contents);
            *self.writes.entry(target.to_path_buf()).or_insert(0) += 1;
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}
