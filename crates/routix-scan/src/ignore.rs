//! Ignore patterns compiled into a single glob set.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use routix_core::ScanError;

/// Compiled ignore globs.
///
/// A path is ignored when the pattern matches the path itself, one of its
/// ancestors, or the file name of either. Ignoring a directory thus ignores
/// everything below it.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    set: GlobSet,
}

impl IgnoreSet {
    /// Compile a list of glob patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.kind().to_string(),
            })?;
            builder.add(glob);

            // `dir/**` also covers `dir` itself.
            if let Some(dir) = pattern.strip_suffix("/**") {
                if let Ok(glob) = Glob::new(dir) {
                    builder.add(glob);
                }
            }
        }

        let set = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { set })
    }

    /// Check if a slash-separated relative path is ignored.
    pub fn is_ignored(&self, relative: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        Path::new(relative)
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.set.is_match(p) || p.file_name().is_some_and(|n| self.set.is_match(n)))
    }
}
