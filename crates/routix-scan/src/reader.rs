//! JWalk-based one-shot directory reader.

use std::path::{Path, PathBuf};
use std::time::Instant;

use jwalk::WalkDir;
use tracing::{debug, info, warn};

use routix_core::{BuildConfig, PathEvent, ScanError};

use crate::ignore::IgnoreSet;

/// Reads the pages directory into path events.
#[derive(Debug, Clone)]
pub struct DirReader {
    root: PathBuf,
    config: BuildConfig,
    ignore: IgnoreSet,
}

impl DirReader {
    /// Create a reader for `config.dir`, compiling its ignore patterns.
    pub fn new(config: &BuildConfig) -> Result<Self, ScanError> {
        Ok(Self {
            root: config.dir.clone(),
            ignore: IgnoreSet::new(&config.ignore_patterns)?,
            config: config.clone(),
        })
    }

    /// Check if a relative file path would be reported.
    pub fn is_watched_file(&self, relative: &str) -> bool {
        self.config.is_watched_file(relative) && !self.ignore.is_ignored(relative)
    }

    /// Walk the directory.
    ///
    /// Events come in sorted walk order, so every directory precedes its
    /// contents. Paths are relative to the root and use `/` separators.
    pub fn read(&self) -> Result<Vec<PathEvent>, ScanError> {
        let start = Instant::now();
        let root = self
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&self.root, e))?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        info!(
            "Reading {}/**/*.({})",
            self.root.display(),
            self.config
                .normalized_extensions()
                .map(|x| x[1..].to_string())
                .collect::<Vec<_>>()
                .join("|")
        );

        let walker = WalkDir::new(&root)
            .sort(true)
            .skip_hidden(false)
            .min_depth(1);
        let mut events = Vec::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();
            let Some(relative) = relative_path(&root, &path) else {
                continue;
            };
            if self.ignore.is_ignored(&relative) {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                events.push(PathEvent::directory(relative));
            } else if self.config.is_watched_file(&relative) {
                events.push(PathEvent::file(relative));
            }
        }

        debug!(
            count = events.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Directory read"
        );
        Ok(events)
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
