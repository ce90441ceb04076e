//! Default conversion of path events into draft records.

use std::path::Path;

use routix_core::{BuildConfig, PathEvent, Record};

/// Normalize an event path to `/` separators without a leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// Build the draft record handed to the parse hook.
///
/// Files lose their extension: the first configured one they end with, or
/// else their own. Directories keep their path unchanged.
pub fn draft_record(config: &BuildConfig, event: &PathEvent) -> Record {
    let relative = normalize_path(&event.path);
    let is_file = !event.is_directory();

    let mut extension = None;
    let mut path = relative.clone();
    if is_file {
        let ext = config.matching_extension(&relative).or_else(|| {
            Path::new(&relative)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
        });
        if let Some(ext) = ext {
            if let Some(stem) = relative.strip_suffix(ext.as_str()) {
                path = stem.to_string();
            }
            extension = Some(ext);
        }
    }
    if config.leading_slash {
        path.insert(0, '/');
    }

    let mut record = Record::new(path, is_file)
        .with_absolute(config.dir.join(&relative))
        .with_relative(relative);
    record.extension = extension;
    record
}
