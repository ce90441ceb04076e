//! Build configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Configuration for a build.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct BuildConfig {
    /// Directory that event paths are relative to.
    pub dir: PathBuf,

    /// Recognized file extensions (a missing leading `.` is implied).
    #[builder(default)]
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Quiet period before a rebuild, in milliseconds.
    #[builder(default = "50")]
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Prefix logical paths with `/`.
    #[builder(default = "false")]
    #[serde(default)]
    pub leading_slash: bool,

    /// Unwrap the default export in generated import thunks.
    #[builder(default = "false")]
    #[serde(default)]
    pub import_default: bool,

    /// Property name of the generated import thunk.
    #[builder(default = "default_import_prop()")]
    #[serde(default = "default_import_prop")]
    pub import_prop: String,

    /// Where to write the routes output.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub routes: Option<PathBuf>,

    /// Where to write the tree output.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub tree: Option<PathBuf>,

    /// Where to write the extras output.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub extras: Option<PathBuf>,

    /// Inline the entry list into the tree output instead of importing it.
    #[builder(default = "false")]
    #[serde(default)]
    pub merged: bool,

    /// Glob patterns skipped when reading the directory.
    #[builder(default)]
    #[serde(default, alias = "ignore")]
    pub ignore_patterns: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_import_prop() -> String {
    "import".to_string()
}

impl BuildConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref dir) = self.dir {
            if dir.as_os_str().is_empty() {
                return Err("Directory cannot be empty".to_string());
            }
        } else {
            return Err("Directory is required".to_string());
        }
        if let Some(ref prop) = self.import_prop {
            if prop.is_empty() {
                return Err("Import property cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl BuildConfig {
    /// Create a new build config builder.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// Create a config with defaults for a directory. No outputs are enabled.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: Vec::new(),
            debounce_ms: default_debounce_ms(),
            leading_slash: false,
            import_default: false,
            import_prop: default_import_prop(),
            routes: None,
            tree: None,
            extras: None,
            merged: false,
            ignore_patterns: Vec::new(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, BuildError> {
        let config: Self = toml::from_str(source).map_err(|e| BuildError::InvalidConfig {
            message: e.to_string(),
        })?;
        if config.dir.as_os_str().is_empty() {
            return Err(BuildError::InvalidConfig {
                message: "Directory cannot be empty".to_string(),
            });
        }
        Ok(config)
    }

    /// Load a TOML file. A relative `dir` is resolved against the file's location.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| BuildError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&source)?;
        if config.dir.is_relative() {
            if let Some(base) = path.parent() {
                config.dir = base.join(&config.dir);
            }
        }
        Ok(config)
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Configured extensions, each with a leading `.`.
    pub fn normalized_extensions(&self) -> impl Iterator<Item = String> + '_ {
        self.extensions.iter().map(|ext| {
            if ext.starts_with('.') {
                ext.clone()
            } else {
                format!(".{ext}")
            }
        })
    }

    /// First configured extension `relative` ends with.
    pub fn matching_extension(&self, relative: &str) -> Option<String> {
        self.normalized_extensions()
            .find(|ext| relative.len() > ext.len() && relative.ends_with(ext.as_str()))
    }

    /// Check if a file path has a recognized extension.
    ///
    /// Every file is recognized when no extension is configured.
    pub fn is_watched_file(&self, relative: &str) -> bool {
        self.extensions.is_empty() || self.matching_extension(relative).is_some()
    }

    /// Whether any output is enabled.
    pub fn has_outputs(&self) -> bool {
        self.routes.is_some() || self.tree.is_some() || self.extras.is_some()
    }

    /// File names of the enabled outputs, for log messages.
    pub fn target_names(&self) -> Vec<String> {
        [&self.routes, &self.tree, &self.extras]
            .into_iter()
            .flatten()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect()
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
