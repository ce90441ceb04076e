//! Renders the enabled outputs of a build from a snapshot.

use std::path::{Path, PathBuf};

use routix_core::{BuildConfig, FormatHook, Snapshot};
use strum::{Display, EnumIter};
use thiserror::Error;
use tracing::trace;

use crate::entries::{dir_tree, entry_list};
use crate::js::{self, JsOptions};

/// One kind of generated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    Routes,
    Tree,
    Extras,
}

/// A rendered output ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub target: Target,
    pub path: PathBuf,
    pub contents: String,
}

/// An output that could not be rendered.
#[derive(Debug, Error)]
#[error("Failed to render {target} ({})", path.display())]
pub struct RenderError {
    pub target: Target,
    pub path: PathBuf,
    #[source]
    pub source: serde_json::Error,
}

impl Artifact {
    fn rendered(
        target: Target,
        path: &Path,
        contents: serde_json::Result<String>,
    ) -> Result<Self, RenderError> {
        match contents {
            Ok(contents) => Ok(Self {
                target,
                path: path.to_path_buf(),
                contents,
            }),
            Err(source) => Err(RenderError {
                target,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Output renderer configured from a [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct Generator {
    options: JsOptions,
    routes: Option<PathBuf>,
    tree: Option<PathBuf>,
    extras: Option<PathBuf>,
    merged: bool,
}

impl Generator {
    /// Create a generator for the outputs enabled in `config`.
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            options: JsOptions::from_config(config),
            routes: config.routes.clone(),
            tree: config.tree.clone(),
            extras: config.extras.clone(),
            merged: config.merged,
        }
    }

    /// Path an output is written to, if enabled.
    pub fn target_path(&self, target: Target) -> Option<&PathBuf> {
        match target {
            Target::Routes => self.routes.as_ref(),
            Target::Tree => self.tree.as_ref(),
            Target::Extras => self.extras.as_ref(),
        }
    }

    /// Module specifier the tree output imports the entry list from.
    fn routes_module(&self) -> Option<String> {
        if self.merged {
            return None;
        }
        self.routes
            .as_ref()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Render the requested targets. Targets not enabled in the config are skipped.
    pub fn render(
        &self,
        snapshot: &Snapshot,
        format: &dyn FormatHook,
        targets: &[Target],
    ) -> Result<Vec<Artifact>, RenderError> {
        let wants = |t: Target| targets.contains(&t) && self.target_path(t).is_some();
        let mut artifacts = Vec::new();

        if wants(Target::Routes) || wants(Target::Tree) {
            let list = entry_list(snapshot, format, self.tree.is_some());
            if let (true, Some(path)) = (wants(Target::Routes), &self.routes) {
                artifacts.push(Artifact {
                    target: Target::Routes,
                    path: path.clone(),
                    contents: js::render_routes(&list, &self.options),
                });
            }
            if let (true, Some(path)) = (wants(Target::Tree), &self.tree) {
                let tree = dir_tree(snapshot, format);
                let module = self.routes_module();
                artifacts.push(Artifact {
                    target: Target::Tree,
                    path: path.clone(),
                    contents: js::render_tree(&tree, &list, module.as_deref(), &self.options),
                });
            }
        }

        if let (true, Some(path)) = (wants(Target::Extras), &self.extras) {
            artifacts.push(Artifact::rendered(
                Target::Extras,
                path,
                js::render_extras(&snapshot.extras),
            )?);
        }

        trace!(count = artifacts.len(), "Rendered artifacts");
        Ok(artifacts)
    }
}
