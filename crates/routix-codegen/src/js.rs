//! JavaScript module serializer.
//!
//! Files and directories are emitted as two arrays, `f` and `d`, whose
//! `children` are thunks resolved once both arrays exist. This lets entries
//! reference each other by index regardless of declaration order.

use indexmap::IndexMap;
use itertools::Itertools;
use routix_core::{BuildConfig, EntryRef};
use serde_json::Value;

use crate::entries::{DirEntry, DirTree, EntryList, FileEntry};

/// Serialization options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsOptions {
    /// Unwrap the default export of imported modules.
    pub import_default: bool,
    /// Property holding the import thunk.
    pub import_prop: String,
}

impl Default for JsOptions {
    fn default() -> Self {
        Self {
            import_default: false,
            import_prop: "import".to_string(),
        }
    }
}

impl JsOptions {
    /// Take serialization options from a build config.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            import_default: config.import_default,
            import_prop: config.import_prop.clone(),
        }
    }
}

const RESOLVE_CHILDREN: &str =
    "for (const g of [f, d])\n  for (const x of g) x.children = x.children ? x.children() : []";

fn quote(s: &str) -> String {
    Value::from(s).to_string()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn key(s: &str) -> String {
    if is_identifier(s) { s.to_string() } else { quote(s) }
}

fn reference(entry: &EntryRef) -> String {
    match entry {
        EntryRef::File(i) => format!("f[{i}]"),
        EntryRef::Dir(i) => format!("d[{i}]"),
    }
}

fn props(props: &IndexMap<String, Value>) -> impl Iterator<Item = String> + '_ {
    props.iter().map(|(k, v)| format!("{}: {v}", quote(k)))
}

fn children_thunk(children: &[EntryRef]) -> String {
    format!("children: () => [{}]", children.iter().map(reference).join(", "))
}

fn object(label: &str, fields: &[String]) -> String {
    format!(
        "  {{ // {label}\n{}\n  }}",
        fields.iter().map(|f| format!("    {f}")).join(",\n")
    )
}

fn array(declaration: &str, items: &[String]) -> String {
    if items.is_empty() {
        format!("{declaration} = []")
    } else {
        format!("{declaration} = [\n{}\n]", items.join(",\n"))
    }
}

fn render_file(file: &FileEntry, options: &JsOptions) -> String {
    let then = if options.import_default { ".then(dft)" } else { "" };
    let mut fields = vec![
        format!("path: {}", quote(&file.path)),
        format!(
            "{}: () => import({}){then}",
            key(&options.import_prop),
            quote(&file.import)
        ),
    ];
    fields.extend(props(&file.props));
    if !file.children.is_empty() {
        fields.push(children_thunk(&file.children));
    }
    object(&format!("f[{}]", file.index), &fields)
}

fn render_dir(dir: &DirEntry) -> String {
    let mut fields = vec![format!("path: {}", quote(&dir.path))];
    fields.extend(props(&dir.props));
    if let Some(children) = &dir.children {
        fields.push(children_thunk(children));
    }
    object(&format!("d[{}]", dir.index), &fields)
}

/// Declarations of the `f` and `d` arrays, without exports.
pub fn render_entry_list(list: &EntryList, options: &JsOptions) -> String {
    let mut sections = Vec::new();
    if options.import_default {
        sections.push("const dft = m => m.default".to_string());
    }

    let files: Vec<String> = list.files.iter().map(|f| render_file(f, options)).collect();
    sections.push(array("const f /* files */", &files));

    if let Some(dirs) = &list.dirs {
        let dirs: Vec<String> = dirs.iter().map(render_dir).collect();
        sections.push(array("const d /* dirs */", &dirs));
        sections.push(RESOLVE_CHILDREN.to_string());
    }

    sections.join("\n\n")
}

/// The routes module: the entry list with `f` as default export.
pub fn render_routes(list: &EntryList, options: &JsOptions) -> String {
    let mut sections = vec![render_entry_list(list, options)];
    if list.dirs.is_some() {
        // Keeps a single default export while still exposing dirs.
        sections.push("f.dirs = d".to_string());
    }
    sections.push("export default f\n".to_string());
    sections.join("\n\n")
}

/// The tree module.
///
/// With a routes module to import from, `f` and `d` are taken from it;
/// otherwise the entry list is inlined.
pub fn render_tree(
    tree: &DirTree,
    list: &EntryList,
    routes_module: Option<&str>,
    options: &JsOptions,
) -> String {
    let prelude = match routes_module {
        Some(module) => format!("import f from '{module}'\n\nconst d = f.dirs"),
        None => render_entry_list(list, options),
    };

    let mut fields = vec!["path: \"\"".to_string(), "isRoot: true".to_string()];
    fields.extend(props(&tree.props));
    if tree.children.is_empty() {
        fields.push("children: []".to_string());
    } else {
        fields.push(format!(
            "children: [\n{}\n  ]",
            tree.children
                .iter()
                .map(|c| format!("    {}", reference(c)))
                .join(",\n")
        ));
    }

    format!(
        "{prelude}\n\nexport default {{\n{}\n}}\n",
        fields.iter().map(|f| format!("  {f}")).join(",\n")
    )
}

/// The extras module: payloads keyed by path.
pub fn render_extras(extras: &IndexMap<String, Value>) -> serde_json::Result<String> {
    let body = serde_json::to_string_pretty(extras)?;
    Ok(format!("const extras = {body}\n\nexport default extras\n"))
}
