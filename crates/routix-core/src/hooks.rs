//! Hook traits through which callers customize a build.
//!
//! Every hook has a default implementation, so a [`Hooks`] bundle built with
//! [`Hooks::default`] produces plain file-based routes.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::record::Record;

/// Type alias for boxed futures returned by async hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type returned by user hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of the parse hook.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// Store this record.
    Record(Record),
    /// Drop the event.
    Cancel,
}

impl From<Record> for Parsed {
    fn from(record: Record) -> Self {
        Parsed::Record(record)
    }
}

/// Turns a draft record into the record that gets stored.
///
/// The draft already carries the default path, extension and location derived
/// from the event. `previous` is the record stored for the same input before
/// this event, if any. Synthesized directories are passed through the same hook
/// with `is_virtual` set.
pub trait ParseHook: Send + Sync {
    fn parse<'a>(
        &'a self,
        draft: Record,
        previous: Option<&'a Record>,
    ) -> BoxFuture<'a, Result<Parsed, HookError>>;
}

/// Parse hook that keeps the draft unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityParse;

impl ParseHook for IdentityParse {
    fn parse<'a>(
        &'a self,
        draft: Record,
        _previous: Option<&'a Record>,
    ) -> BoxFuture<'a, Result<Parsed, HookError>> {
        Box::pin(std::future::ready(Ok(Parsed::Record(draft))))
    }
}

/// Adapter running a synchronous closure as a [`ParseHook`].
pub struct ParseFn<F>(F);

/// Wrap a synchronous closure as a parse hook.
pub fn parse_fn<F>(f: F) -> ParseFn<F>
where
    F: Fn(Record, Option<&Record>) -> Result<Parsed, HookError> + Send + Sync,
{
    ParseFn(f)
}

impl<F> ParseHook for ParseFn<F>
where
    F: Fn(Record, Option<&Record>) -> Result<Parsed, HookError> + Send + Sync,
{
    fn parse<'a>(
        &'a self,
        draft: Record,
        previous: Option<&'a Record>,
    ) -> BoxFuture<'a, Result<Parsed, HookError>> {
        Box::pin(std::future::ready((self.0)(draft, previous)))
    }
}

/// Produces the extra output properties of a record. Must be pure.
pub trait FormatHook: Send + Sync {
    fn format(&self, record: &Record) -> IndexMap<String, Value>;
}

impl<F> FormatHook for F
where
    F: Fn(&Record) -> IndexMap<String, Value> + Send + Sync,
{
    fn format(&self, record: &Record) -> IndexMap<String, Value> {
        self(record)
    }
}

/// Format hook emitting the record's caller-set properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropsFormat;

impl FormatHook for PropsFormat {
    fn format(&self, record: &Record) -> IndexMap<String, Value> {
        record.props.clone()
    }
}

/// Decision of a [`ConflictResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Leave the collision to the default rules.
    #[default]
    Unhandled,
    /// Move one or both records to new paths and add them again.
    Rename {
        incoming: Option<String>,
        existing: Option<String>,
    },
}

impl Resolution {
    /// Rename only the incoming record.
    pub fn rename_incoming(path: impl Into<String>) -> Self {
        Resolution::Rename {
            incoming: Some(path.into()),
            existing: None,
        }
    }

    /// Rename only the existing record.
    pub fn rename_existing(path: impl Into<String>) -> Self {
        Resolution::Rename {
            incoming: None,
            existing: Some(path.into()),
        }
    }
}

/// Resolves two records mapping to the same logical path.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, incoming: &Record, existing: &Record) -> Resolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Record, &Record) -> Resolution + Send + Sync,
{
    fn resolve(&self, incoming: &Record, existing: &Record) -> Resolution {
        self(incoming, existing)
    }
}

/// Comparators used to make generated ordering deterministic.
pub trait RecordOrder: Send + Sync {
    /// Order of the flat file list.
    fn files(&self, _a: &Record, _b: &Record) -> Ordering {
        Ordering::Equal
    }

    /// Order in which sibling directory subtrees are emitted.
    fn dirs(&self, _a: &Record, _b: &Record) -> Ordering {
        Ordering::Equal
    }

    /// Order of each children list. Files come before directories by default.
    fn children(&self, a: &Record, b: &Record) -> Ordering {
        b.is_file.cmp(&a.is_file)
    }
}

/// Insertion order, files before directories in children lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOrder;

impl RecordOrder for DefaultOrder {}

/// Lexicographic order by logical path everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOrder;

impl RecordOrder for PathOrder {
    fn files(&self, a: &Record, b: &Record) -> Ordering {
        a.path.cmp(&b.path)
    }

    fn dirs(&self, a: &Record, b: &Record) -> Ordering {
        a.path.cmp(&b.path)
    }

    fn children(&self, a: &Record, b: &Record) -> Ordering {
        b.is_file.cmp(&a.is_file).then_with(|| a.path.cmp(&b.path))
    }
}

/// The set of hooks a builder runs with.
#[derive(Clone)]
pub struct Hooks {
    pub parse: Arc<dyn ParseHook>,
    pub format: Arc<dyn FormatHook>,
    pub resolver: Option<Arc<dyn ConflictResolver>>,
    pub order: Arc<dyn RecordOrder>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            parse: Arc::new(IdentityParse),
            format: Arc::new(PropsFormat),
            resolver: None,
            order: Arc::new(DefaultOrder),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl Hooks {
    /// Create the default hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parse hook.
    pub fn with_parse(mut self, parse: impl ParseHook + 'static) -> Self {
        self.parse = Arc::new(parse);
        self
    }

    /// Replace the format hook.
    pub fn with_format(mut self, format: impl FormatHook + 'static) -> Self {
        self.format = Arc::new(format);
        self
    }

    /// Install a conflict resolver.
    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Replace the record order.
    pub fn with_order(mut self, order: impl RecordOrder + 'static) -> Self {
        self.order = Arc::new(order);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_children_order_puts_files_first() {
        let dir = Record::virtual_dir("a");
        let file = Record::file("b");
        assert_eq!(DefaultOrder.children(&file, &dir), Ordering::Less);
        assert_eq!(DefaultOrder.children(&dir, &file), Ordering::Greater);
        assert_eq!(DefaultOrder.files(&file, &dir), Ordering::Equal);
    }

    #[test]
    fn test_path_order() {
        let a = Record::file("a");
        let b = Record::file("b");
        assert_eq!(PathOrder.files(&a, &b), Ordering::Less);
        assert_eq!(PathOrder.children(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |incoming: &Record, _: &Record| {
            Resolution::rename_incoming(format!("{}_", incoming.path))
        };
        let resolution = resolver.resolve(&Record::file("a"), &Record::file("a"));
        assert_eq!(
            resolution,
            Resolution::Rename {
                incoming: Some("a_".into()),
                existing: None
            }
        );
    }
}
