use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use routix_build::{Builder, MemoryWriter, Phase};
use routix_core::{
    BoxFuture, BuildConfig, BuildError, HookError, Hooks, ParseHook, Parsed, PathEvent, Record,
    Resolution, parse_fn,
};
use tokio::time::Instant;

const ROUTES: &str = "/out/routes";
const TREE: &str = "/out/tree";

fn config(debounce_ms: u64) -> BuildConfig {
    let mut config = BuildConfig::new("/pages");
    config.routes = Some(ROUTES.into());
    config.tree = Some(TREE.into());
    config.debounce_ms = debounce_ms;
    config
}

fn builder(config: BuildConfig, hooks: Hooks) -> (Builder, Arc<MemoryWriter>) {
    let writer = Arc::new(MemoryWriter::new());
    let builder = Builder::new(config, hooks, writer.clone());
    (builder, writer)
}

fn dots_to_slashes() -> Hooks {
    Hooks::new().with_parse(parse_fn(|mut draft: Record, _: Option<&Record>| {
        draft.path = draft.path.replace('.', "/");
        Ok(Parsed::Record(draft))
    }))
}

/// Parse hook that settles only after a delay.
struct SlowParse(Duration);

impl ParseHook for SlowParse {
    fn parse<'a>(
        &'a self,
        draft: Record,
        _previous: Option<&'a Record>,
    ) -> BoxFuture<'a, Result<Parsed, HookError>> {
        Box::pin(async move {
            tokio::time::sleep(self.0).await;
            Ok(Parsed::Record(draft))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_basic_scenario() {
    let (builder, writer) = builder(config(0), Hooks::default());
    builder.add(PathEvent::file("a.js"));
    builder.add(PathEvent::file("foo/b.js"));
    builder.start();
    builder.on_idle(None).await.unwrap();

    let routes = r#"const f /* files */ = [
  { // f[0]
    path: "a",
    import: () => import("/pages/a.js")
  },
  { // f[1]
    path: "foo/b",
    import: () => import("/pages/foo/b.js")
  }
]

const d /* dirs */ = [
  { // d[0]
    path: "foo",
    children: () => [f[1]]
  }
]

for (const g of [f, d])
  for (const x of g) x.children = x.children ? x.children() : []

f.dirs = d

export default f
"#;
    let tree = r#"import f from '/out/routes'

const d = f.dirs

export default {
  path: "",
  isRoot: true,
  children: [
    f[0],
    d[0]
  ]
}
"#;
    assert_eq!(writer.get(ROUTES).as_deref(), Some(routes));
    assert_eq!(writer.get(TREE).as_deref(), Some(tree));

    builder.remove(PathEvent::file("foo/b.js"));
    builder.remove(PathEvent::file("a.js"));
    builder.on_idle(None).await.unwrap();

    let routes = writer.get(ROUTES).unwrap();
    assert!(routes.starts_with("const f /* files */ = []\n\nconst d /* dirs */ = []\n"));
    let snapshot = builder.snapshot().await;
    assert!(snapshot.files.is_empty());
    assert!(snapshot.dirs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_nested_virtual_dirs() {
    let (builder, _writer) = builder(config(0), dots_to_slashes());
    builder.start();
    builder.add(PathEvent::directory("foo"));
    builder.add(PathEvent::file("foo/bar.baz.js"));
    builder.on_idle(None).await.unwrap();

    let snapshot = builder.snapshot().await;
    let files: Vec<&str> = snapshot.files.iter().map(|f| f.record.path.as_str()).collect();
    let dirs: Vec<&str> = snapshot.dirs.iter().map(|d| d.record.path.as_str()).collect();
    assert_eq!(files, ["foo/bar/baz"]);
    assert_eq!(dirs, ["foo/bar", "foo"]);
    assert!(snapshot.dirs.iter().all(|d| d.record.is_virtual));
    assert_eq!(snapshot.dirs[0].children.as_ref().map(Vec::len), Some(1));
    assert_eq!(snapshot.dirs[1].children.as_ref().map(Vec::len), Some(1));

    builder.remove(PathEvent::file("foo/bar.baz.js"));
    builder.on_idle(None).await.unwrap();
    let snapshot = builder.snapshot().await;
    assert!(snapshot.files.is_empty());
    assert!(snapshot.dirs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pruning_keeps_occupied_parent() {
    let (builder, _writer) = builder(config(0), Hooks::default());
    builder.start();
    builder.add(PathEvent::file("foo/a.js"));
    builder.add(PathEvent::file("foo/b.js"));
    builder.on_idle(None).await.unwrap();

    builder.remove(PathEvent::file("foo/a.js"));
    builder.on_idle(None).await.unwrap();

    let snapshot = builder.snapshot().await;
    assert_eq!(snapshot.files.len(), 1);
    assert_eq!(snapshot.dirs.len(), 1);
    assert_eq!(snapshot.dirs[0].record.path, "foo");
}

#[tokio::test(start_paused = true)]
async fn test_custom_root() {
    let hooks = Hooks::new().with_parse(parse_fn(|mut draft: Record, _: Option<&Record>| {
        if draft.path == "index" {
            draft.path.clear();
        }
        Ok(Parsed::Record(draft))
    }));
    let (builder, writer) = builder(config(0), hooks);
    builder.add(PathEvent::file("index.js"));
    builder.add(PathEvent::file("about.js"));
    builder.start();
    builder.on_idle(None).await.unwrap();

    let routes = writer.get(ROUTES).unwrap();
    assert!(routes.contains("    path: \"\",\n    import: () => import(\"/pages/index.js\"),\n"));
    let tree = writer.get(TREE).unwrap();
    assert!(tree.contains("  children: [\n    f[1]\n  ]\n"));
}

#[tokio::test(start_paused = true)]
async fn test_idle_is_idempotent() {
    let (builder, writer) = builder(config(50), Hooks::default());
    builder.add(PathEvent::file("a.js"));
    builder.start();
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);

    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);
    assert_eq!(builder.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_idle_waits_for_start() {
    let (builder, writer) = builder(config(0), Hooks::default());
    builder.add(PathEvent::file("a.js"));

    let waiter = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.on_idle(None).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());
    assert_eq!(writer.total_writes(), 0);

    builder.start();
    waiter.await.unwrap().unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);
}

#[tokio::test(start_paused = true)]
async fn test_conflict_surfaces_once() {
    let (builder, writer) = builder(config(0), Hooks::default());
    builder.start();
    builder.add(PathEvent::file("a.js"));
    builder.add(PathEvent::file("a.md"));

    let err = builder.on_idle(None).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");
    builder.on_idle(None).await.unwrap();
    builder.on_idle(None).await.unwrap();

    let routes = writer.get(ROUTES).unwrap();
    assert_eq!(routes.matches("path: \"a\"").count(), 1);
    assert!(builder.get("a.md").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resolver_keeps_paths_unique() {
    let hooks = Hooks::new().with_resolver(|incoming: &Record, _existing: &Record| {
        Resolution::rename_incoming(format!("{}-{}", incoming.path, "md"))
    });
    let (builder, _writer) = builder(config(0), hooks);
    builder.start();
    builder.add(PathEvent::file("a.js"));
    builder.add(PathEvent::file("a.md"));
    builder.on_idle(None).await.unwrap();

    let snapshot = builder.snapshot().await;
    let mut paths: Vec<&str> = snapshot.files.iter().map(|f| f.record.path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, ["a", "a-md"]);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_burst() {
    let (builder, writer) = builder(config(50), Hooks::default());
    builder.start();
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);

    for name in ["a.js", "b.js", "c.js", "d.js", "e.js"] {
        builder.add(PathEvent::file(name));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    builder.on_idle(None).await.unwrap();

    assert_eq!(writer.write_count(ROUTES), 2);
    assert_eq!(writer.get(ROUTES).unwrap().matches("import: ").count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_slow_parse_holds_rebuild() {
    let hooks = Hooks::new().with_parse(SlowParse(Duration::from_millis(500)));
    let (builder, writer) = builder(config(50), hooks);
    builder.start();
    builder.on_idle(None).await.unwrap();

    let started = Instant::now();
    builder.add(PathEvent::file("slow.js"));
    builder.on_idle(None).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(writer.write_count(ROUTES), 2);
    assert!(writer.get(ROUTES).unwrap().contains("path: \"slow\""));
}

#[tokio::test(start_paused = true)]
async fn test_parse_errors_are_aggregated() {
    let hooks = Hooks::new().with_parse(parse_fn(|draft: Record, _: Option<&Record>| {
        if draft.path.starts_with("bad") {
            return Err("refusing bad page".into());
        }
        Ok(Parsed::Record(draft))
    }));
    let (builder, writer) = builder(config(0), hooks);
    builder.start();
    builder.add(PathEvent::file("bad-one.js"));
    builder.add(PathEvent::file("good.js"));
    builder.add(PathEvent::file("bad-two.js"));

    // Errors end the wait early, so drain until the builder settles cleanly.
    let mut failures = Vec::new();
    while let Err(err) = builder.on_idle(None).await {
        failures.extend(err.errors().into_iter().map(ToString::to_string));
        assert!(err.errors().iter().all(|e| matches!(e, BuildError::Parse { .. })));
    }
    assert_eq!(failures.len(), 2);
    assert!(writer.get(ROUTES).unwrap().contains("path: \"good\""));
    assert!(!writer.get(ROUTES).unwrap().contains("bad"));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_parse_is_ignored() {
    let hooks = Hooks::new().with_parse(parse_fn(|draft: Record, _: Option<&Record>| {
        if draft.path.starts_with('_') {
            return Ok(Parsed::Cancel);
        }
        Ok(Parsed::Record(draft))
    }));
    let (builder, _writer) = builder(config(0), hooks);
    builder.start();
    builder.add(PathEvent::file("_layout.js"));
    builder.add(PathEvent::file("page.js"));
    builder.on_idle(None).await.unwrap();

    assert!(builder.get("_layout.js").is_none());
    assert!(builder.get("page.js").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_is_retried() {
    let (builder, writer) = builder(config(0), Hooks::default());
    writer.fail_on(ROUTES);
    builder.add(PathEvent::file("a.js"));
    builder.start();

    let err = builder.on_idle(None).await.unwrap_err();
    match err {
        BuildError::Rebuild { target, .. } => assert_eq!(target, Path::new(ROUTES)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(writer.get(ROUTES).is_none());

    writer.recover(ROUTES);
    builder.add(PathEvent::file("b.js"));
    builder.on_idle(None).await.unwrap();
    let routes = writer.get(ROUTES).unwrap();
    assert!(routes.contains("path: \"a\""));
    assert!(routes.contains("path: \"b\""));
}

#[tokio::test(start_paused = true)]
async fn test_rebuild_opt_out() {
    let hooks = Hooks::new().with_parse(parse_fn(|draft: Record, _: Option<&Record>| {
        let quiet = draft.path == "quiet";
        Ok(Parsed::Record(draft.with_rebuild(!quiet)))
    }));
    let (builder, writer) = builder(config(0), hooks);
    builder.start();
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);

    builder.add(PathEvent::file("quiet.js"));
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);
    assert!(builder.get("quiet.js").is_some());

    builder.add(PathEvent::file("loud.js"));
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 2);
}

#[tokio::test(start_paused = true)]
async fn test_on_change_fires_on_mutation() {
    let (builder, _writer) = builder(config(50), Hooks::default());
    builder.start();
    builder.on_idle(None).await.unwrap();

    let change = builder.on_change();
    builder.add(PathEvent::file("a.js"));
    tokio::time::timeout(Duration::from_millis(10), change)
        .await
        .expect("change signal");
    builder.on_idle(None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_change_timeout() {
    let (builder, _writer) = builder(config(0), Hooks::default());
    builder.start();
    builder.on_idle(None).await.unwrap();

    let started = Instant::now();
    builder.on_idle(Some(Duration::from_millis(100))).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));

    // A change ends the wait early.
    let started = Instant::now();
    let waiter = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.on_idle(Some(Duration::from_secs(10))).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    builder.add(PathEvent::file("a.js"));
    waiter.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_update_moves_record() {
    let hooks = Hooks::new().with_parse(parse_fn(|mut draft: Record, previous: Option<&Record>| {
        if previous.is_some() {
            draft.path = format!("b/{}", draft.path.trim_start_matches("a/"));
        }
        Ok(Parsed::Record(draft))
    }));
    let (builder, writer) = builder(config(0), hooks);
    builder.start();
    builder.add(PathEvent::file("a/foo.js"));
    builder.on_idle(None).await.unwrap();
    assert_eq!(builder.get("a/foo.js").unwrap().path, "a/foo");

    builder.update(PathEvent::file("a/foo.js"));
    builder.on_idle(None).await.unwrap();

    assert_eq!(builder.get("a/foo.js").unwrap().path, "b/foo");
    let snapshot = builder.snapshot().await;
    let dirs: Vec<&str> = snapshot.dirs.iter().map(|d| d.record.path.as_str()).collect();
    assert_eq!(dirs, ["b"]);
    assert!(writer.get(ROUTES).unwrap().contains("path: \"b/foo\""));
}

#[tokio::test(start_paused = true)]
async fn test_conflicting_move_keeps_previous_record() {
    let hooks = Hooks::new().with_parse(parse_fn(|mut draft: Record, previous: Option<&Record>| {
        if previous.is_some() {
            draft.path = "b".to_string();
        }
        Ok(Parsed::Record(draft))
    }));
    let (builder, writer) = builder(config(0), hooks);
    builder.start();
    builder.add(PathEvent::file("a/foo.js"));
    builder.add(PathEvent::file("b.js"));
    builder.on_idle(None).await.unwrap();

    builder.update(PathEvent::file("a/foo.js"));
    let err = builder.on_idle(None).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");
    builder.on_idle(None).await.unwrap();

    assert_eq!(builder.get("a/foo.js").unwrap().path, "a/foo");
    assert_eq!(builder.get("b.js").unwrap().path, "b");
    let snapshot = builder.snapshot().await;
    let dirs: Vec<&str> = snapshot.dirs.iter().map(|d| d.record.path.as_str()).collect();
    assert_eq!(dirs, ["a"]);
    assert!(writer.get(ROUTES).unwrap().contains("path: \"a/foo\""));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_removal_is_ignored() {
    let (builder, writer) = builder(config(0), Hooks::default());
    builder.start();
    builder.on_idle(None).await.unwrap();

    builder.remove(PathEvent::file("missing.js"));
    builder.remove(PathEvent::directory("foo"));
    builder.on_idle(None).await.unwrap();
    assert_eq!(writer.write_count(ROUTES), 1);
}
