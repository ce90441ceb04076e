//! Async driver around the [`Scheduler`] and the record [`Store`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use parking_lot::Mutex;
use routix_codegen::{Artifact, Generator, Target};
use routix_core::{
    BuildConfig, BuildError, BuildResult, Hooks, Parsed, PathEvent, Record, Snapshot, Store,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::parse::{draft_record, normalize_path};
use crate::scheduler::{Action, Event, Outputs, Phase, Scheduler};
use crate::writer::Writer;

struct State {
    scheduler: Scheduler,
    errors: Vec<BuildError>,
    listeners: Vec<oneshot::Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    config: BuildConfig,
    hooks: Hooks,
    writer: Arc<dyn Writer>,
    generator: Generator,
    state: Mutex<State>,
    store: Mutex<Store>,
    /// Serializes rebuilds.
    build_lock: tokio::sync::Mutex<()>,
    /// Bumped on every state change so idle waiters re-check.
    version: watch::Sender<u64>,
}

/// Incremental builder.
///
/// Cheap to clone; clones share the same state. Must be used from within a
/// tokio runtime.
#[derive(Clone)]
pub struct Builder {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("dir", &self.inner.config.dir)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Future resolving on the next change notification. See [`Builder::on_change`].
#[derive(Debug)]
pub struct ChangeSignal(oneshot::Receiver<()>);

impl Future for ChangeSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.0).poll(cx).map(|_| ())
    }
}

/// Releases a parse latch when dropped, even if the parse task panics.
struct Latch(Arc<Inner>);

impl Drop for Latch {
    fn drop(&mut self) {
        self.0.dispatch(Event::LatchReleased);
    }
}

fn targets(dirty: Outputs) -> Vec<Target> {
    let mut targets = Vec::new();
    if dirty.contains(Outputs::ROUTES) {
        targets.push(Target::Routes);
    }
    if dirty.contains(Outputs::TREE) {
        targets.push(Target::Tree);
    }
    if dirty.contains(Outputs::EXTRAS) {
        targets.push(Target::Extras);
    }
    targets
}

fn file_name(artifact: &Artifact) -> String {
    artifact
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.path.display().to_string())
}

impl Builder {
    /// Create a stopped builder.
    pub fn new(config: BuildConfig, hooks: Hooks, writer: Arc<dyn Writer>) -> Self {
        let (version, _) = watch::channel(0);
        let inner = Inner {
            generator: Generator::new(&config),
            state: Mutex::new(State {
                scheduler: Scheduler::new(config.debounce()),
                errors: Vec::new(),
                listeners: Vec::new(),
                timer: None,
            }),
            store: Mutex::new(Store::new(&hooks, config.leading_slash)),
            build_lock: tokio::sync::Mutex::new(()),
            version,
            config,
            hooks,
            writer,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The configuration this builder runs with.
    pub fn config(&self) -> &BuildConfig {
        &self.inner.config
    }

    /// Start building. The first rebuild runs immediately, or as soon as
    /// in-flight parses settle.
    pub fn start(&self) {
        debug!(
            dir = %self.inner.config.dir.display(),
            targets = %self.inner.config.target_names().join(", "),
            "Starting builder"
        );
        self.inner.dispatch(Event::Start);
    }

    /// Handle a newly discovered path.
    pub fn add(&self, event: PathEvent) {
        self.ingest(event, false);
    }

    /// Handle a changed path.
    pub fn update(&self, event: PathEvent) {
        self.ingest(event, true);
    }

    /// Handle a deleted path. Unknown paths are ignored.
    pub fn remove(&self, event: PathEvent) {
        if event.is_directory() {
            return;
        }
        let input = normalize_path(&event.path);
        let removed = self.inner.store.lock().remove(&input);
        match removed {
            Some(record) => {
                debug!(%input, path = %record.path, "Removed record");
                self.inner.dispatch(Event::Invalidate(Outputs::of(&record)));
            }
            None => trace!(%input, "Ignoring removal of unknown input"),
        }
    }

    fn ingest(&self, event: PathEvent, is_update: bool) {
        // Directories only matter through the paths of their files.
        if event.is_directory() {
            trace!(path = %event.path, "Ignoring directory event");
            return;
        }

        let draft = draft_record(&self.inner.config, &event);
        let previous = self.inner.store.lock().get(draft.input_key()).cloned();

        self.inner.dispatch(Event::LatchAcquired);
        let latch = Latch(Arc::clone(&self.inner));
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _latch = latch;
            inner.apply(draft, previous, is_update).await;
        });
    }

    /// Resolves the next time a change arms the debounce window.
    ///
    /// The listener is registered when this is called, not when the future
    /// is first polled.
    pub fn on_change(&self) -> ChangeSignal {
        let (tx, rx) = oneshot::channel();
        self.inner.state.lock().listeners.push(tx);
        ChangeSignal(rx)
    }

    /// Wait until the builder has started and settled.
    ///
    /// With `change_timeout`, first waits up to that long for a change to be
    /// observed, returning early as soon as one is. Pending errors end the
    /// wait; they are returned once, as a single (possibly aggregate) error.
    pub async fn on_idle(&self, change_timeout: Option<Duration>) -> BuildResult<()> {
        let mut version = self.inner.version.subscribe();

        while !self.inner.state.lock().scheduler.is_started() {
            if version.changed().await.is_err() {
                return Ok(());
            }
        }

        if let Some(timeout) = change_timeout {
            let change = self.on_change();
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = change => {}
            }
        }

        loop {
            {
                let mut state = self.inner.state.lock();
                if !state.errors.is_empty() || state.scheduler.is_idle() {
                    let errors = std::mem::take(&mut state.errors);
                    return match BuildError::aggregate(errors) {
                        Some(err) => Err(err),
                        None => Ok(()),
                    };
                }
            }
            if version.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    /// Record currently stored for an input path.
    pub fn get(&self, input: &str) -> Option<Record> {
        self.inner.store.lock().get(&normalize_path(input)).cloned()
    }

    /// Current scheduler phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().scheduler.phase()
    }

    /// Unfold the trie and capture the current state.
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.prepare().await
    }
}

impl Inner {
    fn now() -> std::time::Instant {
        Instant::now().into_std()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn record_error(&self, err: BuildError) {
        self.state.lock().errors.push(err);
        self.bump();
    }

    fn dispatch(self: &Arc<Self>, event: Event) {
        {
            let mut state = self.state.lock();
            let actions = state.scheduler.handle(event, Self::now());
            trace!(?event, ?actions, phase = %state.scheduler.phase(), "Scheduler transition");
            for action in actions {
                match action {
                    Action::ArmTimer { generation, delay } => {
                        if let Some(timer) = state.timer.take() {
                            timer.abort();
                        }
                        let inner = Arc::clone(self);
                        state.timer = Some(tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            inner.dispatch(Event::TimerFired(generation));
                        }));
                    }
                    Action::CancelTimer => {
                        if let Some(timer) = state.timer.take() {
                            timer.abort();
                        }
                    }
                    Action::RunBuild => {
                        let inner = Arc::clone(self);
                        tokio::spawn(inner.run_build());
                    }
                    Action::NotifyChange => {
                        for listener in state.listeners.drain(..) {
                            let _ = listener.send(());
                        }
                    }
                }
            }
        }
        self.bump();
    }

    async fn apply(self: &Arc<Self>, draft: Record, previous: Option<Record>, is_update: bool) {
        let input = draft.input_key().to_string();
        let mut record = match self.hooks.parse.parse(draft, previous.as_ref()).await {
            Ok(Parsed::Record(record)) => record,
            Ok(Parsed::Cancel) => {
                debug!(%input, "Parse cancelled");
                return;
            }
            Err(source) => {
                warn!(%input, error = %source, "Parse hook failed");
                self.record_error(BuildError::parse(input, source));
                return;
            }
        };
        // Keep the record addressable by the event path it came from.
        record.relative = Some(input.clone());

        let mut dirty = Outputs::of(&record);
        let result = {
            let mut store = self.store.lock();
            let stored = store.get(&input).map(Outputs::of);
            dirty |= stored.unwrap_or_default();
            if is_update {
                store.update(record)
            } else {
                store.add(record)
            }
        };

        match result {
            Ok(_) => {
                trace!(%input, ?dirty, "Applied record");
                self.dispatch(Event::Invalidate(dirty));
            }
            Err(err) => {
                warn!(%input, error = %err, "Failed to apply record");
                self.record_error(err);
            }
        }
    }

    async fn run_build(self: Arc<Self>) {
        let _guard = self.build_lock.lock().await;
        self.dispatch(Event::BuildStarted);
        let dirty = self.state.lock().scheduler.take_dirty();

        let started = Instant::now();
        match self.rebuild(dirty).await {
            Ok(written) if written.is_empty() => trace!("Nothing to write"),
            Ok(written) => info!(
                "Written: {} ({}ms)",
                written.join(", "),
                started.elapsed().as_millis()
            ),
            Err(err) => {
                error!(error = %err, "Rebuild failed");
                let mut state = self.state.lock();
                state.scheduler.restore_dirty(dirty);
                state.errors.push(err);
            }
        }

        self.dispatch(Event::BuildFinished);
    }

    /// Regenerate and write the outputs in `dirty`. Returns the names written.
    async fn rebuild(&self, dirty: Outputs) -> BuildResult<Vec<String>> {
        let targets = targets(dirty);
        if targets.is_empty() || !self.config.has_outputs() {
            return Ok(Vec::new());
        }

        let snapshot = self.prepare().await;
        let artifacts = self
            .generator
            .render(&snapshot, self.hooks.format.as_ref(), &targets)
            .map_err(|e| BuildError::Rebuild {
                target: e.path.clone(),
                source: std::io::Error::other(e),
            })?;

        try_join_all(artifacts.iter().map(|artifact| async move {
            self.writer
                .write(&artifact.path, artifact.contents.clone())
                .await
                .map_err(|source| BuildError::Rebuild {
                    target: artifact.path.clone(),
                    source,
                })
        }))
        .await?;

        Ok(artifacts.iter().map(file_name).collect())
    }

    /// Synthesize missing directories, then snapshot the store.
    async fn prepare(&self) -> Snapshot {
        loop {
            let vacant = {
                let mut store = self.store.lock();
                let vacant = store.vacant_dirs();
                if vacant.is_empty() {
                    return store.snapshot();
                }
                vacant
            };

            let records = join_all(vacant.into_iter().map(|path| self.synthesize(path))).await;
            let mut store = self.store.lock();
            for record in records {
                store.install_virtual(record);
            }
        }
    }

    /// Run the parse hook on a virtual directory draft.
    async fn synthesize(&self, path: String) -> Record {
        let draft = Record::virtual_dir(path.clone());
        match self.hooks.parse.parse(draft.clone(), None).await {
            Ok(Parsed::Record(mut record)) => {
                record.path = path;
                record
            }
            Ok(Parsed::Cancel) => draft,
            Err(source) => {
                warn!(%path, error = %source, "Parse hook failed on virtual directory");
                self.record_error(BuildError::parse(path, source));
                draft
            }
        }
    }
}
